//! Error types for routing and request dispatch.

use thiserror::Error;

use crate::response::Response;

/// Errors raised while building or querying the route table.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The pattern text could not be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The same placeholder name appears twice in one pattern.
    #[error("cannot use the same placeholder '{name}' twice in '{pattern}'")]
    DuplicatePlaceholder { pattern: String, name: String },

    /// A placeholder constraint contains its own capturing group.
    #[error("regex for placeholder '{name}' in '{pattern}' contains a capturing group")]
    CapturingGroup { pattern: String, name: String },

    /// A placeholder constraint (or a compiled chunk) is not a valid regex.
    #[error("invalid regex in route pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A `]` appears before the end of the pattern.
    #[error("optional segments can only occur at the end of a route: {0}")]
    OptionalNotTrailing(String),

    /// Opening and closing brackets do not pair up.
    #[error("number of opening '[' and closing ']' does not match: {0}")]
    UnbalancedOptional(String),

    /// An optional group with nothing inside.
    #[error("empty optional part in route: {0}")]
    EmptyOptional(String),

    /// The route loader failed.
    #[error("route loader error: {0}")]
    RouteLoader(String),

    /// The route cache returned something unusable.
    #[error("route cache error: {0}")]
    Cache(String),

    /// A cached snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while a request moves through the pipeline.
///
/// Every variant is caught at the application boundary and rendered by the
/// error handler.
#[derive(Debug, Error)]
pub enum AppError {
    /// Routing table failure.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// A middleware key could not be resolved to a middleware.
    #[error("not valid route middleware {0}")]
    InvalidMiddleware(String),

    /// A `Class:method` handler reference could not be resolved.
    #[error("cannot resolve route handler {0}")]
    HandlerResolution(String),

    /// Access denied by an auth middleware.
    #[error("access denied: {message}")]
    AccessDenied {
        message: String,
        /// Response prepared by the middleware, used as the error base.
        response: Option<Box<Response>>,
    },

    /// The request body could not be parsed.
    #[error("request body error: {0}")]
    BodyParse(String),

    /// Any other failure raised by middleware or handlers.
    #[error("{0}")]
    Application(String),

    /// A middleware or handler panicked.
    #[error("panic while handling request: {0}")]
    Panic(String),
}

impl AppError {
    /// Creates an application error from any message.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(message.into())
    }

    /// Creates an access denied error without a prepared response.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
            response: None,
        }
    }
}

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Result type alias for pipeline operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
