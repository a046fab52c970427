//! Middleware support for request/response processing.
//!
//! A middleware receives the request and the working response and either
//! hands both on ([`Outcome::Continue`]) or ends the chain with a final
//! response ([`Outcome::ShortCircuit`]). Failures are returned as errors and
//! end up in the error handler.

mod auth;
mod body;
mod client_ip;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::request::Request;
use crate::response::Response;

pub use auth::{
    AuthFactory, AuthMiddleware, ProviderAuthFactory, SessionProvider, TokenProvider,
    UserProvider, AUTH_USER_ATTRIBUTE,
};
pub use body::{BodyParser, BodyParsingMiddleware};
pub use client_ip::{ClientIpMiddleware, CLIENT_IP_ATTRIBUTE};

/// Reserved middleware key that is built through the auth factory.
pub const AUTH_MIDDLEWARE: &str = "auth";

/// Result of middleware processing.
#[derive(Debug)]
pub enum Outcome {
    /// Continue with the (possibly modified) request and response.
    Continue(Request, Response),
    /// Stop processing and return this response.
    ShortCircuit(Response),
}

/// Trait for middleware that processes requests and responses.
///
/// # Example
///
/// ```
/// use futures::future::BoxFuture;
/// use oxide_router::{AppResult, Middleware, Outcome, Request, Response};
///
/// struct PoweredBy;
///
/// impl Middleware for PoweredBy {
///     fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
///         Box::pin(async move { Ok(Outcome::Continue(req, res.header("X-Powered-By", "oxide"))) })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Processes the request and the working response.
    fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>>;
}

/// A middleware reference: a container key or a ready instance.
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Resolved through the container when the route runs.
    Named(String),
    /// Used as-is.
    Instance(Arc<dyn Middleware>),
}

impl MiddlewareRef {
    /// Creates a named reference.
    pub fn named(key: impl Into<String>) -> Self {
        Self::Named(key.into())
    }

    /// Wraps a middleware instance.
    pub fn instance(middleware: impl Middleware + 'static) -> Self {
        Self::Instance(Arc::new(middleware))
    }

    /// Returns the container key of a named reference.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Named(key) => Some(key),
            Self::Instance(_) => None,
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(key) => f.debug_tuple("Named").field(key).finish(),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(key: &str) -> Self {
        Self::named(key)
    }
}

impl From<String> for MiddlewareRef {
    fn from(key: String) -> Self {
        Self::Named(key)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Instance(middleware)
    }
}

impl Serialize for MiddlewareRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Named(key) => serializer.serialize_str(key),
            Self::Instance(_) => Err(serde::ser::Error::custom(
                "middleware instances cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for MiddlewareRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Named)
    }
}

/// Runs one middleware, turning a panic into [`AppError::Panic`].
pub async fn run_middleware(
    middleware: &dyn Middleware,
    req: Request,
    res: Response,
) -> AppResult<Outcome> {
    AssertUnwindSafe(middleware.process(req, res))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panic_error(payload)))
}

/// An ordered chain of resolved middleware.
#[derive(Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends a middleware in place.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Returns the number of middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs every middleware in order until one short-circuits or fails.
    ///
    /// A failure carries the request and response as they were handed to
    /// the failing middleware.
    pub async fn run(
        &self,
        mut req: Request,
        mut res: Response,
    ) -> Result<Outcome, Interrupted> {
        for (index, middleware) in self.middlewares.iter().enumerate() {
            let (saved_req, saved_res) = (req.clone(), res.clone());
            match run_middleware(middleware.as_ref(), req, res).await {
                Ok(Outcome::Continue(next_req, next_res)) => {
                    req = next_req;
                    res = next_res;
                }
                Ok(Outcome::ShortCircuit(res)) => {
                    debug!(index, status = res.status, "middleware short-circuited");
                    return Ok(Outcome::ShortCircuit(res));
                }
                Err(error) => {
                    debug!(index, error = %error, "middleware failed");
                    return Err(Interrupted {
                        error,
                        req: saved_req,
                        res: saved_res,
                    });
                }
            }
        }
        Ok(Outcome::Continue(req, res))
    }
}

impl FromIterator<Arc<dyn Middleware>> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Self {
            middlewares: iter.into_iter().collect(),
        }
    }
}

/// A middleware failure with the state it was called with.
#[derive(Debug)]
pub struct Interrupted {
    /// The failure.
    pub error: AppError,
    /// Request handed to the failing middleware.
    pub req: Request,
    /// Response handed to the failing middleware.
    pub res: Response,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

/// Converts a panic payload into an error.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> AppError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::Panic(message)
}
