//! Route loader collaborator.
//!
//! Route definitions live in storage owned by the host application. The
//! router asks a [`RouteLoader`] for the definitions matching a method and
//! route kind and compiles them into its table.

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, RouterError};
use crate::options::RouteOptions;
use crate::request::Method;

/// Action used when a handler reference names no method.
pub const DEFAULT_ACTION: &str = "handle";

/// Storage-level kind of a route definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// The home page route.
    HomePage,
    /// Extension and template pages.
    Page,
    /// Public API routes.
    Api,
    /// Admin API routes.
    AdminApi,
}

impl Default for RouteKind {
    fn default() -> Self {
        Self::Page
    }
}

/// A route definition as returned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// HTTP method.
    #[serde(default = "default_method")]
    pub method: Method,
    /// Storage kind.
    #[serde(default, rename = "type")]
    pub kind: RouteKind,
    /// Path pattern.
    pub pattern: String,
    /// Handler registry key.
    pub handler_class: String,
    /// Handler action.
    #[serde(default)]
    pub handler_method: String,
    /// Auth providers required by the route.
    #[serde(default)]
    pub auth: Option<String>,
    /// Redirect target for unauthenticated requests, relative to the base path.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Display name of the page.
    #[serde(default)]
    pub page_name: Option<String>,
    /// Extension that registered the route.
    #[serde(default)]
    pub extension_name: Option<String>,
    /// Free-form route options.
    #[serde(default)]
    pub options: Option<Value>,
    /// Middleware keys, as a list or a JSON-encoded list.
    #[serde(default, deserialize_with = "deserialize_middlewares")]
    pub middlewares: Vec<String>,
    /// Stable route id.
    #[serde(default)]
    pub uuid: Option<String>,
}

fn default_method() -> Method {
    Method::Get
}

fn deserialize_middlewares<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Encoded(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Raw::List(list)) => Ok(list),
        Some(Raw::Encoded(text)) if text.trim().is_empty() => Ok(Vec::new()),
        Some(Raw::Encoded(text)) => {
            serde_json::from_str::<Option<Vec<String>>>(&text)
                .map(Option::unwrap_or_default)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl RouteDescriptor {
    /// Creates a descriptor for a handler.
    pub fn new(
        method: Method,
        kind: RouteKind,
        pattern: impl Into<String>,
        handler_class: impl Into<String>,
        handler_method: impl Into<String>,
    ) -> Self {
        Self {
            method,
            kind,
            pattern: pattern.into(),
            handler_class: handler_class.into(),
            handler_method: handler_method.into(),
            auth: None,
            redirect_url: None,
            page_name: None,
            extension_name: None,
            options: None,
            middlewares: Vec::new(),
            uuid: None,
        }
    }

    /// Sets the route id.
    #[must_use]
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Sets the auth requirement.
    #[must_use]
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Adds a middleware key.
    #[must_use]
    pub fn middleware(mut self, key: impl Into<String>) -> Self {
        self.middlewares.push(key.into());
        self
    }

    /// Returns the `Class:method` handler reference.
    pub fn handler_ref(&self) -> String {
        let action = if self.handler_method.is_empty() {
            DEFAULT_ACTION
        } else {
            self.handler_method.as_str()
        };
        format!("{}:{}", self.handler_class, action)
    }

    /// Builds the route options, prefixing the redirect with the base path.
    pub fn route_options(&self, base_path: &str) -> RouteOptions {
        RouteOptions {
            route_options: self.options.clone(),
            auth: self.auth.clone(),
            redirect_url: self
                .redirect_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| format!("{}{}", base_path.trim_end_matches('/'), url)),
            route_page_name: self.page_name.clone().unwrap_or_default(),
            route_extension_name: self.extension_name.clone().unwrap_or_default(),
        }
    }
}

/// Source of stored route definitions.
pub trait RouteLoader: Send + Sync {
    /// Returns the home page route(s).
    fn home_page_routes(&self) -> BoxFuture<'_, Result<Vec<RouteDescriptor>>>;

    /// Returns routes of the given kind for a method.
    fn search_routes(&self, method: Method, kind: RouteKind)
        -> BoxFuture<'_, Result<Vec<RouteDescriptor>>>;
}

/// Route loader backed by an in-memory list.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteLoader {
    routes: Vec<RouteDescriptor>,
}

impl MemoryRouteLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route definition.
    #[must_use]
    pub fn route(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(route);
        self
    }

    /// Parses a JSON array of route definitions.
    pub fn from_json(json: &str) -> Result<Self> {
        let routes: Vec<RouteDescriptor> = serde_json::from_str(json)
            .map_err(|e| RouterError::RouteLoader(format!("invalid route definitions: {e}")))?;
        Ok(Self { routes })
    }

    /// Returns all stored definitions.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }
}

impl RouteLoader for MemoryRouteLoader {
    fn home_page_routes(&self) -> BoxFuture<'_, Result<Vec<RouteDescriptor>>> {
        Box::pin(async move {
            Ok(self
                .routes
                .iter()
                .filter(|r| r.kind == RouteKind::HomePage)
                .cloned()
                .collect())
        })
    }

    fn search_routes(
        &self,
        method: Method,
        kind: RouteKind,
    ) -> BoxFuture<'_, Result<Vec<RouteDescriptor>>> {
        Box::pin(async move {
            Ok(self
                .routes
                .iter()
                .filter(|r| r.method == method && r.kind == kind)
                .cloned()
                .collect())
        })
    }
}
