//! Handler and middleware registry.
//!
//! Handlers and middleware are looked up by key and built by registered
//! factories. Middleware factories receive the options of the route they
//! run for.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::handler::{Handler, NotFoundHandler, PAGE_NOT_FOUND_HANDLER};
use crate::loader::DEFAULT_ACTION;
use crate::middleware::{
    AuthFactory, BodyParsingMiddleware, ClientIpMiddleware, Middleware, MiddlewareRef,
    UserProvider, AUTH_MIDDLEWARE,
};
use crate::options::RouteOptions;

/// Builds a handler instance.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Builds a middleware instance for a route.
pub type MiddlewareFactory =
    Arc<dyn Fn(&RouteOptions) -> AppResult<Arc<dyn Middleware>> + Send + Sync>;

/// Key under which the body parsing middleware is registered.
pub const BODY_PARSING_MIDDLEWARE: &str = "body_parsing";

/// Key under which the client ip middleware is registered.
pub const CLIENT_IP_MIDDLEWARE: &str = "client_ip";

/// Registry of handler and middleware factories.
#[derive(Clone)]
pub struct Container {
    handlers: HashMap<String, HandlerFactory>,
    middlewares: HashMap<String, MiddlewareFactory>,
    auth_factory: Option<Arc<dyn AuthFactory>>,
    user_providers: Vec<(String, Arc<dyn UserProvider>)>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a container with the built-in handlers and middleware.
    pub fn new() -> Self {
        let class = PAGE_NOT_FOUND_HANDLER
            .split_once(':')
            .map_or(PAGE_NOT_FOUND_HANDLER, |(class, _)| class);

        Self::empty()
            .handler(class, NotFoundHandler::new)
            .middleware(BODY_PARSING_MIDDLEWARE, |_| {
                Ok(Arc::new(BodyParsingMiddleware::new()) as Arc<dyn Middleware>)
            })
            .middleware(CLIENT_IP_MIDDLEWARE, |_| {
                Ok(Arc::new(ClientIpMiddleware) as Arc<dyn Middleware>)
            })
    }

    /// Creates a container with nothing registered.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            middlewares: HashMap::new(),
            auth_factory: None,
            user_providers: Vec::new(),
        }
    }

    /// Registers a handler factory under a class key.
    #[must_use]
    pub fn handler<H, F>(mut self, class: &str, factory: F) -> Self
    where
        H: Handler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.handlers.insert(
            class.to_string(),
            Arc::new(move || Box::new(factory()) as Box<dyn Handler>),
        );
        self
    }

    /// Registers a middleware factory under a key.
    #[must_use]
    pub fn middleware<F>(mut self, key: &str, factory: F) -> Self
    where
        F: Fn(&RouteOptions) -> AppResult<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.middlewares.insert(key.to_string(), Arc::new(factory));
        self
    }

    /// Sets the factory that builds auth middleware.
    #[must_use]
    pub fn auth_factory(mut self, factory: Arc<dyn AuthFactory>) -> Self {
        self.auth_factory = Some(factory);
        self
    }

    /// Adds a user provider handed to the auth factory.
    #[must_use]
    pub fn user_provider(mut self, kind: &str, provider: Arc<dyn UserProvider>) -> Self {
        self.user_providers.push((kind.to_string(), provider));
        self
    }

    /// Returns whether a handler class is registered.
    pub fn has_handler(&self, class: &str) -> bool {
        self.handlers.contains_key(class)
    }

    /// Resolves a `Class:method` reference to a fresh handler and its action.
    pub fn resolve_handler(&self, handler_ref: &str) -> AppResult<(Box<dyn Handler>, String)> {
        let (class, action) = match handler_ref.split_once(':') {
            Some((class, action)) if !action.is_empty() => (class, action),
            Some((class, _)) => (class, DEFAULT_ACTION),
            None => (handler_ref, DEFAULT_ACTION),
        };

        let factory = self
            .handlers
            .get(class)
            .ok_or_else(|| AppError::HandlerResolution(handler_ref.to_string()))?;
        Ok((factory(), action.to_string()))
    }

    /// Resolves a middleware reference for a route.
    ///
    /// Unknown keys fail with [`AppError::InvalidMiddleware`]. The reserved
    /// `auth` key is built by the auth factory after the user providers are
    /// registered with it.
    pub fn resolve_middleware(
        &self,
        middleware: &MiddlewareRef,
        options: &RouteOptions,
    ) -> AppResult<Arc<dyn Middleware>> {
        let key = match middleware {
            MiddlewareRef::Instance(instance) => return Ok(Arc::clone(instance)),
            MiddlewareRef::Named(key) => key.as_str(),
        };

        if key == AUTH_MIDDLEWARE {
            let factory = self
                .auth_factory
                .as_ref()
                .ok_or_else(|| AppError::InvalidMiddleware(key.to_string()))?;
            for (kind, provider) in &self.user_providers {
                factory.set_user_provider(kind, Arc::clone(provider));
            }
            return factory.create_middleware(options.auth_spec().unwrap_or_default(), options);
        }

        let factory = self
            .middlewares
            .get(key)
            .ok_or_else(|| AppError::InvalidMiddleware(key.to_string()))?;
        factory(options)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        let mut middlewares: Vec<&String> = self.middlewares.keys().collect();
        middlewares.sort();
        f.debug_struct("Container")
            .field("handlers", &handlers)
            .field("middlewares", &middlewares)
            .field("auth_factory", &self.auth_factory.is_some())
            .finish()
    }
}
