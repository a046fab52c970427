//! Authentication middleware and its factory.
//!
//! A route's `auth` option names one or more user providers
//! (`"session"`, `"token"`, `"session,token"`). The factory turns that list
//! into an [`AuthMiddleware`] that accepts the request as soon as one
//! provider recognizes a user.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{Middleware, Outcome};
use crate::error::{AppError, AppResult};
use crate::options::RouteOptions;
use crate::request::Request;
use crate::response::Response;

/// Request attribute holding the authenticated user.
pub const AUTH_USER_ATTRIBUTE: &str = "auth_user";

/// Looks up the user behind a request.
pub trait UserProvider: Send + Sync {
    /// Returns the user when the request carries valid credentials.
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Value>>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Recognizes users by a session cookie.
#[derive(Clone)]
pub struct SessionProvider {
    cookie: String,
    lookup: Lookup,
}

impl SessionProvider {
    /// Creates a provider reading the `session` cookie.
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            cookie: "session".to_string(),
            lookup: Arc::new(lookup),
        }
    }

    /// Sets the cookie name.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>) -> Self {
        self.cookie = name.into();
        self
    }

    fn session_id<'a>(&self, req: &'a Request) -> Option<&'a str> {
        req.get_header("Cookie")?.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie && !value.is_empty()).then_some(value)
        })
    }
}

impl UserProvider for SessionProvider {
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move { self.session_id(req).and_then(|id| (self.lookup)(id)) })
    }
}

/// Recognizes users by a bearer token.
///
/// The token is read from the `Authorization` header, or from the `token`
/// query parameter when the header is absent.
#[derive(Clone)]
pub struct TokenProvider {
    lookup: Lookup,
}

impl TokenProvider {
    /// Creates a provider with a token lookup.
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn token<'a>(req: &'a Request) -> Option<&'a str> {
        let token = match req.get_header("Authorization") {
            Some(header) => header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "))
                .map(str::trim),
            None => req.get_query("token"),
        };
        token.filter(|t| !t.is_empty())
    }
}

impl UserProvider for TokenProvider {
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move { Self::token(req).and_then(|t| (self.lookup)(t)) })
    }
}

/// Builds auth middleware from a route's auth requirement.
pub trait AuthFactory: Send + Sync {
    /// Registers a user provider under a kind name.
    fn set_user_provider(&self, kind: &str, provider: Arc<dyn UserProvider>);

    /// Creates the middleware for an auth requirement.
    fn create_middleware(
        &self,
        auth_spec: &str,
        options: &RouteOptions,
    ) -> AppResult<Arc<dyn Middleware>>;
}

/// Auth factory that maps provider names to registered user providers.
#[derive(Default)]
pub struct ProviderAuthFactory {
    providers: RwLock<HashMap<String, Arc<dyn UserProvider>>>,
}

impl ProviderAuthFactory {
    /// Creates a factory without providers.
    pub fn new() -> Self {
        Self::default()
    }

    fn provider(&self, kind: &str) -> Option<Arc<dyn UserProvider>> {
        self.providers.read().ok()?.get(kind).cloned()
    }
}

impl AuthFactory for ProviderAuthFactory {
    fn set_user_provider(&self, kind: &str, provider: Arc<dyn UserProvider>) {
        if let Ok(mut providers) = self.providers.write() {
            providers.insert(kind.to_string(), provider);
        }
    }

    fn create_middleware(
        &self,
        auth_spec: &str,
        options: &RouteOptions,
    ) -> AppResult<Arc<dyn Middleware>> {
        let mut providers = Vec::new();
        for kind in auth_spec.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let provider = self
                .provider(kind)
                .ok_or_else(|| AppError::InvalidMiddleware(format!("auth provider {kind}")))?;
            providers.push((kind.to_string(), provider));
        }

        Ok(Arc::new(AuthMiddleware {
            providers,
            redirect_url: options.redirect().map(str::to_string),
        }))
    }
}

impl fmt::Debug for ProviderAuthFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self
            .providers
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ProviderAuthFactory")
            .field("providers", &kinds)
            .finish()
    }
}

/// Middleware that requires one of its providers to recognize a user.
///
/// Without a user the request is redirected when a redirect target is
/// configured, otherwise it fails with [`AppError::AccessDenied`].
pub struct AuthMiddleware {
    providers: Vec<(String, Arc<dyn UserProvider>)>,
    redirect_url: Option<String>,
}

impl AuthMiddleware {
    /// Returns the provider kinds in check order.
    pub fn provider_kinds(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|(kind, _)| kind.as_str())
    }

    /// Returns the redirect target.
    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }
}

impl Middleware for AuthMiddleware {
    fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            for (kind, provider) in &self.providers {
                if let Some(user) = provider.authenticate(&req).await {
                    debug!(provider = %kind, path = %req.path, "request authenticated");
                    return Ok(Outcome::Continue(
                        req.with_attribute(AUTH_USER_ATTRIBUTE, user),
                        res,
                    ));
                }
            }

            match &self.redirect_url {
                Some(url) => Ok(Outcome::ShortCircuit(Response::redirect(url.as_str()))),
                None => Err(AppError::AccessDenied {
                    message: "Access denied".to_string(),
                    response: Some(Box::new(res.status(401))),
                }),
            }
        })
    }
}
