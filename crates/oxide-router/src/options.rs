//! Per-route metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata stored per route id, independent of the compiled matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Free-form options from the route definition.
    pub route_options: Option<Value>,
    /// Auth providers required by the route (e.g. `"session,token"`).
    pub auth: Option<String>,
    /// Where the auth middleware redirects unauthenticated requests.
    pub redirect_url: Option<String>,
    /// Display name of the page.
    pub route_page_name: String,
    /// Extension that registered the route.
    pub route_extension_name: String,
}

impl RouteOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the auth requirement.
    #[must_use]
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Sets the redirect target.
    #[must_use]
    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    /// Returns the auth requirement when it is non-empty.
    pub fn auth_spec(&self) -> Option<&str> {
        self.auth.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    /// Returns whether the route requires authentication.
    pub fn requires_auth(&self) -> bool {
        self.auth_spec().is_some()
    }

    /// Returns the redirect target when it is non-empty.
    pub fn redirect(&self) -> Option<&str> {
        self.redirect_url.as_deref().filter(|r| !r.is_empty())
    }
}
