//! Code-defined routes.
//!
//! System and install API routes never come from the route loader; they are
//! registered from this table. The control panel and install page routes
//! are registered for admin page requests.

use std::collections::HashMap;

use crate::request::Method;

/// Handler of the control panel page.
pub const CONTROL_PANEL_HANDLER: &str = "core.control_panel:load";

/// Handler of the install page.
pub const INSTALL_PAGE_HANDLER: &str = "core.install_page:load";

/// A code-defined route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRoute {
    /// Path pattern relative to the base path.
    pub pattern: String,
    /// `Class:method` handler reference.
    pub handler: String,
    /// Auth providers required by the route.
    pub auth: Option<String>,
}

impl SystemRoute {
    /// Creates a public route.
    pub fn new(pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler: handler.into(),
            auth: None,
        }
    }

    /// Requires authentication.
    #[must_use]
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }
}

/// The code-defined route tables.
#[derive(Debug, Clone)]
pub struct SystemRoutes {
    routes: HashMap<Method, Vec<SystemRoute>>,
    install_routes: HashMap<Method, Vec<SystemRoute>>,
    /// Control panel pattern, relative to the base path.
    pub control_panel_pattern: String,
    /// Control panel handler.
    pub control_panel_handler: String,
    /// Install page handler.
    pub install_page_handler: String,
}

impl Default for SystemRoutes {
    fn default() -> Self {
        Self::empty()
            .install_route(Method::Post, SystemRoute::new("/core/api/install/", "core.install:install"))
            .install_route(Method::Get, SystemRoute::new("/core/api/install/status", "core.install:status"))
            .install_route(Method::Put, SystemRoute::new("/core/api/install/repair", "core.install:repair"))
            .route(Method::Get, SystemRoute::new("/core/api/session/", "core.session:get"))
            .route(
                Method::Put,
                SystemRoute::new("/core/api/session/recreate", "core.session:recreate").auth("session"),
            )
            .route(Method::Post, SystemRoute::new("/core/api/user/login", "core.user:login"))
            .route(
                Method::Get,
                SystemRoute::new("/core/api/user/logout", "core.user:logout").auth("session"),
            )
    }
}

impl SystemRoutes {
    /// Creates tables without any system or install API routes.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
            install_routes: HashMap::new(),
            control_panel_pattern: "/admin[/{language:[a-z]{2}}/]".to_string(),
            control_panel_handler: CONTROL_PANEL_HANDLER.to_string(),
            install_page_handler: INSTALL_PAGE_HANDLER.to_string(),
        }
    }

    /// Adds a system API route.
    #[must_use]
    pub fn route(mut self, method: Method, route: SystemRoute) -> Self {
        self.routes.entry(method).or_default().push(route);
        self
    }

    /// Adds an install API route.
    #[must_use]
    pub fn install_route(mut self, method: Method, route: SystemRoute) -> Self {
        self.install_routes.entry(method).or_default().push(route);
        self
    }

    /// Sets the control panel route.
    #[must_use]
    pub fn control_panel(mut self, pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        self.control_panel_pattern = pattern.into();
        self.control_panel_handler = handler.into();
        self
    }

    /// Sets the install page handler.
    #[must_use]
    pub fn install_page_handler(mut self, handler: impl Into<String>) -> Self {
        self.install_page_handler = handler.into();
        self
    }

    /// Returns the routes for a method, choosing the install set on request.
    pub fn for_method(&self, method: Method, install_api: bool) -> &[SystemRoute] {
        let table = if install_api {
            &self.install_routes
        } else {
            &self.routes
        };
        table.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }
}
