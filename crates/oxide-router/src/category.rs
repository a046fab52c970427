//! Route categories.
//!
//! A request path is classified into a coarse category that decides which
//! subset of routes gets loaded and compiled for the request. Classification
//! is a pure function of the path and the configured prefixes.

use serde::{Deserialize, Serialize};

/// Coarse classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    /// Site root, optionally followed by a language code.
    HomePage,
    /// Control panel pages.
    AdminPage,
    /// The setup wizard page.
    InstallPage,
    /// Admin API endpoints.
    AdminApi,
    /// Public API endpoints.
    Api,
    /// Built-in system API endpoints.
    SystemApi,
    /// Built-in install API endpoints.
    InstallApi,
    /// Anything else: extension and template pages.
    Page,
}

impl RouteCategory {
    /// Returns the category name used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomePage => "home_page",
            Self::AdminPage => "admin_page",
            Self::InstallPage => "install_page",
            Self::AdminApi => "admin_api",
            Self::Api => "api",
            Self::SystemApi => "system_api",
            Self::InstallApi => "install_api",
            Self::Page => "page",
        }
    }
}

impl std::fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path prefixes used for classification, relative to the base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryOptions {
    /// Control panel prefix.
    pub admin_page: String,
    /// Setup wizard page.
    pub install_page: String,
    /// Public API prefix.
    pub api: String,
    /// Admin API prefix.
    pub admin_api: String,
    /// System API prefix.
    pub system_api: String,
    /// Install API prefix.
    pub install_api: String,
}

impl Default for CategoryOptions {
    fn default() -> Self {
        Self {
            admin_page: "/admin".to_string(),
            install_page: "/admin/install".to_string(),
            api: "/api".to_string(),
            admin_api: "/api/admin".to_string(),
            system_api: "/core/api".to_string(),
            install_api: "/core/api/install".to_string(),
        }
    }
}

impl CategoryOptions {
    /// Classifies a route path.
    pub fn classify(&self, path: &str) -> RouteCategory {
        let path = path.trim_end_matches('/');

        if self.is_install_page(path) {
            RouteCategory::InstallPage
        } else if self.is_install_api(path) {
            RouteCategory::InstallApi
        } else if has_prefix(path, &self.system_api) {
            RouteCategory::SystemApi
        } else if has_prefix(path, &self.admin_api) {
            RouteCategory::AdminApi
        } else if has_prefix(path, &self.admin_page) {
            RouteCategory::AdminPage
        } else if has_prefix(path, &self.api) {
            RouteCategory::Api
        } else if is_home_page(path) {
            RouteCategory::HomePage
        } else {
            RouteCategory::Page
        }
    }

    /// Returns whether the route path is the setup wizard page.
    pub fn is_install_page(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.install_page.trim_end_matches('/')
    }

    /// Returns whether the route path is an install API request.
    pub fn is_install_api(&self, path: &str) -> bool {
        has_prefix(path.trim_end_matches('/'), &self.install_api)
    }
}

/// Classifies `path` with the given prefixes.
pub fn classify(path: &str, options: &CategoryOptions) -> RouteCategory {
    options.classify(path)
}

/// Strips the base path and trailing slashes from a request path.
pub fn route_path<'a>(base_path: &str, path: &'a str) -> &'a str {
    let base = base_path.trim_end_matches('/');
    let stripped = if base.is_empty() {
        path
    } else {
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    };
    stripped.trim_end_matches('/')
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn is_home_page(path: &str) -> bool {
    match path.strip_prefix('/') {
        None => path.is_empty(),
        Some(rest) => rest.len() == 2 && rest.chars().all(|c| c.is_ascii_lowercase()),
    }
}
