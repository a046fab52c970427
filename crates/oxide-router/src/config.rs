//! Application configuration.

use serde::Deserialize;

use crate::app::AppState;
use crate::category::CategoryOptions;
use crate::error::Result;
use crate::generator::DEFAULT_CHUNK_SIZE;
use crate::router::Router;

/// Settings for building a [`Router`] and the initial [`AppState`].
///
/// ```
/// use oxide_router::AppConfig;
///
/// let config = AppConfig::from_json(r#"{"base_path": "/shop", "installed": true}"#).unwrap();
/// assert_eq!(config.router().base_path(), "/shop");
/// assert!(config.state().installed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix of every route.
    pub base_path: String,
    /// Overrides `categories.install_page` when set.
    pub install_page: Option<String>,
    /// Whether first-time setup has completed.
    pub installed: bool,
    /// Path prefixes used to classify requests.
    pub categories: CategoryOptions,
    /// Scope of route cache keys.
    pub cache_scope: String,
    /// Maximum routes per compiled regex.
    pub chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            install_page: None,
            installed: false,
            categories: CategoryOptions::default(),
            cache_scope: "router".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AppConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the base path.
    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sets the install page path.
    #[must_use]
    pub fn install_page(mut self, path: impl Into<String>) -> Self {
        self.install_page = Some(path.into());
        self
    }

    /// Sets the install state.
    #[must_use]
    pub fn installed(mut self, installed: bool) -> Self {
        self.installed = installed;
        self
    }

    /// Sets the category prefixes.
    #[must_use]
    pub fn categories(mut self, categories: CategoryOptions) -> Self {
        self.categories = categories;
        self
    }

    /// Sets the cache scope.
    #[must_use]
    pub fn cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.cache_scope = scope.into();
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Returns the effective category prefixes.
    pub fn category_options(&self) -> CategoryOptions {
        let mut categories = self.categories.clone();
        if let Some(page) = &self.install_page {
            categories.install_page.clone_from(page);
        }
        categories
    }

    /// Builds a router without loader or cache.
    pub fn router(&self) -> Router {
        Router::new(self.base_path.as_str())
            .categories(self.category_options())
            .cache_scope(self.cache_scope.as_str())
            .chunk_size(self.chunk_size.max(1))
    }

    /// Returns the initial install state.
    pub fn state(&self) -> AppState {
        AppState::new(self.installed)
    }
}
