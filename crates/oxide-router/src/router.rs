//! Main router implementation.
//!
//! The router owns the route table, the per-route option and middleware
//! registries, and the loading step that fills them for the category of
//! the current request path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::cache::{cache_key, CachedRoutes, RouteCache, ROUTES_KIND};
use crate::category::{route_path, CategoryOptions, RouteCategory};
use crate::error::Result;
use crate::generator::{Route, RouteChunk, RouteGenerator, DEFAULT_CHUNK_SIZE};
use crate::loader::{RouteKind, RouteLoader};
use crate::middleware::{MiddlewareRef, AUTH_MIDDLEWARE};
use crate::options::RouteOptions;
use crate::request::{Method, PathParams};
use crate::system::SystemRoutes;

/// A dispatched route with its bound placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Method of the table the route was found in.
    pub method: Method,
    /// The matched route.
    pub route: Route,
    /// Placeholder values in declared order.
    pub params: PathParams,
}

/// Outcome of [`Router::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A route matched.
    Found(RouteMatch),
    /// No route matched.
    NotFound,
    /// The path matched, but only for other methods.
    MethodNotAllowed(Vec<Method>),
}

impl Dispatch {
    /// Returns whether a route matched.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// The router.
pub struct Router {
    generator: RouteGenerator,
    base_path: String,
    route_options: HashMap<Method, HashMap<String, RouteOptions>>,
    route_middlewares: HashMap<Method, HashMap<String, Vec<MiddlewareRef>>>,
    loader: Option<Arc<dyn RouteLoader>>,
    cache: Option<Arc<dyn RouteCache>>,
    categories: CategoryOptions,
    system_routes: Arc<SystemRoutes>,
    cache_scope: String,
    chunk_size: usize,
    loaded: HashSet<String>,
    compiled: RwLock<HashMap<Method, Arc<Vec<RouteChunk>>>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new("")
    }
}

impl Clone for Router {
    fn clone(&self) -> Self {
        Self {
            generator: self.generator.clone(),
            base_path: self.base_path.clone(),
            route_options: self.route_options.clone(),
            route_middlewares: self.route_middlewares.clone(),
            loader: self.loader.clone(),
            cache: self.cache.clone(),
            categories: self.categories.clone(),
            system_routes: Arc::clone(&self.system_routes),
            cache_scope: self.cache_scope.clone(),
            chunk_size: self.chunk_size,
            loaded: self.loaded.clone(),
            compiled: RwLock::default(),
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("base_path", &self.base_path)
            .field("routes", &self.generator.len())
            .field("cache_scope", &self.cache_scope)
            .finish()
    }
}

impl Router {
    /// Creates an empty router mounted at `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path: String = base_path.into();
        Self {
            generator: RouteGenerator::new(),
            base_path: base_path.trim_end_matches('/').to_string(),
            route_options: HashMap::new(),
            route_middlewares: HashMap::new(),
            loader: None,
            cache: None,
            categories: CategoryOptions::default(),
            system_routes: Arc::new(SystemRoutes::default()),
            cache_scope: "router".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            loaded: HashSet::new(),
            compiled: RwLock::default(),
        }
    }

    /// Sets the route loader.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn RouteLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Sets the route cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn RouteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the category prefixes.
    #[must_use]
    pub fn categories(mut self, categories: CategoryOptions) -> Self {
        self.categories = categories;
        self
    }

    /// Sets the code-defined route tables.
    #[must_use]
    pub fn system_routes(mut self, routes: Arc<SystemRoutes>) -> Self {
        self.system_routes = routes;
        self
    }

    /// Sets the cache scope.
    #[must_use]
    pub fn cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.cache_scope = scope.into();
        self
    }

    /// Sets the number of routes per regex chunk.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self.generator = std::mem::take(&mut self.generator).chunk_size(self.chunk_size);
        self
    }

    /// Returns the base path.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns the category prefixes.
    pub fn category_options(&self) -> &CategoryOptions {
        &self.categories
    }

    /// Returns the route table.
    pub fn generator(&self) -> &RouteGenerator {
        &self.generator
    }

    /// Adds a route under the base path.
    ///
    /// Options are stored under the route id, or under the handler ref when
    /// the route has no id.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: &str,
        options: RouteOptions,
        route_id: Option<&str>,
    ) -> Result<()> {
        let route_id = route_id.filter(|id| !id.is_empty());
        let full_pattern = format!("{}{}", self.base_path, pattern);
        self.generator
            .add_route(method, &full_pattern, handler, route_id)?;

        self.route_options
            .entry(method)
            .or_default()
            .insert(route_id.unwrap_or(handler).to_string(), options);
        self.invalidate();
        Ok(())
    }

    /// Appends a middleware to a route. Duplicates are kept.
    pub fn add_route_middleware(
        &mut self,
        method: Method,
        handler: &str,
        middleware: impl Into<MiddlewareRef>,
    ) {
        self.route_middlewares
            .entry(method)
            .or_default()
            .entry(handler.to_string())
            .or_default()
            .push(middleware.into());
    }

    /// Returns the middlewares of a route in registration order.
    pub fn route_middlewares(&self, method: Method, handler: &str) -> &[MiddlewareRef] {
        self.route_middlewares
            .get(&method)
            .and_then(|m| m.get(handler))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the options stored for a matched route.
    pub fn route_options(&self, method: Method, route: &Route) -> Option<&RouteOptions> {
        self.route_options.get(&method)?.get(route.options_key())
    }

    /// Matches a method and path against the table.
    ///
    /// HEAD requests fall back to GET routes. When the path only matches
    /// routes of other methods the outcome lists those methods.
    pub fn dispatch(&self, method: Method, uri: &str) -> Result<Dispatch> {
        if let Some(found) = self.lookup(method, uri)? {
            debug!(%method, uri, handler = %found.route.handler, "route found");
            return Ok(Dispatch::Found(found));
        }
        if method == Method::Head {
            if let Some(found) = self.lookup(Method::Get, uri)? {
                return Ok(Dispatch::Found(found));
            }
        }

        let mut allowed = Vec::new();
        for other in self.generator.methods() {
            if other != method && self.lookup(other, uri)?.is_some() {
                allowed.push(other);
            }
        }

        if allowed.is_empty() {
            debug!(%method, uri, "route not found");
            Ok(Dispatch::NotFound)
        } else {
            debug!(%method, uri, ?allowed, "method not allowed");
            Ok(Dispatch::MethodNotAllowed(allowed))
        }
    }

    fn lookup(&self, method: Method, uri: &str) -> Result<Option<RouteMatch>> {
        if let Some(route) = self.generator.static_route(method, uri) {
            return Ok(Some(RouteMatch {
                method,
                route: route.clone(),
                params: PathParams::new(),
            }));
        }

        let chunks = self.chunks(method)?;
        Ok(chunks.iter().find_map(|chunk| {
            chunk.find(uri).map(|(route, params)| RouteMatch {
                method,
                route: route.clone(),
                params,
            })
        }))
    }

    /// Returns the compiled chunks of a method, compiling them once.
    fn chunks(&self, method: Method) -> Result<Arc<Vec<RouteChunk>>> {
        if let Some(chunks) = self.compiled.read().ok().and_then(|c| c.get(&method).cloned()) {
            return Ok(chunks);
        }

        let chunks = Arc::new(self.generator.data(method)?.chunks);
        if let Ok(mut compiled) = self.compiled.write() {
            compiled.insert(method, Arc::clone(&chunks));
        }
        Ok(chunks)
    }

    fn invalidate(&mut self) {
        self.compiled = RwLock::default();
    }

    /// Classifies the request path and fills the table for its category.
    ///
    /// A cached snapshot for the same method and category is used as-is;
    /// otherwise the category's routes are mapped and the result is cached.
    /// A method and category already loaded into this router is skipped.
    pub async fn load_routes(&mut self, method: Method, path: &str) -> Result<RouteCategory> {
        let route_path = route_path(&self.base_path, path).to_string();
        let category = self.categories.classify(&route_path);
        let key = cache_key(ROUTES_KIND, &self.scope(), method, category);
        if !self.loaded.insert(key.clone()) {
            debug!(%category, key = %key, "routes already loaded");
            return Ok(category);
        }

        if let Some(cache) = self.cache.clone() {
            if let Some(value) = cache.fetch(&key).await {
                match serde_json::from_value::<CachedRoutes>(value) {
                    Ok(snapshot) => {
                        debug!(%category, key = %key, "route cache hit");
                        self.absorb(snapshot);
                        return Ok(category);
                    }
                    Err(e) => warn!(key = %key, error = %e, "discarding unreadable route cache entry"),
                }
            }
        }

        debug!(%category, key = %key, "mapping routes");
        let mut scratch = self.scratch();
        scratch
            .map_category(method, category, &route_path)
            .await?;
        let snapshot = scratch.into_snapshot();

        if let Some(cache) = &self.cache {
            match serde_json::to_value(&snapshot) {
                Ok(value) => cache.save(&key, value).await,
                Err(e) => warn!(key = %key, error = %e, "route table not cached"),
            }
        }

        self.absorb(snapshot);
        Ok(category)
    }

    async fn map_category(
        &mut self,
        method: Method,
        category: RouteCategory,
        route_path: &str,
    ) -> Result<()> {
        match category {
            RouteCategory::HomePage => {
                self.map_routes(method, RouteKind::HomePage).await?;
            }
            RouteCategory::AdminPage | RouteCategory::InstallPage => self.map_admin_pages()?,
            RouteCategory::SystemApi | RouteCategory::InstallApi => {
                let install_api = self.categories.is_install_api(route_path);
                self.map_system_routes(method, install_api)?;
            }
            RouteCategory::Api => {
                self.map_routes(method, RouteKind::Api).await?;
            }
            RouteCategory::AdminApi => {
                self.map_routes(method, RouteKind::Api).await?;
                self.map_routes(method, RouteKind::AdminApi).await?;
            }
            RouteCategory::Page => {
                self.map_routes(method, RouteKind::Page).await?;
            }
        }
        Ok(())
    }

    /// Maps stored routes of one kind for a method.
    ///
    /// Returns `false` when there is no loader or the loader failed; the
    /// failure is logged and the table is left as it was.
    pub async fn map_routes(&mut self, method: Method, kind: RouteKind) -> Result<bool> {
        let Some(loader) = self.loader.clone() else {
            return Ok(false);
        };

        let loaded = if kind == RouteKind::HomePage {
            loader.home_page_routes().await
        } else {
            loader.search_routes(method, kind).await
        };
        let routes = match loaded {
            Ok(routes) => routes,
            Err(e) => {
                warn!(%method, ?kind, error = %e, "route loader failed");
                return Ok(false);
            }
        };

        for item in routes.iter().filter(|r| r.method == method) {
            let handler = item.handler_ref();
            let options = item.route_options(&self.base_path);
            let requires_auth = options.requires_auth();

            self.add_route(method, &item.pattern, &handler, options, item.uuid.as_deref())?;
            if requires_auth {
                self.add_route_middleware(method, &handler, AUTH_MIDDLEWARE);
            }
            for key in &item.middlewares {
                self.add_route_middleware(method, &handler, key.as_str());
            }
        }

        Ok(true)
    }

    /// Maps the code-defined system or install API routes for a method.
    ///
    /// Each route's handler ref doubles as its route id.
    pub fn map_system_routes(&mut self, method: Method, install_api: bool) -> Result<()> {
        let system = Arc::clone(&self.system_routes);
        for item in system.for_method(method, install_api) {
            let options = RouteOptions {
                auth: item.auth.clone(),
                ..RouteOptions::default()
            };
            let requires_auth = options.requires_auth();

            self.add_route(method, &item.pattern, &item.handler, options, Some(&item.handler))?;
            if requires_auth {
                self.add_route_middleware(method, &item.handler, AUTH_MIDDLEWARE);
            }
        }
        Ok(())
    }

    /// Maps the control panel and install page routes.
    pub fn map_admin_pages(&mut self) -> Result<()> {
        let system = Arc::clone(&self.system_routes);
        let install_page = self.categories.install_page.clone();

        self.add_route(
            Method::Get,
            &system.control_panel_pattern,
            &system.control_panel_handler,
            RouteOptions::default(),
            Some(&system.control_panel_handler),
        )?;
        self.add_route(
            Method::Get,
            &install_page,
            &system.install_page_handler,
            RouteOptions::default(),
            Some(&system.install_page_handler),
        )
    }

    /// Cache scope including the base path.
    fn scope(&self) -> String {
        if self.base_path.is_empty() {
            self.cache_scope.clone()
        } else {
            format!("{}@{}", self.cache_scope, self.base_path)
        }
    }

    /// An empty router with the same configuration.
    fn scratch(&self) -> Self {
        Self {
            generator: RouteGenerator::new().chunk_size(self.chunk_size),
            route_options: HashMap::new(),
            route_middlewares: HashMap::new(),
            cache: None,
            loaded: HashSet::new(),
            ..self.clone()
        }
    }

    fn into_snapshot(self) -> CachedRoutes {
        CachedRoutes {
            generator: self.generator,
            options: self.route_options,
            middlewares: self.route_middlewares,
        }
    }

    /// Merges a mapped or cached snapshot into this router.
    ///
    /// Loaded middlewares, which start with `auth` when the route needs
    /// it, run before middlewares added in code.
    fn absorb(&mut self, snapshot: CachedRoutes) {
        self.generator.extend(snapshot.generator);
        for (method, options) in snapshot.options {
            self.route_options.entry(method).or_default().extend(options);
        }
        for (method, handlers) in snapshot.middlewares {
            let registry = self.route_middlewares.entry(method).or_default();
            for (handler, refs) in handlers {
                registry.entry(handler).or_default().splice(0..0, refs);
            }
        }
        self.invalidate();
    }
}
