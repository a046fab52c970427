//! Route cache collaborator.
//!
//! Compiled route tables are memoized per `(method, category)` under keys of
//! the form `<kind>.<scope>.<method>.<category>`. The scope carries the base
//! path so that two mounts never share an entry.

use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::RouteCategory;
use crate::generator::RouteGenerator;
use crate::middleware::MiddlewareRef;
use crate::options::RouteOptions;
use crate::request::Method;

/// Cache entry kind for compiled route tables.
pub const ROUTES_KIND: &str = "routes";

/// Builds a cache key.
pub fn cache_key(kind: &str, scope: &str, method: Method, category: RouteCategory) -> String {
    format!("{kind}.{scope}.{method}.{category}")
}

/// Key/value cache used to memoize compiled route tables.
pub trait RouteCache: Send + Sync {
    /// Returns the stored value, if any.
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Value>>;

    /// Stores a value, replacing any previous one.
    fn save<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, ()>;
}

/// In-process cache backed by a map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl RouteCache for MemoryCache {
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move { self.entries.read().ok()?.get(key).cloned() })
    }

    fn save<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Ok(mut entries) = self.entries.write() {
                entries.insert(key.to_string(), value);
            }
        })
    }
}

/// Snapshot of everything one mapping pass produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedRoutes {
    /// Compiled route table.
    pub generator: RouteGenerator,
    /// Route options keyed by method and route id.
    pub options: HashMap<Method, HashMap<String, RouteOptions>>,
    /// Named route middlewares keyed by method and handler ref.
    pub middlewares: HashMap<Method, HashMap<String, Vec<MiddlewareRef>>>,
}
