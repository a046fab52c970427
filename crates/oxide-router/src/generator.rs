//! Route table compilation.
//!
//! Routes without placeholders go into a static table keyed by method and
//! literal path. Everything else is compiled to one regex per route variant
//! and, at lookup time, batched into chunks that join several routes into a
//! single alternation. Alternatives keep registration order, so the first
//! route registered for a method wins when two could match the same path.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::pattern::{static_path, RoutePattern, Segment};
use crate::request::{Method, PathParams};

/// Default number of routes joined into one chunk regex.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Upper bound on capture groups in one chunk regex.
pub const MAX_CHUNK_GROUPS: usize = 250;

/// A registered route as stored in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Opaque `Class:method` handler reference.
    pub handler: String,
    /// Stable id used to look up route options.
    pub route_id: Option<String>,
    /// Pattern text the route was registered with.
    pub pattern: String,
}

impl Route {
    /// Key of the route's options: the route id, else the handler ref.
    pub fn options_key(&self) -> &str {
        self.route_id.as_deref().unwrap_or(&self.handler)
    }
}

/// A compiled route variant with at least one placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRoute {
    /// Regex for this variant, without anchors.
    pub regex: String,
    /// Placeholder names in declared order.
    pub variables: Vec<String>,
    /// The originating route.
    pub route: Route,
}

/// Entry of a chunk's route map.
#[derive(Debug, Clone)]
pub struct RouteMapEntry {
    /// The originating route.
    pub route: Route,
    /// Placeholder names in declared order.
    pub variables: Vec<String>,
}

/// Several variable routes joined into one anchored alternation.
///
/// Each alternative is wrapped in its own group; the route map is keyed by
/// the index of that group, and the route's placeholders occupy the groups
/// right after it.
#[derive(Debug, Clone)]
pub struct RouteChunk {
    regex: Regex,
    route_map: BTreeMap<usize, RouteMapEntry>,
}

impl RouteChunk {
    fn compile(routes: &[&VariableRoute]) -> Result<Self> {
        let mut source = String::from("^(?:");
        let mut route_map = BTreeMap::new();
        let mut offset = 1;

        for (i, route) in routes.iter().enumerate() {
            if i > 0 {
                source.push('|');
            }
            source.push('(');
            source.push_str(&route.regex);
            source.push(')');

            route_map.insert(
                offset,
                RouteMapEntry {
                    route: route.route.clone(),
                    variables: route.variables.clone(),
                },
            );
            offset += 1 + route.variables.len();
        }
        source.push_str(")$");

        let regex = Regex::new(&source).map_err(|source_err| RouterError::InvalidRegex {
            pattern: source.clone(),
            source: source_err,
        })?;

        Ok(Self { regex, route_map })
    }

    /// Returns the compiled chunk regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns the route map keyed by alternative group index.
    pub fn route_map(&self) -> &BTreeMap<usize, RouteMapEntry> {
        &self.route_map
    }

    /// Matches the full URI against this chunk.
    ///
    /// Returns the winning route with its variables bound in declared order.
    pub fn find(&self, uri: &str) -> Option<(&Route, PathParams)> {
        let caps = self.regex.captures(uri)?;

        let (index, entry) = self
            .route_map
            .iter()
            .find(|(index, _)| caps.get(**index).is_some())?;

        let mut params = PathParams::new();
        for (i, name) in entry.variables.iter().enumerate() {
            if let Some(value) = caps.get(index + 1 + i) {
                params.insert(name.clone(), value.as_str());
            }
        }

        Some((&entry.route, params))
    }
}

/// The table data for one method.
#[derive(Debug)]
pub struct RouteData<'a> {
    /// Literal path to route.
    pub static_routes: Option<&'a HashMap<String, Route>>,
    /// Variable route chunks in registration order.
    pub chunks: Vec<RouteChunk>,
}

/// Compiles route definitions into static and variable tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteGenerator {
    static_routes: HashMap<Method, HashMap<String, Route>>,
    variable_routes: HashMap<Method, Vec<VariableRoute>>,
    #[serde(skip, default = "default_chunk_size")]
    chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for RouteGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self {
            static_routes: HashMap::new(),
            variable_routes: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the number of routes joined into one chunk.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Adds a route.
    ///
    /// Every variant of the pattern is registered. A static path registered
    /// twice for the same method keeps the later route.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: &str,
        route_id: Option<&str>,
    ) -> Result<()> {
        let parsed = RoutePattern::parse(pattern)?;
        let route = Route {
            handler: handler.to_string(),
            route_id: route_id.map(str::to_string),
            pattern: pattern.to_string(),
        };

        for variant in parsed.variants() {
            if let Some(path) = static_path(variant) {
                self.static_routes
                    .entry(method)
                    .or_default()
                    .insert(path, route.clone());
                continue;
            }

            let (regex, variables) = build_regex(pattern, variant)?;
            self.push_variable(
                method,
                VariableRoute {
                    regex,
                    variables,
                    route: route.clone(),
                },
            );
        }

        Ok(())
    }

    /// Identical regexes replace the earlier route in place.
    fn push_variable(&mut self, method: Method, route: VariableRoute) {
        let routes = self.variable_routes.entry(method).or_default();
        match routes.iter_mut().find(|r| r.regex == route.regex) {
            Some(existing) => *existing = route,
            None => routes.push(route),
        }
    }

    /// Returns the static table and compiled chunks for a method.
    pub fn data(&self, method: Method) -> Result<RouteData<'_>> {
        Ok(RouteData {
            static_routes: self.static_routes.get(&method),
            chunks: self.chunks(method)?,
        })
    }

    fn chunks(&self, method: Method) -> Result<Vec<RouteChunk>> {
        let Some(routes) = self.variable_routes.get(&method) else {
            return Ok(Vec::new());
        };

        let mut chunks = Vec::new();
        let mut batch: Vec<&VariableRoute> = Vec::new();
        let mut groups = 0;

        for route in routes {
            let needed = route.variables.len() + 1;
            if !batch.is_empty()
                && (batch.len() >= self.chunk_size || groups + needed > MAX_CHUNK_GROUPS)
            {
                chunks.push(RouteChunk::compile(&batch)?);
                batch.clear();
                groups = 0;
            }
            batch.push(route);
            groups += needed;
        }

        if !batch.is_empty() {
            chunks.push(RouteChunk::compile(&batch)?);
        }

        Ok(chunks)
    }

    /// Returns the static route for an exact path.
    pub fn static_route(&self, method: Method, path: &str) -> Option<&Route> {
        self.static_routes.get(&method)?.get(path)
    }

    /// Returns the variable routes of a method in registration order.
    pub fn variable_routes(&self, method: Method) -> &[VariableRoute] {
        self.variable_routes
            .get(&method)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the methods that have at least one route.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .static_routes
            .iter()
            .filter(|(_, routes)| !routes.is_empty())
            .map(|(m, _)| *m)
            .chain(
                self.variable_routes
                    .iter()
                    .filter(|(_, routes)| !routes.is_empty())
                    .map(|(m, _)| *m),
            )
            .collect();
        methods.sort();
        methods.dedup();
        methods
    }

    /// Returns the number of table entries across all methods.
    pub fn len(&self) -> usize {
        self.static_routes.values().map(HashMap::len).sum::<usize>()
            + self.variable_routes.values().map(Vec::len).sum::<usize>()
    }

    /// Returns whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges another generator's routes after this one's.
    pub fn extend(&mut self, other: RouteGenerator) {
        for (method, routes) in other.static_routes {
            self.static_routes.entry(method).or_default().extend(routes);
        }
        for (method, routes) in other.variable_routes {
            for route in routes {
                self.push_variable(method, route);
            }
        }
    }
}

/// Builds the regex for one variant.
fn build_regex(pattern: &str, segments: &[Segment]) -> Result<(String, Vec<String>)> {
    let mut regex = String::new();
    let mut variables = Vec::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => regex.push_str(&regex::escape(text)),
            Segment::Variable { name, regex: part } => {
                if !balanced_groups(part) {
                    return Err(RouterError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: format!("unbalanced parentheses in constraint of '{name}'"),
                    });
                }
                let check = Regex::new(&format!("^(?:{part})$")).map_err(|source| {
                    RouterError::InvalidRegex {
                        pattern: pattern.to_string(),
                        source,
                    }
                })?;
                if check.captures_len() > 1 {
                    return Err(RouterError::CapturingGroup {
                        pattern: pattern.to_string(),
                        name: name.clone(),
                    });
                }

                regex.push('(');
                regex.push_str(part);
                regex.push(')');
                variables.push(name.clone());
            }
        }
    }

    Ok((regex, variables))
}

/// Returns whether the parentheses of a constraint pair up.
///
/// Escaped characters and bracketed classes are skipped. A constraint such
/// as `a)|(?:b` compiles on its own but would escape its group once joined
/// into a chunk.
fn balanced_groups(part: &str) -> bool {
    let mut depth = 0usize;
    let mut chars = part.chars();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '[' => in_class = true,
            '(' => depth += 1,
            ')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0 && !in_class
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(data: &'a RouteData<'_>, uri: &str) -> Option<(&'a Route, PathParams)> {
        data.chunks.iter().find_map(|chunk| chunk.find(uri))
    }

    #[test]
    fn test_static_last_writer_wins() {
        let mut generator = RouteGenerator::new();
        generator.add_route(Method::Get, "/about", "Pages:first", None).unwrap();
        generator.add_route(Method::Get, "/about", "Pages:second", None).unwrap();

        let route = generator.static_route(Method::Get, "/about").unwrap();
        assert_eq!(route.handler, "Pages:second");
        assert_eq!(generator.len(), 1);
    }

    #[test]
    fn test_variable_route_binds_in_order() {
        let mut generator = RouteGenerator::new();
        generator
            .add_route(Method::Get, "/posts/{post}/comments/{id:\\d+}", "Comments:show", None)
            .unwrap();

        let data = generator.data(Method::Get).unwrap();
        let (route, params) = find(&data, "/posts/hello/comments/7").unwrap();
        assert_eq!(route.handler, "Comments:show");
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["post", "id"]);
        assert_eq!(params.get("id"), Some("7"));
        assert!(find(&data, "/posts/hello/comments/x").is_none());
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let mut generator = RouteGenerator::new();
        generator.add_route(Method::Get, "/items/{id:\\d+}", "Items:byId", None).unwrap();
        generator.add_route(Method::Get, "/items/{slug}", "Items:bySlug", None).unwrap();

        let data = generator.data(Method::Get).unwrap();
        assert_eq!(find(&data, "/items/42").unwrap().0.handler, "Items:byId");
        assert_eq!(find(&data, "/items/abc").unwrap().0.handler, "Items:bySlug");
    }

    #[test]
    fn test_routes_split_into_chunks() {
        let mut generator = RouteGenerator::new().chunk_size(2);
        for i in 0..5 {
            generator
                .add_route(Method::Get, &format!("/r{i}/{{id}}"), &format!("R:h{i}"), None)
                .unwrap();
        }

        let data = generator.data(Method::Get).unwrap();
        assert_eq!(data.chunks.len(), 3);
        let (route, params) = find(&data, "/r4/x").unwrap();
        assert_eq!(route.handler, "R:h4");
        assert_eq!(params.get("id"), Some("x"));
    }

    #[test]
    fn test_precedence_across_chunks() {
        let mut generator = RouteGenerator::new().chunk_size(1);
        generator.add_route(Method::Get, "/{a}", "First:a", None).unwrap();
        generator.add_route(Method::Get, "/{b:[a-z]+}", "Second:b", None).unwrap();

        let data = generator.data(Method::Get).unwrap();
        assert_eq!(data.chunks.len(), 2);
        assert_eq!(find(&data, "/abc").unwrap().0.handler, "First:a");
    }

    #[test]
    fn test_optional_group_registers_both_variants() {
        let mut generator = RouteGenerator::new();
        generator
            .add_route(Method::Get, "/admin[/{lang:[a-z]{2}}/]", "Panel:load", None)
            .unwrap();

        assert!(generator.static_route(Method::Get, "/admin").is_some());
        let data = generator.data(Method::Get).unwrap();
        let (_, params) = find(&data, "/admin/en/").unwrap();
        assert_eq!(params.get("lang"), Some("en"));
        assert!(find(&data, "/admin/eng/").is_none());
    }

    #[test]
    fn test_identical_regex_replaced_in_place() {
        let mut generator = RouteGenerator::new();
        generator.add_route(Method::Get, "/a/{x}", "A:old", None).unwrap();
        generator.add_route(Method::Get, "/b/{y}", "B:show", None).unwrap();
        generator.add_route(Method::Get, "/a/{z}", "A:new", None).unwrap();

        let routes = generator.variable_routes(Method::Get);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].route.handler, "A:new");
        assert_eq!(routes[0].variables, vec!["z".to_string()]);
    }

    #[test]
    fn test_capturing_group_rejected() {
        let mut generator = RouteGenerator::new();
        let err = generator
            .add_route(Method::Get, "/x/{id:(a|b)}", "X:y", None)
            .unwrap_err();
        assert!(matches!(err, RouterError::CapturingGroup { .. }));

        generator
            .add_route(Method::Get, "/x/{id:(?:a|b)}", "X:y", None)
            .unwrap();
    }

    #[test]
    fn test_invalid_constraint() {
        let mut generator = RouteGenerator::new();
        let err = generator
            .add_route(Method::Get, "/x/{id:[a-}", "X:y", None)
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidRegex { .. }));
    }

    #[test]
    fn test_unbalanced_constraint_rejected() {
        let mut generator = RouteGenerator::new();
        let err = generator
            .add_route(Method::Get, "/x/{id:a)|(?:b}", "X:show", None)
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern { .. }));
        assert!(generator.is_empty());

        generator
            .add_route(Method::Get, "/x/{id:[()]+|\\(\\)}", "X:show", None)
            .unwrap();
        let data = generator.data(Method::Get).unwrap();
        assert!(find(&data, "/x/()").is_some());
        assert!(find(&data, "b").is_none());
    }

    #[test]
    fn test_methods_are_separate() {
        let mut generator = RouteGenerator::new();
        generator.add_route(Method::Post, "/items", "Items:create", None).unwrap();

        assert!(generator.static_route(Method::Get, "/items").is_none());
        assert_eq!(generator.methods(), vec![Method::Post]);
        assert!(generator.data(Method::Get).unwrap().chunks.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_matching() {
        let mut generator = RouteGenerator::new();
        generator.add_route(Method::Get, "/items/{id:\\d+}", "Items:show", Some("r1")).unwrap();

        let json = serde_json::to_value(&generator).unwrap();
        let restored: RouteGenerator = serde_json::from_value(json).unwrap();
        let data = restored.data(Method::Get).unwrap();
        let (route, _) = find(&data, "/items/9").unwrap();
        assert_eq!(route.route_id.as_deref(), Some("r1"));
    }
}
