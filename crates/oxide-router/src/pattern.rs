//! Route pattern parsing.
//!
//! Pattern syntax:
//! - `/users` - literal path
//! - `/users/{id}` - placeholder matching one path segment
//! - `/users/{id:\d+}` - placeholder with a regex constraint
//! - `/admin[/{lang:[a-z]{2}}/]` - optional trailing group
//!
//! Optional groups may nest (`/a[/b[/c]]`) but only at the end of the
//! pattern. Each group yields one more concrete variant of the route.

use crate::error::{Result, RouterError};

/// Regex used for placeholders without a constraint.
pub const DEFAULT_VARIABLE_REGEX: &str = "[^/]+";

/// A piece of a concrete route variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, matched verbatim.
    Literal(String),
    /// A named placeholder and the regex it must match.
    Variable { name: String, regex: String },
}

/// A parsed route pattern, expanded into its concrete variants.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pattern: String,
    variants: Vec<Vec<Segment>>,
}

impl RoutePattern {
    /// Parses a pattern into its variants, shortest first.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_router::RoutePattern;
    ///
    /// let pattern = RoutePattern::parse("/admin[/{lang:[a-z]{2}}/]").unwrap();
    /// assert_eq!(pattern.variants().len(), 2);
    /// ```
    pub fn parse(pattern: &str) -> Result<Self> {
        let without_closing = pattern.trim_end_matches(']');
        let num_optionals = pattern.len() - without_closing.len();

        let parts = split_optionals(pattern, without_closing)?;
        if num_optionals != parts.len() - 1 {
            return Err(RouterError::UnbalancedOptional(pattern.to_string()));
        }

        let mut current = String::new();
        let mut variants = Vec::with_capacity(parts.len());
        for (n, part) in parts.iter().enumerate() {
            if part.is_empty() && n != 0 {
                return Err(RouterError::EmptyOptional(pattern.to_string()));
            }
            current.push_str(part);
            variants.push(parse_placeholders(pattern, &current)?);
        }

        Ok(Self {
            pattern: pattern.to_string(),
            variants,
        })
    }

    /// Returns the original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the concrete variants, shortest first.
    pub fn variants(&self) -> &[Vec<Segment>] {
        &self.variants
    }
}

/// Returns the literal path of a variant without placeholders.
///
/// An empty literal reduces to `/`.
pub fn static_path(segments: &[Segment]) -> Option<String> {
    let mut path = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => path.push_str(text),
            Segment::Variable { .. } => return None,
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    Some(path)
}

/// Splits on `[` outside placeholders.
fn split_optionals<'a>(pattern: &str, text: &'a str) -> Result<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| RouterError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "unmatched '}'".to_string(),
                })?;
            }
            '[' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            ']' if depth == 0 => {
                return Err(RouterError::OptionalNotTrailing(pattern.to_string()));
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "unclosed placeholder".to_string(),
        });
    }

    parts.push(&text[start..]);
    Ok(parts)
}

/// Splits one variant into literal and placeholder segments.
fn parse_placeholders(pattern: &str, route: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut seen: Vec<String> = Vec::new();
    let mut chars = route.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }

        let mut depth = 1usize;
        let mut body = String::new();
        for inner in chars.by_ref() {
            match inner {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            body.push(inner);
        }

        let (name, regex) = match body.split_once(':') {
            Some((name, regex)) if !regex.trim().is_empty() => (name.trim(), regex.trim()),
            Some((name, _)) => (name.trim(), DEFAULT_VARIABLE_REGEX),
            None => (body.trim(), DEFAULT_VARIABLE_REGEX),
        };

        if !is_valid_name(name) {
            return Err(RouterError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!("invalid placeholder name '{name}'"),
            });
        }
        if seen.iter().any(|n| n == name) {
            return Err(RouterError::DuplicatePlaceholder {
                pattern: pattern.to_string(),
                name: name.to_string(),
            });
        }
        seen.push(name.to_string());

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Variable {
            name: name.to_string(),
            regex: regex.to_string(),
        });
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
