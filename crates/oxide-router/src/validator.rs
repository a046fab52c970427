//! Request data validation.
//!
//! The application builds one [`Validator`] per request from the route
//! placeholders merged with the parsed body, wired to the handler's
//! callbacks. Handlers add rules and call [`Validator::validate`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Called with the data when validation succeeds.
pub type DataValidCallback = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Called with the errors when validation fails.
pub type ValidationErrorCallback = Arc<dyn Fn(&ValidationErrors) + Send + Sync>;

/// A check applied to one field.
pub trait Rule: Send + Sync {
    /// Checks the field value, returning the error message on failure.
    fn check(&self, value: Option<&Value>) -> Result<(), String>;
}

/// Requires a present, non-blank value.
#[derive(Debug, Clone)]
pub struct Required {
    message: String,
}

impl Required {
    /// Creates the rule with the default message.
    pub fn new() -> Self {
        Self {
            message: "This field is required.".to_string(),
        }
    }

    /// Creates the rule with a custom message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for Required {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for Required {
    fn check(&self, value: Option<&Value>) -> Result<(), String> {
        match value {
            None | Some(Value::Null) => Err(self.message.clone()),
            Some(Value::String(s)) if s.trim().is_empty() => Err(self.message.clone()),
            Some(_) => Ok(()),
        }
    }
}

/// Requires the value, when present, to match a regex.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    message: String,
}

impl Pattern {
    /// Creates the rule.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }
}

impl Rule for Pattern {
    fn check(&self, value: Option<&Value>) -> Result<(), String> {
        let text = match value {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if self.regex.is_match(&text) {
            Ok(())
        } else {
            Err(self.message.clone())
        }
    }
}

/// Limits the character length of a string value.
#[derive(Debug, Clone)]
pub struct MaxLength {
    max: usize,
}

impl MaxLength {
    /// Creates the rule.
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Rule for MaxLength {
    fn check(&self, value: Option<&Value>) -> Result<(), String> {
        match value {
            Some(Value::String(s)) if s.chars().count() > self.max => Err(format!(
                "Ensure this value has at most {} characters (it has {}).",
                self.max,
                s.chars().count()
            )),
            _ => Ok(()),
        }
    }
}

/// Validation errors keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    /// Messages per field.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Adds an error for a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Returns whether there are no errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of fields with errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns the errors of one field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }
}

/// Validates the data of one request.
pub struct Validator {
    data: Map<String, Value>,
    rules: Vec<(String, Box<dyn Rule>)>,
    errors: ValidationErrors,
    on_valid: Option<DataValidCallback>,
    on_error: Option<ValidationErrorCallback>,
}

impl Validator {
    /// Creates a validator bound to the data and the two callbacks.
    pub fn new(
        data: Map<String, Value>,
        on_valid: Option<DataValidCallback>,
        on_error: Option<ValidationErrorCallback>,
    ) -> Self {
        Self {
            data,
            rules: Vec::new(),
            errors: ValidationErrors::default(),
            on_valid,
            on_error,
        }
    }

    /// Adds a rule for a field.
    #[must_use]
    pub fn rule(mut self, field: &str, rule: impl Rule + 'static) -> Self {
        self.add_rule(field, rule);
        self
    }

    /// Adds a rule for a field in place.
    pub fn add_rule(&mut self, field: &str, rule: impl Rule + 'static) {
        self.rules.push((field.to_string(), Box::new(rule)));
    }

    /// Runs every rule and calls the matching callback.
    pub fn validate(&mut self) -> bool {
        let mut errors = ValidationErrors::default();
        for (field, rule) in &self.rules {
            if let Err(message) = rule.check(self.data.get(field)) {
                errors.add(field, message);
            }
        }
        self.errors = errors;

        if self.errors.is_empty() {
            if let Some(callback) = &self.on_valid {
                callback(&self.data);
            }
            true
        } else {
            if let Some(callback) = &self.on_error {
                callback(&self.errors);
            }
            false
        }
    }

    /// Returns the validated data.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns one field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Returns one field as a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Returns the errors of the last validation.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("data", &self.data)
            .field("rules", &self.rules.len())
            .field("errors", &self.errors)
            .finish()
    }
}
