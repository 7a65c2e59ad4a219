//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `PUMUKI_*` environment variables with
//! validation, error collection, and source tracking.

use super::source::{ConfigSource, Sourced};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
/// Reads the process environment unless built with [`EnvParser::with_vars`].
pub struct EnvParser {
    prefix: &'static str,
    vars: Option<HashMap<String, String>>,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the PUMUKI_ prefix over the process environment.
    pub fn new() -> Self {
        Self {
            prefix: "PUMUKI_",
            vars: None,
            errors: Vec::new(),
        }
    }

    /// Create a parser over an explicit variable map (full names, prefix included).
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: "PUMUKI_",
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn lookup(&self, var_name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(var_name).cloned(),
            None => std::env::var(var_name).ok(),
        }
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match self.lookup(&var_name) {
            Some(value) => Sourced::from_env(value, var_name),
            None => Sourced::default_value(default.to_string()),
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match self.lookup(&var_name) {
            Some(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            None => Sourced::default_value(default),
        }
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        self.get_ranged(name, default, min, max, "unsigned 32-bit integer")
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        self.get_ranged(name, default, min, max, "unsigned 64-bit integer")
    }

    fn get_ranged<T>(&mut self, name: &str, default: T, min: T, max: T, expected: &str) -> Sourced<T>
    where
        T: std::str::FromStr + PartialOrd + ToString + Copy,
    {
        let var_name = self.var_name(name);
        let Some(value) = self.lookup(&var_name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<T>() {
            Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name.clone(),
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::from_env(default, var_name)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get a path value. Empty values fall back to the default.
    pub fn get_path(&mut self, name: &str, default: &str) -> Sourced<PathBuf> {
        let var_name = self.var_name(name);
        match self.lookup(&var_name) {
            Some(value) if !value.trim().is_empty() => {
                Sourced::from_env(PathBuf::from(value.trim()), var_name)
            }
            _ => Sourced {
                value: PathBuf::from(default),
                source: ConfigSource::Default,
                origin: None,
            },
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match self.lookup(&var_name) {
            Some(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::from_env(default.to_string(), var_name)
                    }
                }
            }
            None => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional string (None if not set or blank). Values are trimmed.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match self.lookup(&var_name) {
            Some(value) if value.trim().is_empty() => Sourced::from_env(None, var_name),
            Some(value) => Sourced::from_env(Some(value.trim().to_string()), var_name),
            None => Sourced::default_value(None),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bool_true_values() {
        for val in ["1", "true", "yes", "on", "TRUE", "Yes"] {
            let mut parser = EnvParser::with_vars([("PUMUKI_TEST_BOOL", val)]);
            let result = parser.get_bool("TEST_BOOL", false);
            assert!(result.value, "Expected true for '{}'", val);
            assert!(!parser.has_errors());
        }
    }

    #[test]
    fn test_get_bool_false_values() {
        for val in ["0", "false", "no", "off", "FALSE", ""] {
            let mut parser = EnvParser::with_vars([("PUMUKI_TEST_BOOL", val)]);
            let result = parser.get_bool("TEST_BOOL", true);
            assert!(!result.value, "Expected false for '{}'", val);
            assert!(!parser.has_errors());
        }
    }

    #[test]
    fn test_get_bool_invalid_uses_default() {
        let mut parser = EnvParser::with_vars([("PUMUKI_BAD_BOOL", "maybe")]);
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert!(parser.has_errors());
    }

    #[test]
    fn test_get_u64_range_valid() {
        let mut parser = EnvParser::with_vars([("PUMUKI_TEST_U64", "50")]);
        let result = parser.get_u64_range("TEST_U64", 10, 0, 100);
        assert_eq!(result.value, 50);
        assert_eq!(result.source, ConfigSource::Environment);
        assert!(!parser.has_errors());
    }

    #[test]
    fn test_get_u64_range_out_of_range() {
        let mut parser = EnvParser::with_vars([("PUMUKI_TEST_U64", "200")]);
        let result = parser.get_u64_range("TEST_U64", 10, 0, 100);
        assert_eq!(result.value, 10);
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));
    }

    #[test]
    fn test_errors_accumulate() {
        let mut parser = EnvParser::with_vars([
            ("PUMUKI_A", "not-a-number"),
            ("PUMUKI_B", "loud"),
        ]);
        parser.get_u32_range("A", 1, 0, 10);
        parser.get_log_level("B", "info");
        assert_eq!(parser.take_errors().len(), 2);
        assert!(!parser.has_errors());
    }

    #[test]
    fn test_unset_values_are_defaults() {
        let mut parser = EnvParser::with_vars(Vec::<(String, String)>::new());
        assert!(parser.get_string("MISSING", "x").is_default());
        assert!(parser.get_optional_string("MISSING").value.is_none());
        assert_eq!(
            parser.get_path("MISSING", ".pumuki/a.json").value,
            PathBuf::from(".pumuki/a.json")
        );
    }

    #[test]
    fn test_optional_string_trims_and_blanks_to_none() {
        let mut parser = EnvParser::with_vars([
            ("PUMUKI_TOKEN", "  abc  "),
            ("PUMUKI_BLANK", "   "),
        ]);
        assert_eq!(parser.get_optional_string("TOKEN").value.as_deref(), Some("abc"));
        let blank = parser.get_optional_string("BLANK");
        assert!(blank.value.is_none());
        assert_eq!(blank.source, ConfigSource::Environment);
    }
}
