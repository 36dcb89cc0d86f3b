//! Field-keyed validation errors shared by the services
//!
//! Forms and API payloads report every problem at once, keyed by the field
//! that caused it. The web layer serializes the map as the `details` of an
//! `invalid_data` or `invalid_query` error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

static EMAIL_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$"));

/// Whether `email` looks like `user@domain.tld`
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

/// Messages per field, in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error map with a single message
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Add a "required" message when `value` is missing or blank.
    ///
    /// Returns the trimmed value when present.
    pub fn require(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v.to_string()),
            None => {
                self.add(field, "This field is required");
                None
            }
        }
    }

    /// Add a message when `value` exceeds `max` characters
    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("Must be at most {} characters", max));
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was reported
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("ana.perez@example.com"));
        assert!(is_valid_email("a_b-c@sub.domain.org"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_require_and_collect() {
        let mut errors = FieldErrors::new();
        assert_eq!(errors.require("name", Some("  Ana ")), Some("Ana".to_string()));
        assert_eq!(errors.require("last_name", Some("   ")), None);
        assert_eq!(errors.require("email", None), None);
        errors.max_len("city", "Ciudad Autónoma", 5);

        assert!(errors.has("last_name"));
        assert!(errors.has("email"));
        assert!(errors.has("city"));
        assert!(!errors.has("name"));
        assert_eq!(
            errors.to_json()["email"],
            serde_json::json!(["This field is required"])
        );
        assert!(errors.into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }

    proptest! {
        #[test]
        fn prop_max_len_counts_chars(s in "\\PC{0,40}", max in 0usize..40) {
            let mut errors = FieldErrors::new();
            errors.max_len("field", &s, max);
            prop_assert_eq!(errors.has("field"), s.chars().count() > max);
        }
    }
}
