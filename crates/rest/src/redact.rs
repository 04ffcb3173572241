//! Header redaction: a set of precompiled regexes rewrites matching
//! substrings of serialized header values to the literal `[REDACTED]`.
//!
//! Applied once when persisting a recorded interaction, and again, with the
//! same pattern set, to the live request before header comparison in mock
//! mode, so a recorded `[REDACTED]` compares equal to any current value of a
//! redacted field.

use std::collections::HashMap;

use regex::Regex;

#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Redactor {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    /// Apply every pattern to every header value, replacing matches with
    /// `[REDACTED]`. Header names are left untouched.
    pub fn redact_headers(&self, headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| (k.clone(), self.redact_value(v)))
            .collect()
    }

    pub fn redact_value(&self, value: &str) -> String {
        let mut result = value.to_string();
        for pattern in &self.patterns {
            result = pattern.replace_all(&result, "[REDACTED]").into_owned();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_matching_substrings() {
        let redactor = Redactor::new(&["Bearer .+".to_string()]).unwrap();
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer abc123".to_string());

        let redacted = redactor.redact_headers(&headers);
        assert_eq!(redacted["authorization"], "[REDACTED]");
    }

    #[test]
    fn leaves_non_matching_headers_untouched() {
        let redactor = Redactor::new(&["Bearer .+".to_string()]).unwrap();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        let redacted = redactor.redact_headers(&headers);
        assert_eq!(redacted["content-type"], "application/json");
    }

    #[test]
    fn symmetric_redaction_makes_recorded_and_live_headers_comparable() {
        let redactor = Redactor::new(&["Bearer .+".to_string()]).unwrap();
        let recorded = redactor.redact_value("Bearer token-from-yesterday");
        let live = redactor.redact_value("Bearer token-from-today");
        assert_eq!(recorded, live);
    }

    #[test]
    fn invalid_pattern_is_rejected_at_construction() {
        assert!(Redactor::new(&["(unclosed".to_string()]).is_err());
    }
}
