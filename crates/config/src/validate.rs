//! Startup validation. Programmer errors (bad regex, missing required field)
//! are rejected here rather than discovered mid-request.

use regex::Regex;
use serde::Serialize;

use crate::model::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Regex,
    Proxy,
    Mock,
    Replay,
    Database,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validate a loaded [`Config`]. Does not perform I/O (no upstream
/// connectivity probing); this crate has no notion of "live" state. It only
/// rejects configurations that could never work.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.proxies.is_empty() {
        result.add_warning(ValidationWarning::new(
            "no proxies configured; the dispatcher will have nothing to mount",
        ));
    }

    let mut default_count = 0;
    for (name, proxy) in &config.proxies {
        if proxy.session_name.trim().is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Proxy,
                format!("proxy '{name}' has an empty session_name"),
            ));
        }
        if proxy.is_default {
            default_count += 1;
        }
        for (field, pattern) in [
            ("service_pattern", &proxy.service_pattern),
            ("method_pattern", &proxy.method_pattern),
        ] {
            if let Some(pattern) = pattern {
                if let Err(e) = Regex::new(pattern) {
                    result.add_error(ValidationError::new(
                        ErrorCategory::Regex,
                        format!("proxy '{name}' {field} is not a valid regex: {e}"),
                    ));
                }
            }
        }
        if proxy.service_pattern.is_none() && proxy.method_pattern.is_none() && !proxy.is_default {
            result.add_warning(ValidationWarning::new(format!(
                "proxy '{name}' has no routing patterns and is not marked default; it will match everything"
            )));
        }
    }
    if default_count > 1 {
        result.add_warning(ValidationWarning::new(format!(
            "{default_count} proxies are marked is_default; only the first registered is reachable as a fallback"
        )));
    }

    for pattern in &config.recording.redact_patterns {
        if let Err(e) = Regex::new(pattern) {
            result.add_error(ValidationError::new(
                ErrorCategory::Regex,
                format!("recording.redact_patterns entry {pattern:?} is not a valid regex: {e}"),
            ));
        }
    }

    if config.mock.not_found_response.status < 100 || config.mock.not_found_response.status >= 600 {
        result.add_error(ValidationError::new(
            ErrorCategory::Mock,
            format!(
                "mock.not_found_response.status {} is not a valid HTTP status code",
                config.mock.not_found_response.status
            ),
        ));
    }

    if config.replay.timeout_seconds == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Replay,
            "replay.timeout_seconds must be greater than zero",
        ));
    }

    if config.database.path.trim().is_empty() {
        result.add_error(ValidationError::new(
            ErrorCategory::Database,
            "database.path must not be empty",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, ProxyConfig, UpstreamProtocol};
    use std::collections::HashMap;

    fn proxy(session_name: &str) -> ProxyConfig {
        ProxyConfig {
            target_host: "127.0.0.1".to_string(),
            target_port: 9000,
            protocol: UpstreamProtocol::Http,
            session_name: session_name.to_string(),
            service_pattern: None,
            method_pattern: None,
            is_default: true,
            enable_streaming: false,
        }
    }

    #[test]
    fn rejects_invalid_regex_in_proxy_patterns() {
        let mut config = Config {
            mode: Mode::Record,
            ..Config::default_for_testing()
        };
        let mut p = proxy("demo");
        p.service_pattern = Some("(unclosed".to_string());
        config.proxies.insert("api".to_string(), p);

        let result = validate_config(&config);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.category == ErrorCategory::Regex));
    }

    #[test]
    fn rejects_empty_session_name() {
        let mut config = Config::default_for_testing();
        config.proxies.insert("api".to_string(), proxy(""));

        let result = validate_config(&config);
        assert!(result.errors.iter().any(|e| e.category == ErrorCategory::Proxy));
    }

    #[test]
    fn warns_on_empty_proxies() {
        let config = Config::default_for_testing();
        let result = validate_config(&config);
        assert!(result.is_ok());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn valid_config_has_no_errors() {
        let mut config = Config::default_for_testing();
        config.proxies.insert("api".to_string(), proxy("demo"));
        let mut proxies = HashMap::new();
        proxies.insert("api".to_string(), proxy("demo"));
        config.proxies = proxies;

        let result = validate_config(&config);
        assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    }
}
