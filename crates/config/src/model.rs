//! Configuration value types. Deserialized from layered TOML + environment
//! overrides by [`crate::loader`]; validated by [`crate::validate`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Record,
    Mock,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProtocol {
    Http,
    Https,
    Grpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchingStrategy {
    Exact,
    Pattern,
    Fuzzy,
    #[serde(rename = "fuzzy-unordered")]
    FuzzyUnordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceMode {
    Ordered,
    Random,
}

/// How strictly a replayed response is compared against its recording.
/// Distinct from [`MatchingStrategy`], which governs how an incoming mock
/// request is matched to a recorded interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    #[default]
    Exact,
    Fuzzy,
    StatusCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_port: u16,
    /// Defaults to `listen_port + 1000` when absent; see [`ServerConfig::grpc_port_or_default`].
    pub grpc_port: Option<u16>,
}

impl ServerConfig {
    pub fn grpc_port_or_default(&self) -> u16 {
        self.grpc_port.unwrap_or_else(|| self.listen_port.saturating_add(1000))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            grpc_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    pub target_host: String,
    pub target_port: u16,
    pub protocol: UpstreamProtocol,
    pub session_name: String,
    pub service_pattern: Option<String>,
    pub method_pattern: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub enable_streaming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotFoundResponse {
    pub status: u16,
    pub body: String,
}

impl Default for NotFoundResponse {
    fn default() -> Self {
        Self {
            status: 404,
            body: r#"{"error":"no matching recording"}"#.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MockConfig {
    #[serde(default = "default_matching_strategy")]
    pub matching_strategy: MatchingStrategy,
    #[serde(default)]
    pub sequence_mode: SequenceMode,
    #[serde(default)]
    pub respect_streaming_timing: bool,
    #[serde(default)]
    pub fuzzy_ignore_fields: Vec<String>,
    #[serde(default)]
    pub not_found_response: NotFoundResponse,
}

fn default_matching_strategy() -> MatchingStrategy {
    MatchingStrategy::Exact
}

impl Default for SequenceMode {
    fn default() -> Self {
        SequenceMode::Ordered
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            matching_strategy: default_matching_strategy(),
            sequence_mode: SequenceMode::default(),
            respect_streaming_timing: false,
            fuzzy_ignore_fields: Vec::new(),
            not_found_response: NotFoundResponse::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RecordingConfig {
    #[serde(default)]
    pub redact_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplayConfig {
    #[serde(default)]
    pub validation_strategy: ValidationStrategy,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub max_concurrency: usize,
    #[serde(default)]
    pub ignore_timestamps: bool,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_grpc_max_message_size")]
    pub grpc_max_message_size: usize,
    #[serde(default)]
    pub grpc_insecure: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_grpc_max_message_size() -> usize {
    4 * 1024 * 1024
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            validation_strategy: ValidationStrategy::default(),
            fail_fast: false,
            timeout_seconds: default_timeout_seconds(),
            max_concurrency: 0,
            ignore_timestamps: false,
            insecure_skip_verify: false,
            grpc_max_message_size: default_grpc_max_message_size(),
            grpc_insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "relaydeck.db".to_string(),
        }
    }
}

/// Root configuration, assembled by [`crate::loader::load`] from a TOML file
/// overlaid with `RELAYDECK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxies: HashMap<String, ProxyConfig>,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// A minimal config suitable as a test fixture.
    pub fn default_for_testing() -> Self {
        Self::default()
    }
}
