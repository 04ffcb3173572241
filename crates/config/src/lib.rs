//! Configuration loading and validation for the Relaydeck record/replay proxy.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load, load_from_str};
pub use model::{
    Config, DatabaseConfig, MatchingStrategy, Mode, MockConfig, NotFoundResponse, ProxyConfig,
    RecordingConfig, ReplayConfig, SequenceMode, ServerConfig, UpstreamProtocol, ValidationStrategy,
};
pub use validate::{validate_config, ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
