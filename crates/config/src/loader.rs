//! Layered config loading: defaults → TOML file → `RELAYDECK_*` environment
//! overrides, via the `config` crate's `Figment`-style builder.

use anyhow::{Context, Result};
use std::path::Path;

use crate::model::Config;

/// Load configuration from `path` (TOML), overlaid with environment
/// variables prefixed `RELAYDECK__` (double underscore separates nesting,
/// e.g. `RELAYDECK__SERVER__LISTEN_PORT=9090`).
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .add_source(
            config::Environment::with_prefix("RELAYDECK")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder
        .build()
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    raw.try_deserialize::<Config>()
        .context("deserializing configuration")
}

/// Load configuration from an in-memory TOML string, with the same
/// environment overlay as [`load`]. Used by tests and by `import`/`export`
/// tooling that doesn't read from a fixed file path.
pub fn load_from_str(toml_source: &str) -> Result<Config> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml_source, config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("RELAYDECK")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder.build().context("building in-memory configuration")?;
    raw.try_deserialize::<Config>().context("deserializing configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_toml_with_defaults_filled_in() {
        let config = load_from_str(
            r#"
            mode = "record"

            [server]
            listen_port = 9000

            [proxies.api]
            target_host = "127.0.0.1"
            target_port = 9001
            protocol = "http"
            session_name = "demo"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.server.grpc_port_or_default(), 10000);
        assert_eq!(config.proxies.len(), 1);
        assert_eq!(config.database.path, "relaydeck.db");
    }

    #[test]
    fn environment_overlay_wins_over_file() {
        std::env::set_var("RELAYDECK__SERVER__LISTEN_PORT", "7777");
        let config = load_from_str(
            r#"
            [server]
            listen_port = 9000
            "#,
        )
        .unwrap();
        std::env::remove_var("RELAYDECK__SERVER__LISTEN_PORT");

        assert_eq!(config.server.listen_port, 7777);
    }
}
