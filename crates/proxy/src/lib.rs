//! Binary-facing glue: CLI parsing, the multi-proxy dispatcher, session
//! export/import, and graceful shutdown plumbing.

pub mod cli;
pub mod dispatcher;
pub mod export_import;
pub mod metrics;
pub mod reload;

pub use cli::{Cli, Command};
pub use dispatcher::Dispatcher;
pub use export_import::{ExportDocument, ExportImportError, MergeStrategy};
pub use metrics::Metrics;
pub use reload::{wait_for_shutdown_signal, GracefulReloadCoordinator, SignalType};
