//! Command-line surface: `clap`-derived subcommands for serving traffic,
//! running a replay, and managing sessions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "relaydeck", about = "Transparent record/replay API proxy", version)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP + gRPC dispatcher (default if no subcommand is given).
    Serve,
    /// Alias for `serve` that also opens the web UI's listening address in the log output.
    Web,
    /// Re-issue a recorded session's interactions against a live target and validate responses.
    Replay {
        /// Session to replay.
        session: String,
        /// Upstream host to replay against.
        #[arg(long)]
        target_host: String,
        #[arg(long)]
        target_port: u16,
        #[arg(long, default_value = "http")]
        protocol: String,
    },
    /// Export a session to a JSON file.
    Export {
        session: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Import a session from a JSON file.
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "append")]
        strategy: String,
    },
    /// List recorded sessions.
    ListSessions,
    /// Clear a session, or all sessions if none is given.
    Clear {
        session: Option<String>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve
    }
}
