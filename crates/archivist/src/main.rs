// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archivist - resumable fact extraction from Telegram chat exports.
//!
//! This is the binary entry point. Each subcommand lives in its own module.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod analyze;
mod reset;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use archivist_config::ArchivistConfig;
use archivist_config::ConfigError;
use archivist_core::{ArchivistError, MessageSource, Transcript};
use archivist_storage::{CheckpointStore, FileMedium};
use archivist_telegram::TelegramExport;
use clap::{Parser, Subcommand};
use tracing::error;

/// Export read by `analyze` when no path is given.
const DEFAULT_EXPORT_PATH: &str = "data/telegram_dump.json";

/// Archivist - extracts user facts from Telegram chat exports.
#[derive(Parser, Debug)]
#[command(name = "archivist", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract facts from a chat export, resuming from its checkpoint.
    Analyze {
        /// Telegram Desktop JSON export.
        #[arg(default_value = DEFAULT_EXPORT_PATH)]
        path: PathBuf,
        /// Ignore the saved checkpoint and start from the first message.
        #[arg(long)]
        fresh: bool,
    },
    /// Delete the saved checkpoint of a chat export.
    ResetState {
        /// Telegram Desktop JSON export.
        path: PathBuf,
    },
    /// Show checkpoint progress and adapter health for a chat export.
    Status {
        /// Telegram Desktop JSON export.
        path: PathBuf,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            archivist_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.app.log_level);

    let result = match cli.command {
        Commands::Analyze { path, fresh } => analyze::run_analyze(&config, &path, fresh)
            .await
            .map(|summary| println!("{}", analyze::format_summary(&summary))),
        Commands::ResetState { path } => reset::run_reset_state(&config, &path).await,
        Commands::Status { path, json } => status::run_status(&config, &path, json).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Loads and validates configuration, from `path` when given.
fn load_config(path: Option<&Path>) -> Result<ArchivistConfig, Vec<ConfigError>> {
    match path {
        Some(path) => archivist_config::load_and_validate_path(path),
        None => archivist_config::load_and_validate(),
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr so stdout stays clean for summaries and `--json`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("archivist={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Reads and parses the chat export at `path`.
pub(crate) async fn load_transcript(path: &Path) -> Result<Transcript, ArchivistError> {
    TelegramExport::from_path(path).load().await
}

/// Checkpoint store for `chat_id` under the configured state directory.
pub(crate) fn checkpoint_store(config: &ArchivistConfig, chat_id: i64) -> CheckpointStore {
    CheckpointStore::new(Arc::new(FileMedium::for_chat(
        &config.storage.state_dir,
        chat_id,
    )))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use archivist_config::ArchivistConfig;

    /// Chat id of [`write_export`] files.
    pub const EXPORT_CHAT_ID: i64 = 777;

    /// Writes a three-message export into `dir` and returns its path.
    pub fn write_export(dir: &Path) -> PathBuf {
        let json = serde_json::json!({
            "name": "Hiking club",
            "type": "private_group",
            "id": EXPORT_CHAT_ID,
            "messages": [
                {"id": 1, "type": "message", "date_unixtime": "1700000000",
                 "from": "Alice", "from_id": "user1", "text": "I moved to Oslo"},
                {"id": 2, "type": "message", "date_unixtime": "1700000060",
                 "from": "Bob", "from_id": "user2", "text": "welcome!",
                 "reply_to_message_id": 1},
                {"id": 3, "type": "service", "date_unixtime": "1700000120",
                 "actor": "Carol", "actor_id": "user3", "action": "invite_members"}
            ]
        });
        let path = dir.join("export.json");
        std::fs::write(&path, json.to_string()).unwrap();
        path
    }

    /// Config whose database, state dir, and Ollama endpoint are all local
    /// to `dir`. The Ollama port has nothing listening on it.
    pub fn config_in(dir: &Path) -> ArchivistConfig {
        let mut config = ArchivistConfig::default();
        config.storage.database_path = dir.join("facts.db").to_string_lossy().into_owned();
        config.storage.state_dir = dir.join("state").to_string_lossy().into_owned();
        config.ollama.base_url = format!("http://127.0.0.1:{}", closed_port());
        config.ollama.timeout_secs = 5;
        config.pipeline.max_attempts = 1;
        config.pipeline.initial_backoff_ms = 1;
        config.pipeline.max_backoff_ms = 1;
        config
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }
}
