//! Configuration resolution for the engine
//!
//! Root folder and database path come from the shared bootstrap config.
//! The fixtures directory used by `autolist fetch` resolves with priority
//! CLI → ENV → TOML.

use autolist_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use autolist_common::kv::LockRetry;
use autolist_common::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable naming the fixtures directory
pub const FIXTURES_DIR_ENV: &str = "AUTOLIST_FIXTURES_DIR";

/// Broadcast buffer of the engine event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Resolved engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub event_capacity: usize,
    /// Retry policy for locked SQLite writes, from `[database] max_lock_wait_ms`
    pub lock_retry: LockRetry,
}

impl EngineConfig {
    /// Resolve paths and create the root folder if it is missing
    pub fn resolve(cli_root_folder: Option<PathBuf>, toml_config: &TomlConfig) -> Result<Self> {
        let root_folder = RootFolderResolver::new(cli_root_folder).resolve(toml_config);
        let initializer = RootFolderInitializer::new(root_folder);
        initializer.ensure_directory_exists()?;

        let config = Self {
            root_folder: initializer.root_folder().to_path_buf(),
            database_path: initializer.database_path(toml_config),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            lock_retry: LockRetry::with_budget_ms(toml_config.database.max_lock_wait_ms),
        };
        info!(
            root_folder = %config.root_folder.display(),
            database = %config.database_path.display(),
            max_lock_wait_ms = toml_config.database.max_lock_wait_ms,
            "Engine configuration resolved"
        );
        Ok(config)
    }
}

/// Resolve the fixtures directory
///
/// **Priority:** CLI → ENV → TOML
pub fn resolve_fixtures_dir(cli_arg: Option<PathBuf>, toml_config: &TomlConfig) -> Result<PathBuf> {
    let env_dir = std::env::var(FIXTURES_DIR_ENV)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from);

    let mut sources = Vec::new();
    if cli_arg.is_some() {
        sources.push("command line");
    }
    if env_dir.is_some() {
        sources.push("environment");
    }
    if toml_config.fixtures_dir.is_some() {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "Fixtures directory set in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    cli_arg
        .or(env_dir)
        .or_else(|| toml_config.fixtures_dir.clone())
        .ok_or_else(|| {
            Error::Config(format!(
                "Fixtures directory not configured. Use --fixtures, set {FIXTURES_DIR_ENV}, \
                 or add fixtures_dir to autolist.toml"
            ))
        })
}
