mod config;
mod kv;

pub use config::{Config, GoogleConfig, HttpConfig, ScheduleConfig, ServerConfig, SyncConfig};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore, StoreLock};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the taskcal data directory, creating it if needed.
///
/// `TASKCAL_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/taskcal[-dev]/`, with the `-dev` suffix when `TASKCAL_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TASKCAL_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TASKCAL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("taskcal-dev")
            } else {
                base_dir.join("taskcal")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
