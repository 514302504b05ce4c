use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LURK_LOG";
pub const LOG_FILE_ENV: &str = "LURK_LOG_FILE";

/// Installs a file-backed subscriber. The terminal belongs to the UI, so
/// nothing is written to stdout or stderr. Returns the log path when logging
/// could be set up.
pub fn init() -> Option<PathBuf> {
    let path = log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .ok()?;

    Some(path)
}

pub fn log_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(LOG_FILE_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::cache_dir().map(|dir| dir.join("lurk").join("lurk.log"))
}
