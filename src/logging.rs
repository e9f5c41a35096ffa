//! Diagnostics go through `tracing`: a terse stderr layer for the user and a
//! verbose file layer (`debug.log`) kept small by rotating at start-up.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const MAX_LOG_BYTES: u64 = 1024 * 1024;
pub const LOG_BACKUPS: usize = 3;

/// Installs the global subscriber. `RUST_LOG` wins over `level`; `log_file`
/// receives everything at debug and above.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let stderr_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating {}", parent.display()))?;
            }
            rotate(path, MAX_LOG_BYTES, LOG_BACKUPS)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Opening {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Installing tracing subscriber")?;
    Ok(())
}

/// Shifts `path` to `path.1` (and older backups up to `backups`) once it has
/// grown past `max_bytes`.
pub fn rotate(path: &Path, max_bytes: u64, backups: usize) -> Result<()> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if size <= max_bytes || backups == 0 {
        return Ok(());
    }
    for index in (1..backups).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            fs::rename(&from, backup_path(path, index + 1))
                .with_context(|| format!("Rotating {}", from.display()))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
        .with_context(|| format!("Rotating {}", path.display()))?;
    Ok(())
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
