// Logging setup (tracing + tracing-subscriber)
//
// CLI and server log to stderr. The TUI owns the terminal, so it either logs
// to `log_file` or not at all.

use crate::config::Settings;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Terminal UI is running; only a log file is acceptable
    Terminal,
}

/// `RUST_LOG` wins over the configured level
fn filter_for(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level))
}

pub fn init(settings: &Settings, target: LogTarget) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter_for(settings));

    match (&settings.log_file, target) {
        (Some(path), _) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
        }
        (None, LogTarget::Stderr) => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
        }
        // Nothing configured: stay silent rather than draw over the UI
        (None, LogTarget::Terminal) => {}
    }

    Ok(())
}
