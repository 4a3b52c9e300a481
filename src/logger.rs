// src/logger.rs

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Where and how verbosely the editor logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive such as `info` or `flowsmith=debug`.
    pub log_level: String,
    /// Daily-rotated log files go here; `None` logs to stdout.
    pub log_dir: Option<PathBuf>,
    pub log_file: String,
    /// Newline-delimited JSON instead of plain text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            log_file: "flowsmith.log".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn new(log_level: impl Into<String>, log_dir: Option<PathBuf>) -> Self {
        Self { log_level: log_level.into(), log_dir, ..Self::default() }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global tracing subscriber described by `config`.
///
/// When logging to files the returned guard must be kept alive for buffered
/// lines to be flushed. If a global subscriber is already set this does
/// nothing and returns `Ok(None)`.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let Some(dir) = &config.log_dir else {
        let layer = fmt::layer().with_thread_names(true);
        let installed = if config.json {
            Registry::default().with(config.filter()).with(layer.json()).try_init()
        } else {
            Registry::default().with(config.filter()).with(layer).try_init()
        };
        if installed.is_err() {
            tracing::debug!("tracing already initialised");
        }
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, &config.log_file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_writer(writer).with_ansi(false);
    let installed = if config.json {
        Registry::default().with(config.filter()).with(layer.json()).try_init()
    } else {
        Registry::default().with(config.filter()).with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing already initialised");
        return Ok(None);
    }
    tracing::info!("logging to {}", dir.join(&config.log_file).display());
    Ok(Some(guard))
}
