use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_FILE_NAME: &str = "modscrub.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliVerbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl CliVerbosity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quiet" | "minimal" => Some(CliVerbosity::Quiet),
            "normal" | "info" => Some(CliVerbosity::Normal),
            "verbose" => Some(CliVerbosity::Verbose),
            "debug" | "trace" => Some(CliVerbosity::Debug),
            _ => None,
        }
    }

    fn threshold(self) -> LogLevel {
        match self {
            CliVerbosity::Quiet => LogLevel::Error,
            CliVerbosity::Normal => LogLevel::Info,
            CliVerbosity::Verbose | CliVerbosity::Debug => LogLevel::Debug,
        }
    }
}

/// Echoes messages to stderr by verbosity and appends every one of them to
/// the log file, when there is one.
#[derive(Debug)]
pub struct Logger {
    verbosity: CliVerbosity,
    path: Option<PathBuf>,
}

impl Logger {
    pub fn new(verbosity: CliVerbosity, path: Option<PathBuf>) -> Self {
        Self { verbosity, path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }

    fn push(&self, level: LogLevel, message: &str) {
        if level >= self.verbosity.threshold() {
            eprintln!("[{}] {message}", log_level_label(level));
        }
        if let Some(path) = &self.path {
            let _ = append_log_file(path, level, message);
        }
    }
}

pub fn default_log_path() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modscrub").join(LOG_FILE_NAME))
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "DEBUG",
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{}] [{label}] {message}", log_timestamp())
}

fn log_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    now.format(&Rfc3339).unwrap_or_default()
}
