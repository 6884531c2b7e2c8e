//! Logger setup for the `tasksync` binary.
//!
//! Progress lines own stdout, so terminal logging always goes to stderr.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

pub const DEFAULT_LOG_FILE: &str = "tasksync.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogDestination {
    /// Log file only; the terminal shows progress alone.
    File,
    /// Stderr only.
    Terminal,
    Both,
}

impl LogDestination {
    fn to_terminal(self) -> bool {
        matches!(self, LogDestination::Terminal | LogDestination::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, LogDestination::File | LogDestination::Both)
    }
}

/// Installs the global logger. A log file that cannot be created is an error
/// rather than a silent fallback, since the user asked for it explicitly.
pub fn initialize(destination: LogDestination, level: LevelFilter, file: Option<&Path>) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::with_capacity(2);
    if destination.to_terminal() {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if destination.to_file() {
        let path = file.map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), Path::to_path_buf);
        loggers.push(file_logger(level, config, &path)?);
    }

    // A logger installed earlier (tests) wins; that is not worth failing over.
    let _ = CombinedLogger::init(loggers);
    Ok(())
}

fn file_logger(level: LevelFilter, config: Config, path: &Path) -> Result<Box<WriteLogger<File>>> {
    let file = File::create(path)
        .with_context(|| format!("could not create log file {}", path.display()))?;
    Ok(WriteLogger::new(level, config, file))
}
