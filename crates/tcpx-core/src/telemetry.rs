//! Log sink installation.
//!
//! The server only emits `tracing` events; this module wires them to a
//! destination when the embedding application has not done so itself.

use crate::error::TelemetryError;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(PathBuf),
}

/// Installs a global fmt subscriber writing to `output` at `level` and above.
pub fn init(output: &LogOutput, level: &str) -> Result<(), TelemetryError> {
    let level = Level::from_str(level).map_err(|_| TelemetryError::Level(level.to_string()))?;
    let builder = tracing_subscriber::fmt().with_max_level(level);

    let installed = match output {
        LogOutput::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogOutput::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogOutput::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
    };
    installed.map_err(|_| TelemetryError::AlreadyInstalled)
}
