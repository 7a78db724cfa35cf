//! Logging setup and the run transcript.

use std::fs;
use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::error::SimError;

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a subscriber was already installed; calling this
/// more than once is harmless.
pub fn init_tracing(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);
    if json {
        builder.json().flatten_event(true).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Plain-text copy of the orchestrator's status lines.
///
/// Disabled transcripts drop lines; every line is still emitted through
/// `tracing` at info level.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    enabled: bool,
    lines: Vec<String>,
}

impl Transcript {
    /// Create a transcript that keeps lines only when `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    /// Log `line` and keep it if the transcript is enabled.
    pub fn line(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{}", line);
        if self.enabled {
            self.lines.push(line);
        }
    }

    /// Lines kept so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Write the kept lines to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }
}
