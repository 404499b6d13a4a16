//! Writes stage output as text or JSON lines.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{self, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::cli::OutputFormat;
use crate::stage::engine::{EmittedCommand, SessionSummary, StageEvent};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct CommandSink {
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    format: OutputFormat,
}

impl CommandSink {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::from_writer(Box::new(io::stdout()), format)
    }

    pub async fn create(path: &Path, format: OutputFormat) -> Result<Self, OutputError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(path).await?;
        Ok(Self::from_writer(Box::new(file), format))
    }

    pub fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>, format: OutputFormat) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format,
        }
    }

    pub async fn write(&mut self, event: &StageEvent) -> Result<(), OutputError> {
        let rendered = render(event, self.format)?;
        self.writer.write_all(rendered.as_bytes()).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<(), OutputError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Renders one event, newline terminated.
pub fn render(event: &StageEvent, format: OutputFormat) -> Result<String, OutputError> {
    match (format, event) {
        (OutputFormat::Text, StageEvent::Command(command)) => Ok(render_command(command)),
        (OutputFormat::Text, StageEvent::Summary(summary)) => Ok(render_summary(summary)),
        (OutputFormat::Json, StageEvent::Command(command)) => {
            let mut line = serde_json::to_string(command)?;
            line.push('\n');
            Ok(line)
        }
        (OutputFormat::Json, StageEvent::Summary(summary)) => {
            #[derive(Serialize)]
            struct Wrapped<'a> {
                summary: &'a SessionSummary,
            }
            let mut line = serde_json::to_string(&Wrapped { summary })?;
            line.push('\n');
            Ok(line)
        }
    }
}

fn render_command(emitted: &EmittedCommand) -> String {
    let at = emitted
        .at
        .map(format_seconds)
        .unwrap_or_else(|| "-".to_string());
    format!("{} @ {at}\n", emitted.command)
}

fn render_summary(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# source {} applied {} commits {}",
        summary.source, summary.applied, summary.commits
    );
    for entry in &summary.trusted {
        let _ = writeln!(
            out,
            "#   {} applied {}x observed {}",
            entry.rect,
            entry.applied_count,
            format_seconds(entry.observed)
        );
    }
    out
}

fn format_seconds(value: Duration) -> String {
    format!("{:.3}s", value.as_secs_f64())
}
