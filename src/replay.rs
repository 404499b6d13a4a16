//! JSON-lines event logs.
//!
//! Each non-blank line holds one [`PlaybackEvent`]. Lines starting with `#`
//! are comments.

use std::io;
use std::path::{Path, PathBuf};

use autocrop_types::PlaybackEvent;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::stage::StreamBundle;

const REPLAY_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read event log {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}:{line}: malformed event: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

impl ReplayError {
    /// One-based line number of a malformed event.
    pub fn line(&self) -> Option<usize> {
        match self {
            ReplayError::Malformed { line, .. } => Some(*line),
            ReplayError::Io { .. } => None,
        }
    }
}

pub type ReplayResult = Result<PlaybackEvent, ReplayError>;

/// Parses a single log line. Blank lines and comments yield `None`.
pub fn parse_line(line: &str) -> Option<Result<PlaybackEvent, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Streams the events of a log file. Reading stops at the first error, which
/// is forwarded as the last item.
pub async fn open(path: &Path) -> Result<StreamBundle<ReplayResult>, ReplayError> {
    let file = File::open(path).await.map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let path = path.to_path_buf();
    let (tx, rx) = mpsc::channel::<ReplayResult>(REPLAY_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut lines = BufReader::new(file).lines();
        let mut line_number = 0usize;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(source) => {
                    let _ = tx
                        .send(Err(ReplayError::Io {
                            path: path.clone(),
                            source,
                        }))
                        .await;
                    return;
                }
            };
            line_number += 1;
            let Some(parsed) = parse_line(&line) else {
                continue;
            };
            let item = parsed.map_err(|source| ReplayError::Malformed {
                path: path.clone(),
                line: line_number,
                source,
            });
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                return;
            }
        }
    });

    Ok(StreamBundle::new(Box::pin(ReceiverStream::new(rx)), None))
}

/// Wraps already parsed events, e.g. a synthetic session.
pub fn from_events(events: Vec<PlaybackEvent>) -> StreamBundle<ReplayResult> {
    let total = events.len() as u64;
    let stream = tokio_stream::iter(events.into_iter().map(Ok));
    StreamBundle::new(Box::pin(stream), Some(total))
}
