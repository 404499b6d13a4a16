//! Shared domain models for the autocrop workspace.
//!
//! This crate centralizes the lightweight value types exchanged between the
//! decision engine, the replay tooling and the CLI. Keep it free of engine
//! logic so every crate can depend on it without pulling anything heavy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A crop rectangle as reported by the detector or applied to the pipeline.
///
/// Dimensions are signed because detectors report negative sizes when they
/// fail to find any content; such rectangles are classified as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rect {
    pub w: i32,
    pub h: i32,
    pub x: i32,
    pub y: i32,
}

impl Rect {
    pub const fn new(w: i32, h: i32, x: i32, y: i32) -> Self {
        Self { w, h, x, y }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.w.max(0)) * i64::from(self.h.max(0))
    }

    pub fn is_invalid(&self) -> bool {
        self.w < 0 || self.h < 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w={}:h={}:x={}:y={}", self.w, self.h, self.x, self.y)
    }
}

/// Playback lifecycle notifications consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Seek,
    Resume,
    Pause {
        paused: bool,
    },
    Toggle,
    FileLoaded {
        width: u32,
        height: u32,
        #[serde(default)]
        fps: Option<f64>,
    },
    FileEnded,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Seek => "seek",
            LifecycleEvent::Resume => "resume",
            LifecycleEvent::Pause { .. } => "pause",
            LifecycleEvent::Toggle => "toggle",
            LifecycleEvent::FileLoaded { .. } => "file-loaded",
            LifecycleEvent::FileEnded => "file-ended",
        }
    }
}

/// One input to the engine, in arrival order.
///
/// Times are playback positions. On the wire they are integer milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Detection {
        #[serde(default)]
        sample: Option<Rect>,
        #[serde(rename = "at_ms", with = "millis")]
        at: Duration,
    },
    Tick {
        #[serde(rename = "time_ms", default, with = "opt_millis")]
        time: Option<Duration>,
    },
    Lifecycle {
        event: LifecycleEvent,
    },
}

impl PlaybackEvent {
    pub fn detection(sample: Rect, at: Duration) -> Self {
        Self::Detection {
            sample: Some(sample),
            at,
        }
    }

    pub fn tick(time: Duration) -> Self {
        Self::Tick { time: Some(time) }
    }

    pub fn lifecycle(event: LifecycleEvent) -> Self {
        Self::Lifecycle { event }
    }

    /// Playback position carried by the event, if any.
    pub fn position(&self) -> Option<Duration> {
        match self {
            PlaybackEvent::Detection { at, .. } => Some(*at),
            PlaybackEvent::Tick { time } => *time,
            PlaybackEvent::Lifecycle { .. } => None,
        }
    }
}

/// Parameters for (re)configuring the black-bar detector filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub threshold: u32,
    pub round: u32,
    pub reset_period: u32,
    pub skip: u32,
}

/// Commands the engine issues to the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PipelineCommand {
    ConfigureDetector(DetectorSettings),
    RemoveDetector,
    ApplyCrop(Rect),
    RemoveCrop,
}

impl PipelineCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineCommand::ConfigureDetector(_) => "configure_detector",
            PipelineCommand::RemoveDetector => "remove_detector",
            PipelineCommand::ApplyCrop(_) => "apply_crop",
            PipelineCommand::RemoveCrop => "remove_crop",
        }
    }
}

impl fmt::Display for PipelineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineCommand::ConfigureDetector(settings) => write!(
                f,
                "configure_detector limit={} round={} reset={} skip={}",
                settings.threshold, settings.round, settings.reset_period, settings.skip
            ),
            PipelineCommand::ApplyCrop(rect) => write!(f, "apply_crop {rect}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("detector rejected configuration: {reason}")]
    DetectorRejected { reason: String },

    #[error("pipeline unavailable: {message}")]
    Unavailable { message: String },
}

impl PipelineError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::DetectorRejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&(value.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}
