//! Crop decision engine: turns noisy black-bar detections into infrequent,
//! trusted crop changes.

pub mod buffer;
pub mod config;
pub mod correction;
pub mod decision;
pub mod engine;
pub mod geometry;
pub mod lifecycle;
pub mod pipeline;
pub mod stabilization;
pub mod threshold;
pub mod trust;

pub use buffer::{BufferEntry, CandidateBuffer, Readiness};
pub use config::{EngineOptions, Mode, OptionsError, PreventChangeBias, RatioList, RatioParseError};
pub use decision::{CommitReason, HoldReason, Verdict};
pub use engine::{CropEngine, SkipReason, TickOutcome, TickReport};
pub use geometry::{Candidate, Margins, Offset, Source};
pub use lifecycle::{EngineState, SuspendReason};
pub use pipeline::{CommandRecorder, CropPipeline};
pub use trust::{TrustStore, TrustedEntry, TrustedOffsets};

pub use autocrop_types::{
    DetectorSettings, LifecycleEvent, PipelineCommand, PipelineError, PlaybackEvent, Rect,
};
