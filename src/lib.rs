pub mod cli;
#[cfg(feature = "source-mock")]
pub mod mock;
pub mod pipeline;
pub mod replay;
pub mod settings;
pub mod sink;
pub mod stage;

pub use pipeline::{AppError, RunReport, run_pipeline};
pub use stage::StreamBundle;
pub use stage::engine::{CropStage, EmittedCommand, SessionSummary, StageEvent, TrustedSummary};
