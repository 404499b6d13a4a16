use std::time::Duration;

use autocrop_engine::{CommandRecorder, CropEngine, EngineOptions, EngineState, OptionsError};
use autocrop_types::{LifecycleEvent, PipelineCommand, PlaybackEvent, Rect};
use futures_util::{StreamExt, stream::unfold};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::StreamBundle;
use crate::replay::{ReplayError, ReplayResult};

const ENGINE_CHANNEL_CAPACITY: usize = 16;

/// A pipeline command together with the playback position it was issued at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedCommand {
    #[serde(rename = "at_ms", serialize_with = "serialize_position")]
    pub at: Option<Duration>,
    #[serde(flatten)]
    pub command: PipelineCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustedSummary {
    pub rect: Rect,
    pub applied_count: u32,
    #[serde(rename = "observed_ms", serialize_with = "serialize_duration")]
    pub observed: Duration,
}

/// What the engine learned about one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub source: Rect,
    pub applied: Rect,
    pub commits: u32,
    pub trusted: Vec<TrustedSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Command(EmittedCommand),
    /// Emitted when a file ends, another file replaces it, or the input runs
    /// out.
    Summary(SessionSummary),
}

pub type StageResult = Result<StageEvent, ReplayError>;

pub struct CropStage {
    options: EngineOptions,
}

impl CropStage {
    pub fn new(options: EngineOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn attach(self, input: StreamBundle<ReplayResult>) -> StreamBundle<StageResult> {
        let StreamBundle {
            stream,
            total_events,
        } = input;

        let (tx, rx) = mpsc::channel::<StageResult>(ENGINE_CHANNEL_CAPACITY);
        let options = self.options;

        tokio::spawn(async move {
            let mut upstream = stream;
            let mut driver = match EngineDriver::new(options) {
                Ok(driver) => driver,
                Err(err) => {
                    warn!(%err, "engine options rejected");
                    return;
                }
            };

            while let Some(item) = upstream.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };
                for output in driver.feed(event) {
                    if tx.send(Ok(output)).await.is_err() {
                        return;
                    }
                }
            }

            if let Some(summary) = driver.summarize() {
                let _ = tx.send(Ok(StageEvent::Summary(summary))).await;
            }
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_events)
    }
}

/// Feeds events into the engine and collects what it asked the pipeline to
/// do.
struct EngineDriver {
    engine: CropEngine<CommandRecorder>,
    position: Option<Duration>,
    summarized: bool,
}

impl EngineDriver {
    fn new(options: EngineOptions) -> Result<Self, OptionsError> {
        Ok(Self {
            engine: CropEngine::new(options, CommandRecorder::new())?,
            position: None,
            summarized: true,
        })
    }

    fn feed(&mut self, event: PlaybackEvent) -> Vec<StageEvent> {
        let mut outputs = Vec::new();
        if let Some(position) = event.position() {
            self.position = Some(position);
        }

        match event {
            PlaybackEvent::Detection { sample, at } => self.engine.on_detection(sample, at),
            PlaybackEvent::Tick { time } => {
                let outcome = self.engine.on_clock_tick(time);
                if let Some(rect) = outcome.committed() {
                    debug!(crop = %rect, "crop committed");
                }
            }
            PlaybackEvent::Lifecycle { event } => {
                if matches!(
                    event,
                    LifecycleEvent::FileEnded | LifecycleEvent::FileLoaded { .. }
                ) {
                    if let Some(summary) = self.summarize() {
                        outputs.push(StageEvent::Summary(summary));
                    }
                }
                if matches!(event, LifecycleEvent::FileLoaded { .. }) {
                    self.position = None;
                    self.summarized = false;
                }
                let state = self.engine.on_lifecycle(event);
                if state == EngineState::Ended {
                    debug!("playback ended");
                }
            }
        }

        // Summaries are taken before teardown, so they precede its commands.
        let at = self.position;
        outputs.extend(
            self.engine
                .pipeline_mut()
                .drain()
                .into_iter()
                .map(|command| StageEvent::Command(EmittedCommand { at, command })),
        );
        outputs
    }

    /// Snapshots the current file once; later calls return `None` until the
    /// next file loads.
    fn summarize(&mut self) -> Option<SessionSummary> {
        if self.summarized {
            return None;
        }
        let source = self.engine.source()?;
        self.summarized = true;
        let trusted = self
            .engine
            .trust()
            .map(|store| {
                store
                    .ranked()
                    .into_iter()
                    .map(|entry| TrustedSummary {
                        rect: entry.rect(),
                        applied_count: entry.applied_count,
                        observed: entry.total_dwell,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(SessionSummary {
            source,
            applied: self.engine.applied().unwrap_or(source),
            commits: self.engine.commits(),
            trusted,
        })
    }
}

fn serialize_position<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
        None => serializer.serialize_none(),
    }
}

fn serialize_duration<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use autocrop_engine::Mode;

    use super::*;

    const SCOPE: Rect = Rect::new(1920, 800, 0, 140);

    fn letterboxed_session() -> Vec<PlaybackEvent> {
        let mut events = vec![PlaybackEvent::lifecycle(LifecycleEvent::FileLoaded {
            width: 1920,
            height: 1080,
            fps: None,
        })];
        for step in 0..10u64 {
            let at = Duration::from_millis(step * 1_000);
            events.push(PlaybackEvent::detection(SCOPE, at));
            events.push(PlaybackEvent::tick(at));
        }
        events.push(PlaybackEvent::lifecycle(LifecycleEvent::FileEnded));
        events
    }

    fn commands(outputs: &[StageEvent]) -> Vec<PipelineCommand> {
        outputs
            .iter()
            .filter_map(|output| match output {
                StageEvent::Command(emitted) => Some(emitted.command),
                StageEvent::Summary(_) => None,
            })
            .collect()
    }

    #[test]
    fn driver_stamps_commands_with_position() {
        let mut driver = EngineDriver::new(EngineOptions::default()).unwrap();
        let mut outputs = Vec::new();
        for event in letterboxed_session() {
            outputs.extend(driver.feed(event));
        }

        let applied = outputs
            .iter()
            .find_map(|output| match output {
                StageEvent::Command(EmittedCommand {
                    at,
                    command: PipelineCommand::ApplyCrop(rect),
                }) => Some((*at, *rect)),
                _ => None,
            })
            .unwrap();
        assert_eq!(applied, (Some(Duration::from_secs(5)), SCOPE));

        let commands = commands(&outputs);
        assert!(matches!(
            commands.first(),
            Some(PipelineCommand::ConfigureDetector(_))
        ));
        assert_eq!(
            &commands[commands.len() - 2..],
            &[PipelineCommand::RemoveDetector, PipelineCommand::RemoveCrop]
        );
    }

    #[test]
    fn summary_precedes_teardown_commands() {
        let mut driver = EngineDriver::new(EngineOptions::default()).unwrap();
        let mut outputs = Vec::new();
        for event in letterboxed_session() {
            outputs.extend(driver.feed(event));
        }
        let summary_index = outputs
            .iter()
            .position(|output| matches!(output, StageEvent::Summary(_)))
            .unwrap();
        assert_eq!(summary_index, outputs.len() - 3);

        let StageEvent::Summary(summary) = &outputs[summary_index] else {
            unreachable!();
        };
        assert_eq!(summary.commits, 1);
        assert_eq!(summary.applied, SCOPE);
        assert_eq!(summary.trusted[0].rect, SCOPE);
        assert_eq!(summary.trusted.len(), 2);
        assert!(driver.summarize().is_none());
    }

    #[test]
    fn manual_mode_waits_for_toggle() {
        let options = EngineOptions {
            mode: Mode::AutoManual,
            ..EngineOptions::default()
        };
        let mut driver = EngineDriver::new(options).unwrap();
        let outputs = driver.feed(PlaybackEvent::lifecycle(LifecycleEvent::FileLoaded {
            width: 1920,
            height: 1080,
            fps: None,
        }));
        assert!(outputs.is_empty());

        let outputs = driver.feed(PlaybackEvent::lifecycle(LifecycleEvent::Toggle));
        assert!(matches!(
            commands(&outputs).as_slice(),
            [PipelineCommand::ConfigureDetector(_)]
        ));
    }

    #[test]
    fn emitted_command_serializes_flat() {
        let emitted = EmittedCommand {
            at: Some(Duration::from_millis(6_200)),
            command: PipelineCommand::ApplyCrop(SCOPE),
        };
        let value = serde_json::to_value(&emitted).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "at_ms": 6200,
                "command": "apply_crop",
                "w": 1920,
                "h": 800,
                "x": 0,
                "y": 140
            })
        );
    }
}
