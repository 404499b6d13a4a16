use autocrop_engine::OptionsError;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::info;

use crate::replay::{self, ReplayError, ReplayResult};
use crate::settings::{ConfigError, EffectiveSettings, InputSource};
use crate::sink::{CommandSink, OutputError};
use crate::stage::StreamBundle;
use crate::stage::engine::{CropStage, SessionSummary, StageEvent};
use crate::stage::progress::Progress;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("failed to write output: {0}")]
    Output(#[from] OutputError),

    #[error("this build has no mock source; enable the \"source-mock\" feature")]
    MockUnavailable,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub commands: usize,
    pub sessions: Vec<SessionSummary>,
}

pub async fn run_pipeline(settings: &EffectiveSettings) -> Result<RunReport, AppError> {
    let source = open_source(&settings.input).await?;
    let source = if settings.quiet {
        source
    } else {
        Progress::new("replay").attach(source)
    };
    let StreamBundle { mut stream, .. } = CropStage::new(settings.engine.clone())?.attach(source);

    let mut sink = match &settings.output {
        Some(path) => CommandSink::create(path, settings.format).await?,
        None => CommandSink::stdout(settings.format),
    };

    let mut report = RunReport::default();
    let mut failure = None;
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                failure = Some(err);
                break;
            }
        };
        sink.write(&event).await?;
        match event {
            StageEvent::Command(_) => report.commands += 1,
            StageEvent::Summary(summary) => {
                info!(
                    source = %summary.source,
                    applied = %summary.applied,
                    commits = summary.commits,
                    trusted = summary.trusted.len(),
                    "session finished"
                );
                report.sessions.push(summary);
            }
        }
    }
    sink.finish().await?;

    if let Some(err) = failure {
        return Err(err.into());
    }
    if let Some(path) = &settings.output {
        info!(path = %path.display(), commands = report.commands, "commands written");
    }
    Ok(report)
}

async fn open_source(input: &InputSource) -> Result<StreamBundle<ReplayResult>, AppError> {
    match input {
        InputSource::Log(path) => Ok(replay::open(path).await?),
        #[cfg(feature = "source-mock")]
        InputSource::Mock => Ok(crate::mock::MockSource::default().into_stream()),
        #[cfg(not(feature = "source-mock"))]
        InputSource::Mock => Err(AppError::MockUnavailable),
    }
}
