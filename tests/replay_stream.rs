use std::time::Duration;

use autocrop::cli::OutputFormat;
use autocrop::mock::{MOCK_FLAT, MOCK_SCOPE, MOCK_SCOPE_NOISE, MockSource};
use autocrop::settings::{EffectiveSettings, InputSource};
use autocrop::{AppError, CropStage, StageEvent, StreamBundle, run_pipeline};
use autocrop_engine::EngineOptions;
use autocrop_types::{PipelineCommand, Rect};
use tokio_stream::StreamExt;

async fn collect(bundle: StreamBundle<autocrop::stage::engine::StageResult>) -> Vec<StageEvent> {
    let StreamBundle { mut stream, .. } = bundle;
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item.unwrap());
    }
    events
}

fn applied_crops(events: &[StageEvent]) -> Vec<(Duration, Rect)> {
    events
        .iter()
        .filter_map(|event| match event {
            StageEvent::Command(emitted) => match emitted.command {
                PipelineCommand::ApplyCrop(rect) => Some((emitted.at?, rect)),
                _ => None,
            },
            StageEvent::Summary(_) => None,
        })
        .collect()
}

fn settings(input: InputSource, output: Option<std::path::PathBuf>) -> EffectiveSettings {
    EffectiveSettings {
        input,
        output,
        format: OutputFormat::Json,
        quiet: true,
        engine: EngineOptions::default(),
        config_path: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn mock_session_crops_scope_then_flat() {
    let stage = CropStage::new(EngineOptions::default()).unwrap();
    let events = collect(stage.attach(MockSource::default().into_stream())).await;

    let crops = applied_crops(&events);
    assert_eq!(crops.len(), 2, "unexpected crops: {crops:?}");
    let (scope_at, scope) = crops[0];
    assert_eq!(scope, MOCK_SCOPE);
    assert!(scope_at >= Duration::from_secs(7) && scope_at < Duration::from_secs(8));
    let (flat_at, flat) = crops[1];
    assert_eq!(flat, MOCK_FLAT);
    assert!(flat_at >= Duration::from_secs(44) && flat_at < Duration::from_secs(46));

    let commands: Vec<PipelineCommand> = events
        .iter()
        .filter_map(|event| match event {
            StageEvent::Command(emitted) => Some(emitted.command),
            StageEvent::Summary(_) => None,
        })
        .collect();
    assert!(matches!(
        commands.first(),
        Some(PipelineCommand::ConfigureDetector(_))
    ));
    assert_eq!(
        &commands[commands.len() - 2..],
        &[PipelineCommand::RemoveDetector, PipelineCommand::RemoveCrop]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn mock_session_summary_lists_trusted_rects() {
    let stage = CropStage::new(EngineOptions::default()).unwrap();
    let events = collect(stage.attach(MockSource::default().into_stream())).await;

    let summaries: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StageEvent::Summary(summary) => Some(summary),
            StageEvent::Command(_) => None,
        })
        .collect();
    assert_eq!(summaries.len(), 1);
    let summary = summaries[0];
    assert_eq!(summary.commits, 2);
    assert_eq!(summary.applied, MOCK_FLAT);
    let rects: Vec<Rect> = summary.trusted.iter().map(|entry| entry.rect).collect();
    assert_eq!(rects.len(), 3);
    assert!(rects.contains(&MOCK_SCOPE));
    assert!(rects.contains(&MOCK_FLAT));
    assert!(!rects.contains(&MOCK_SCOPE_NOISE));
}

#[tokio::test(flavor = "multi_thread")]
async fn replays_event_log_into_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.jsonl");
    let output = dir.path().join("crops.jsonl");

    let mut lines = vec![
        "# letterboxed clip".to_string(),
        r#"{"type":"lifecycle","event":{"kind":"file_loaded","width":1920,"height":1080}}"#
            .to_string(),
        String::new(),
    ];
    for step in 0..8u64 {
        let at = step * 1_000;
        lines.push(format!(
            r#"{{"type":"detection","sample":{{"w":1920,"h":800,"x":0,"y":140}},"at_ms":{at}}}"#
        ));
        lines.push(format!(r#"{{"type":"tick","time_ms":{at}}}"#));
    }
    lines.push(r#"{"type":"lifecycle","event":{"kind":"file_ended"}}"#.to_string());
    std::fs::write(&log, lines.join("\n")).unwrap();

    let report = run_pipeline(&settings(InputSource::Log(log), Some(output.clone())))
        .await
        .unwrap();
    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].commits, 1);

    let written = std::fs::read_to_string(&output).unwrap();
    let values: Vec<serde_json::Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(values.len(), report.commands + 1);
    let apply = values
        .iter()
        .find(|value| value["command"] == "apply_crop")
        .unwrap();
    assert_eq!(apply["at_ms"], 5_000);
    assert_eq!(apply["h"], 800);
    assert!(values.iter().any(|value| value.get("summary").is_some()));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_line_reports_its_number() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("broken.jsonl");
    std::fs::write(
        &log,
        "{\"type\":\"lifecycle\",\"event\":{\"kind\":\"file_loaded\",\"width\":1920,\"height\":1080}}\n\
         # comment\n\
         {\"type\":\"tick\",\"time_ms\":\"soon\"}\n",
    )
    .unwrap();

    let err = run_pipeline(&settings(
        InputSource::Log(log),
        Some(dir.path().join("out.jsonl")),
    ))
    .await
    .unwrap_err();
    match err {
        AppError::Replay(replay) => assert_eq!(replay.line(), Some(3)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_log_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_pipeline(&settings(
        InputSource::Log(dir.path().join("absent.jsonl")),
        None,
    ))
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Replay(_)));
}
