use std::time::{Duration, Instant};

use autocrop_types::PlaybackEvent;
use futures_util::{StreamExt, stream::unfold};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use super::StreamBundle;
use crate::replay::ReplayResult;

const PROGRESS_CHANNEL_CAPACITY: usize = 16;

/// Passes events through unchanged while drawing a progress bar on stderr.
pub struct Progress {
    label: &'static str,
}

impl Progress {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }

    pub fn attach(self, input: StreamBundle<ReplayResult>) -> StreamBundle<ReplayResult> {
        let StreamBundle {
            stream,
            total_events,
        } = input;

        let (tx, rx) = mpsc::channel::<ReplayResult>(PROGRESS_CHANNEL_CAPACITY);
        let label = self.label;

        tokio::spawn(async move {
            let mut upstream = stream;
            let mut monitor = ProgressMonitor::new(label, total_events);

            while let Some(event) = upstream.next().await {
                monitor.observe(&event);
                if tx.send(event).await.is_err() {
                    monitor.finish_if_needed();
                    return;
                }
            }

            monitor.finish_if_needed();
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_events)
    }
}

struct ProgressMonitor {
    bar: ProgressBar,
    total_events: Option<u64>,
    events_seen: u64,
    position: Option<Duration>,
    started: Instant,
    finished: bool,
}

impl ProgressMonitor {
    fn new(label: &'static str, total_events: Option<u64>) -> Self {
        let bar = match total_events {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(bar_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        bar.set_prefix(label);

        Self {
            bar,
            total_events,
            events_seen: 0,
            position: None,
            started: Instant::now(),
            finished: false,
        }
    }

    fn observe(&mut self, event: &ReplayResult) {
        match event {
            Ok(event) => self.observe_event(event),
            Err(err) => self.fail_with_reason(&err.to_string()),
        }
    }

    fn observe_event(&mut self, event: &PlaybackEvent) {
        self.events_seen = self.events_seen.saturating_add(1);
        if let Some(position) = event.position() {
            self.position = Some(position);
        }
        match self.total_events {
            Some(total) => self.bar.set_position(self.events_seen.min(total)),
            None => self.bar.inc(1),
        }
        self.update_message();
    }

    fn fail_with_reason(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.abandon_with_message(format!(
            "failed after {} events: {reason}",
            self.events_seen
        ));
    }

    fn finish_if_needed(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(total) = self.total_events {
            self.bar.set_position(total);
        }
        self.bar
            .finish_with_message(format!("replayed {} events", self.events_seen));
    }

    fn update_message(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let rate = self.events_seen as f64 / elapsed;
        let position = self
            .position
            .map(|value| format!("{:.1}s", value.as_secs_f64()))
            .unwrap_or_else(|| "--".to_string());
        self.bar
            .set_message(format!("{rate:.0} ev/s • at {position}"));
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>6}/{len:<6} [{elapsed_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid replay bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {spinner:.cyan.bold} [{elapsed_precise:.dim}] {pos:>6}ev {msg:.yellow}",
    )
    .expect("invalid replay spinner template")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}
