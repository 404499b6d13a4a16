//! Synthetic playback session for demos and tests.
//!
//! A 1080p scope film with detector noise, a seek, and a switch to a flat
//! 1.85 frame near the end.

use std::time::Duration;

use autocrop_types::{LifecycleEvent, PlaybackEvent, Rect};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_stream::wrappers::ReceiverStream;

use crate::replay::ReplayResult;
use crate::stage::StreamBundle;

pub const MOCK_SOURCE: Rect = Rect::new(1920, 1080, 0, 0);
/// 2.39:1 letterbox.
pub const MOCK_SCOPE: Rect = Rect::new(1920, 804, 0, 138);
/// Off-by-a-few detection of [`MOCK_SCOPE`] on dark frames.
pub const MOCK_SCOPE_NOISE: Rect = Rect::new(1918, 802, 1, 139);
/// 1.85:1 letterbox.
pub const MOCK_FLAT: Rect = Rect::new(1920, 1040, 0, 20);

const NOISE_EVERY: u64 = 8;

#[derive(Debug, Clone)]
pub struct MockSource {
    step: Duration,
    pace: Duration,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(250),
            pace: Duration::ZERO,
        }
    }
}

impl MockSource {
    /// `step` is the playback time between detections; `pace` is the wall
    /// clock delay between emitted events.
    pub fn new(step: Duration, pace: Duration) -> Self {
        Self { step, pace }
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        let mut events = vec![PlaybackEvent::lifecycle(LifecycleEvent::FileLoaded {
            width: MOCK_SOURCE.w as u32,
            height: MOCK_SOURCE.h as u32,
            fps: Some(23.976),
        })];
        self.segment(&mut events, 0, 2_000, MOCK_SOURCE, false);
        self.segment(&mut events, 2_000, 12_000, MOCK_SCOPE, true);
        events.push(PlaybackEvent::lifecycle(LifecycleEvent::Seek));
        events.push(PlaybackEvent::lifecycle(LifecycleEvent::Resume));
        self.segment(&mut events, 30_000, 40_000, MOCK_SCOPE, true);
        self.segment(&mut events, 40_000, 52_000, MOCK_FLAT, false);
        events.push(PlaybackEvent::lifecycle(LifecycleEvent::FileEnded));
        events
    }

    fn segment(
        &self,
        events: &mut Vec<PlaybackEvent>,
        start_ms: u64,
        end_ms: u64,
        rect: Rect,
        noisy: bool,
    ) {
        let step_ms = (self.step.as_millis() as u64).max(1);
        let mut position = start_ms;
        let mut index = 0u64;
        while position < end_ms {
            let at = Duration::from_millis(position);
            let sample = if noisy && index % NOISE_EVERY == NOISE_EVERY - 1 {
                MOCK_SCOPE_NOISE
            } else {
                rect
            };
            events.push(PlaybackEvent::detection(sample, at));
            events.push(PlaybackEvent::tick(at));
            position += step_ms;
            index += 1;
        }
    }

    pub fn into_stream(self) -> StreamBundle<ReplayResult> {
        let events = self.events();
        let total = events.len() as u64;
        let (tx, rx) = mpsc::channel::<ReplayResult>(events.len().clamp(1, 64));
        tokio::spawn(async move {
            let mut next_instant = Instant::now();
            for event in events {
                if Instant::now() < next_instant {
                    sleep(next_instant - Instant::now()).await;
                }
                next_instant += self.pace;
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
        });
        StreamBundle::new(Box::pin(ReceiverStream::new(rx)), Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_is_framed_by_load_and_end() {
        let events = MockSource::default().events();
        assert!(matches!(
            events.first(),
            Some(PlaybackEvent::Lifecycle {
                event: LifecycleEvent::FileLoaded { width: 1920, height: 1080, .. }
            })
        ));
        assert_eq!(
            events.last(),
            Some(&PlaybackEvent::lifecycle(LifecycleEvent::FileEnded))
        );
    }

    #[test]
    fn positions_jump_across_the_seek() {
        let events = MockSource::default().events();
        let seek = events
            .iter()
            .position(|event| *event == PlaybackEvent::lifecycle(LifecycleEvent::Seek))
            .unwrap();
        let before = events[..seek].iter().rev().find_map(PlaybackEvent::position);
        let after = events[seek..].iter().find_map(PlaybackEvent::position);
        assert_eq!(before, Some(Duration::from_millis(11_750)));
        assert_eq!(after, Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn scope_segments_carry_occasional_noise() {
        let events = MockSource::default().events();
        let noisy = events
            .iter()
            .filter(|event| {
                matches!(event, PlaybackEvent::Detection { sample: Some(rect), .. } if *rect == MOCK_SCOPE_NOISE)
            })
            .count();
        assert_eq!(noisy, 10);
    }
}
