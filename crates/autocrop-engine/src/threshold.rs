//! Adaptive black-level threshold for the detector.

use autocrop_types::{DetectorSettings, Rect};

use crate::config::EngineOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Raise,
    Hold,
    Lower,
}

/// Result of one per-tick adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub threshold: u32,
    pub direction: Direction,
    pub changed: bool,
    /// Source repeated while the threshold sat below its limit.
    pub limit_raised: bool,
}

#[derive(Debug, Clone)]
pub struct SensitivityController {
    current: u32,
    limit: u32,
    step: u32,
    direction: Direction,
    jitter: i32,
    last_sample: Option<Rect>,
    round: u32,
    reset_period: u32,
    skip: u32,
}

impl SensitivityController {
    /// Starts at the configured limit, the least sensitive setting.
    pub fn new(options: &EngineOptions) -> Self {
        Self {
            current: options.detect_limit,
            limit: options.detect_limit,
            step: options.detect_limit_step,
            direction: Direction::Hold,
            jitter: options.sample_jitter_pixels,
            last_sample: None,
            round: options.round_divisor(),
            reset_period: options.detect_reset,
            skip: options.detect_skip,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            threshold: self.current,
            round: self.round,
            reset_period: self.reset_period,
            skip: self.skip,
        }
    }

    /// Drops the previous raw sample so the next one is not compared across
    /// a discontinuity.
    pub fn forget_sample(&mut self) {
        self.last_sample = None;
    }

    /// Source raises the threshold only when it repeats. A source sample
    /// that breaks a run of other samples holds.
    pub fn adjust(&mut self, is_source: bool, applied_is_source: bool, sample: Rect) -> Adjustment {
        let previous = self.current;
        let steady = self
            .last_sample
            .is_none_or(|last| within(last, sample, self.jitter));
        let limit_raised = is_source && steady && previous < self.limit;

        let (next, direction) = if is_source && steady {
            let step = if applied_is_source {
                self.step.saturating_mul(2)
            } else {
                self.step
            };
            (previous.saturating_add(step).min(self.limit), Direction::Raise)
        } else if is_source || (self.last_sample.is_some() && steady) {
            (previous, Direction::Hold)
        } else {
            (previous.saturating_sub(self.step), Direction::Lower)
        };

        self.current = next;
        self.direction = direction;
        self.last_sample = Some(sample);
        Adjustment {
            threshold: next,
            direction,
            changed: next != previous,
            limit_raised,
        }
    }
}

fn within(a: Rect, b: Rect, pixels: i32) -> bool {
    (a.w - b.w).abs() <= pixels
        && (a.h - b.h).abs() <= pixels
        && (a.x - b.x).abs() <= pixels
        && (a.y - b.y).abs() <= pixels
}
