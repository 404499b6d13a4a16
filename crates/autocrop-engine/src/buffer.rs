//! Sliding ledger of observations and the dwell of untrusted candidates.
//!
//! Every processed observation is appended to the ledger so the window is
//! measured in real playback time. Only candidates that are not yet trusted
//! own a [`BufferEntry`]; their dwell is the sum of their ledger items still
//! inside the window. Known-ratio observations are mirrored into a second,
//! shorter ledger that drives known-ratio promotion.
//!
//! Ledger items carry the serial of the entry they credited so that items left
//! behind by a promoted or purged entry never touch a later entry for the
//! same rectangle.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use autocrop_types::Rect;
use tracing::debug;

use crate::config::EngineOptions;
use crate::geometry::Candidate;

/// Distinct buffered candidates allowed before any time has accumulated.
const MIN_DISTINCT_CANDIDATES: usize = 8;
/// Additional distinct candidates allowed per buffered second.
const DISTINCT_PER_SECOND: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    pub candidate: Candidate,
    pub dwell: Duration,
    pub known_dwell: Duration,
    serial: u64,
}

impl BufferEntry {
    fn is_stale(&self) -> bool {
        self.dwell.is_zero() && self.known_dwell.is_zero()
    }
}

/// Why a buffered candidate qualifies for promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    KnownRatio,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Total,
    Known,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    key: Rect,
    serial: Option<u64>,
    duration: Duration,
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    items: VecDeque<Observation>,
    time: Duration,
}

impl Ledger {
    fn push(&mut self, key: Rect, serial: Option<u64>, duration: Duration) {
        self.time = self.time.saturating_add(duration);
        if let Some(last) = self.items.back_mut() {
            if last.key == key && last.serial == serial {
                last.duration = last.duration.saturating_add(duration);
                return;
            }
        }
        self.items.push_back(Observation {
            key,
            serial,
            duration,
        });
    }

    fn pop_front(&mut self) -> Option<Observation> {
        let item = self.items.pop_front()?;
        self.time = self.time.saturating_sub(item.duration);
        Some(item)
    }

    /// Trims the newest item so the ledger never exceeds `window`.
    fn clamp_back(&mut self, window: Duration) -> Option<Observation> {
        let excess = self.time.checked_sub(window).filter(|d| !d.is_zero())?;
        let last = self.items.back_mut()?;
        let trimmed = excess.min(last.duration);
        last.duration -= trimmed;
        self.time -= trimmed;
        Some(Observation {
            key: last.key,
            serial: last.serial,
            duration: trimmed,
        })
    }

    fn clear(&mut self) {
        self.items.clear();
        self.time = Duration::ZERO;
    }
}

#[derive(Debug, Clone)]
pub struct CandidateBuffer {
    entries: HashMap<Rect, BufferEntry>,
    total: Ledger,
    known: Ledger,
    window: Duration,
    known_window: Duration,
    next_serial: u64,
}

impl CandidateBuffer {
    pub fn new(options: &EngineOptions) -> Self {
        let factor = 1.0 + options.segmentation_factor;
        let known_window = stretch(options.known_ratio_timer(), factor);
        let window = options
            .fallback_timer()
            .map(|timer| stretch(timer, factor))
            .unwrap_or(known_window);
        Self {
            entries: HashMap::new(),
            total: Ledger::default(),
            known: Ledger::default(),
            window,
            known_window,
            next_serial: 0,
        }
    }

    pub fn get(&self, key: &Rect) -> Option<&BufferEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &Rect) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Observation time currently inside the main window.
    pub fn buffered_time(&self) -> Duration {
        self.total.time
    }

    /// Known-ratio observation time currently inside the known window.
    pub fn known_time(&self) -> Duration {
        self.known.time
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn known_window(&self) -> Duration {
        self.known_window
    }

    /// Appends one observation. Untrusted candidates are credited with the
    /// elapsed time; trusted ones only advance the window.
    pub fn record(&mut self, candidate: &Candidate, elapsed: Duration, trusted: bool) {
        let key = candidate.key();
        let serial = if trusted {
            None
        } else {
            let next_serial = &mut self.next_serial;
            let entry = self.entries.entry(key).or_insert_with(|| {
                let serial = *next_serial;
                *next_serial += 1;
                BufferEntry {
                    candidate: *candidate,
                    dwell: Duration::ZERO,
                    known_dwell: Duration::ZERO,
                    serial,
                }
            });
            entry.dwell = entry.dwell.saturating_add(elapsed);
            if candidate.is_known_ratio {
                entry.known_dwell = entry.known_dwell.saturating_add(elapsed);
            }
            Some(entry.serial)
        };

        self.total.push(key, serial, elapsed);
        if candidate.is_known_ratio {
            self.known.push(key, serial, elapsed);
        }
        self.evict();
    }

    /// Checks the promotion criteria for a buffered candidate.
    pub fn readiness(&self, key: &Rect, options: &EngineOptions) -> Option<Readiness> {
        let entry = self.entries.get(key)?;
        if entry.candidate.is_invalid {
            return None;
        }
        if entry.candidate.is_known_ratio && entry.known_dwell >= options.known_ratio_timer() {
            return Some(Readiness::KnownRatio);
        }
        match options.fallback_timer() {
            Some(timer) if entry.dwell >= timer => Some(Readiness::Fallback),
            _ => None,
        }
    }

    /// Removes a candidate for promotion. Its ledger items stay in place and
    /// keep counting toward the window.
    pub fn take(&mut self, key: &Rect) -> Option<BufferEntry> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total.clear();
        self.known.clear();
    }

    fn evict(&mut self) {
        while self.total.time > self.window && self.total.items.len() > 1 {
            if let Some(item) = self.total.pop_front() {
                self.release(item, Counter::Total, false);
            }
        }
        if let Some(item) = self.total.clamp_back(self.window) {
            self.release(item, Counter::Total, false);
        }

        while self.known.time > self.known_window && self.known.items.len() > 1 {
            if let Some(item) = self.known.pop_front() {
                self.release(item, Counter::Known, false);
            }
        }
        if let Some(item) = self.known.clamp_back(self.known_window) {
            self.release(item, Counter::Known, false);
        }

        // Too many distinct rectangles for the time observed: the signal is
        // noise, drop the oldest until the population fits.
        while self.entries.len() > self.distinct_limit() && self.total.items.len() > 1 {
            if let Some(item) = self.total.pop_front() {
                self.release(item, Counter::Total, true);
            }
        }
    }

    fn distinct_limit(&self) -> usize {
        MIN_DISTINCT_CANDIDATES + (self.total.time.as_secs_f64() * DISTINCT_PER_SECOND) as usize
    }

    fn release(&mut self, item: Observation, counter: Counter, purge: bool) {
        let Some(serial) = item.serial else {
            return;
        };
        let Some(entry) = self.entries.get_mut(&item.key) else {
            return;
        };
        if entry.serial != serial {
            return;
        }
        match counter {
            Counter::Total => entry.dwell = entry.dwell.saturating_sub(item.duration),
            Counter::Known => entry.known_dwell = entry.known_dwell.saturating_sub(item.duration),
        }
        let drop_entry = entry.is_stale() || (purge && entry.dwell.is_zero());
        if drop_entry {
            debug!(rect = %item.key, purge, "evicted stale candidate");
            self.entries.remove(&item.key);
        }
    }
}

/// Scales a timer into a window length, saturating instead of overflowing.
fn stretch(timer: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(timer.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
