//! Rectangles and offsets approved for the current file.

use std::collections::HashMap;
use std::time::Duration;

use autocrop_types::Rect;

use crate::geometry::{Candidate, Offset};

#[derive(Debug, Clone, PartialEq)]
pub struct TrustedEntry {
    pub candidate: Candidate,
    pub applied_count: u32,
    pub total_dwell: Duration,
    pub last_seen: Option<Duration>,
}

impl TrustedEntry {
    pub fn new(candidate: Candidate, total_dwell: Duration, last_seen: Option<Duration>) -> Self {
        Self {
            candidate,
            applied_count: 0,
            total_dwell,
            last_seen,
        }
    }

    pub fn rect(&self) -> Rect {
        self.candidate.rect
    }
}

/// Trusted rectangles keyed by their geometry. Entries are only ever added;
/// the store is rebuilt on file load.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    entries: HashMap<Rect, TrustedEntry>,
}

impl TrustStore {
    /// A store holding only the source rectangle.
    pub fn seeded(source: Candidate) -> Self {
        let mut store = Self::default();
        store.insert(TrustedEntry::new(source, Duration::ZERO, None));
        store
    }

    pub fn insert(&mut self, entry: TrustedEntry) {
        self.entries.insert(entry.rect(), entry);
    }

    pub fn contains(&self, key: &Rect) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &Rect) -> Option<&TrustedEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &Rect) -> Option<&mut TrustedEntry> {
        self.entries.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credits observation time to a trusted rectangle.
    pub fn observe(&mut self, key: &Rect, elapsed: Duration, now: Duration) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.total_dwell = entry.total_dwell.saturating_add(elapsed);
            entry.last_seen = Some(now);
        }
    }

    /// Entries sorted by descending observation time, for reporting.
    pub fn ranked(&self) -> Vec<&TrustedEntry> {
        let mut entries: Vec<&TrustedEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.total_dwell
                .cmp(&a.total_dwell)
                .then_with(|| a.rect().cmp(&b.rect()))
        });
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Offsets validated per axis. Always contains the source's zero offset.
#[derive(Debug, Clone)]
pub struct TrustedOffsets {
    x: Vec<f64>,
    y: Vec<f64>,
    tolerance: f64,
}

impl TrustedOffsets {
    pub fn seeded(tolerance_px: i32) -> Self {
        Self {
            x: vec![0.0],
            y: vec![0.0],
            tolerance: f64::from(tolerance_px.max(0)),
        }
    }

    pub fn is_trusted(&self, axis: Axis, value: f64) -> bool {
        let members = match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        };
        members
            .iter()
            .any(|member| (member - value).abs() <= self.tolerance)
    }

    pub fn contains(&self, offset: Offset) -> bool {
        self.is_trusted(Axis::X, offset.x) && self.is_trusted(Axis::Y, offset.y)
    }

    /// Adds any axis of `offset` not already covered. Returns whether the set
    /// grew.
    pub fn add(&mut self, offset: Offset) -> bool {
        let mut grew = false;
        if !self.is_trusted(Axis::X, offset.x) {
            self.x.push(offset.x);
            grew = true;
        }
        if !self.is_trusted(Axis::Y, offset.y) {
            self.y.push(offset.y);
            grew = true;
        }
        grew
    }

    pub fn len(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x.len(),
            Axis::Y => self.y.len(),
        }
    }
}
