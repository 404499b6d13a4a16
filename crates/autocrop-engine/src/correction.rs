//! Snaps large, unfamiliar rectangles onto the nearest trusted one.
//!
//! Dark or low-contrast frames make the detector report rectangles a few
//! pixels off from the real picture area. Rather than learning every such
//! variant, a candidate whose margins sit close to a trusted rectangle is
//! replaced by it.

use std::cmp::{Ordering, Reverse};

use autocrop_types::Rect;
use tracing::debug;

use crate::config::EngineOptions;
use crate::geometry::{Candidate, Margins};
use crate::trust::{TrustStore, TrustedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Score {
    /// Largest per-side margin difference.
    distance: i32,
    /// Sides whose margins match exactly.
    identical: usize,
}

impl Score {
    fn between(a: &Margins, b: &Margins) -> Self {
        let mut distance = 0;
        let mut identical = 0;
        for (lhs, rhs) in a.as_array().into_iter().zip(b.as_array()) {
            let delta = (lhs - rhs).abs();
            distance = distance.max(delta);
            if delta == 0 {
                identical += 1;
            }
        }
        Self {
            distance,
            identical,
        }
    }

    fn rank(&self) -> (i32, Reverse<usize>) {
        (self.distance, Reverse(self.identical))
    }
}

/// Returns the trusted rectangle `candidate` should be replaced with, if any.
///
/// No correction happens when the candidate is already trusted, too small,
/// farther than `correction_max_margin` from every trusted rectangle, or
/// sits between two equally close ones. A target equal to `applied` is not
/// reported either: substituting it could not change the outcome.
pub fn nearest_trusted(
    candidate: &Candidate,
    trust: &TrustStore,
    source_area: i64,
    applied: Rect,
    options: &EngineOptions,
) -> Option<Rect> {
    if !options.correction_enabled() || candidate.is_invalid || trust.contains(&candidate.key())
    {
        return None;
    }
    if (candidate.area() as f64) < source_area as f64 * options.correction_area_fraction {
        return None;
    }

    let mut best: Option<Score> = None;
    let mut closest: Vec<&TrustedEntry> = Vec::new();
    for entry in trust.iter() {
        let score = Score::between(&candidate.margins, &entry.candidate.margins);
        if score.distance > options.correction_max_margin {
            continue;
        }
        match best.map(|current| score.rank().cmp(&current.rank())) {
            None | Some(Ordering::Less) => {
                best = Some(score);
                closest.clear();
                closest.push(entry);
            }
            Some(Ordering::Equal) => closest.push(entry),
            Some(Ordering::Greater) => {}
        }
    }

    if closest.len() > 1 && is_straddled(&candidate.margins, &closest) {
        debug!(rect = %candidate.rect, ties = closest.len(), "candidate between trusted rectangles, not corrected");
        return None;
    }

    let target = closest
        .into_iter()
        .max_by(|a, b| {
            a.total_dwell
                .cmp(&b.total_dwell)
                .then_with(|| b.rect().cmp(&a.rect()))
        })?
        .rect();
    (target != applied).then_some(target)
}

/// Whether any pair of equally close targets encloses the candidate on
/// every side.
fn is_straddled(margins: &Margins, targets: &[&TrustedEntry]) -> bool {
    let sides = margins.as_array();
    targets.iter().enumerate().any(|(index, first)| {
        targets[index + 1..].iter().any(|second| {
            let a = first.candidate.margins.as_array();
            let b = second.candidate.margins.as_array();
            sides
                .iter()
                .zip(a.iter().zip(b.iter()))
                .all(|(side, (lhs, rhs))| (*lhs.min(rhs)..=*lhs.max(rhs)).contains(side))
        })
    })
}
