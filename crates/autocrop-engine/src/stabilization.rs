//! Collapses near-identical trusted rectangles onto the better observed one.

use autocrop_types::Rect;

use crate::trust::{TrustStore, TrustedEntry};

/// Returns the trusted rectangle that should stand in for `key`.
///
/// Only applies when `key` is trusted itself. The replacement must differ by
/// at most `pixels` in both width and height and must have been observed for
/// strictly longer.
pub fn settle(key: &Rect, trust: &TrustStore, pixels: i32) -> Option<Rect> {
    let current = trust.get(key)?;
    trust
        .iter()
        .filter(|entry| entry.rect() != *key)
        .filter(|entry| {
            let rect = entry.rect();
            (rect.w - key.w).abs() <= pixels && (rect.h - key.h).abs() <= pixels
        })
        .filter(|entry| entry.total_dwell > current.total_dwell)
        .max_by(|a, b| {
            a.total_dwell
                .cmp(&b.total_dwell)
                .then_with(|| b.rect().cmp(&a.rect()))
        })
        .map(TrustedEntry::rect)
}
