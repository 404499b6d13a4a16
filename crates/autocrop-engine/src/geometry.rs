//! Derived geometry for raw detector rectangles.

use autocrop_types::Rect;

use crate::config::EngineOptions;

/// Candidates must cover this share of the source width or height before the
/// known-ratio check runs.
const KNOWN_RATIO_MIN_COVERAGE: f64 = 0.9;

/// Displacement of a rectangle from the symmetric crop of the same size.
///
/// Values can be half pixels when the leftover border is odd.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Margins {
    pub fn as_array(&self) -> [i32; 4] {
        [self.top, self.bottom, self.left, self.right]
    }
}

/// The uncropped frame for the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    rect: Rect,
    frame_width: i32,
    frame_height: i32,
}

impl Source {
    /// Rounds the decoded frame size down to `round` and centers it, the
    /// same way the detector reports an uncropped frame.
    pub fn new(width: u32, height: u32, round: u32) -> Self {
        let round = round.max(1);
        let frame_width = i32::try_from(width).unwrap_or(i32::MAX);
        let frame_height = i32::try_from(height).unwrap_or(i32::MAX);
        let divisor = i32::try_from(round).unwrap_or(1);
        let w = frame_width - frame_width % divisor;
        let h = frame_height - frame_height % divisor;
        let rect = Rect::new(w, h, (frame_width - w) / 2, (frame_height - h) / 2);
        Self {
            rect,
            frame_width,
            frame_height,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn area(&self) -> i64 {
        self.rect.area()
    }

    pub fn classify(&self, rect: Rect, options: &EngineOptions) -> Candidate {
        let is_invalid = rect.is_invalid();
        let offset = Offset {
            x: f64::from(rect.x) - f64::from(self.frame_width - rect.w) / 2.0,
            y: f64::from(rect.y) - f64::from(self.frame_height - rect.h) / 2.0,
        };
        let margins = Margins {
            top: rect.y,
            bottom: self.frame_height - rect.h - rect.y,
            left: rect.x,
            right: self.frame_width - rect.w - rect.x,
        };
        let is_known_ratio = !is_invalid
            && self.is_large(rect)
            && matches_known_ratio(rect, options.ratios.as_slice(), options.ratio_pixel_tolerance);

        Candidate {
            rect,
            offset,
            margins,
            is_source: rect == self.rect,
            is_invalid,
            is_known_ratio,
        }
    }

    fn is_large(&self, rect: Rect) -> bool {
        f64::from(rect.w) >= f64::from(self.rect.w) * KNOWN_RATIO_MIN_COVERAGE
            || f64::from(rect.h) >= f64::from(self.rect.h) * KNOWN_RATIO_MIN_COVERAGE
    }
}

/// A raw rectangle with every field the engine derives from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub rect: Rect,
    pub offset: Offset,
    pub margins: Margins,
    pub is_source: bool,
    pub is_invalid: bool,
    pub is_known_ratio: bool,
}

impl Candidate {
    pub fn key(&self) -> Rect {
        self.rect
    }

    pub fn area(&self) -> i64 {
        self.rect.area()
    }
}

fn matches_known_ratio(rect: Rect, ratios: &[f64], tolerance: i32) -> bool {
    if rect.w <= 0 || rect.h <= 0 {
        return false;
    }
    ratios.iter().any(|ratio| {
        let expected = (f64::from(rect.w) / ratio).round();
        (expected - f64::from(rect.h)).abs() <= f64::from(tolerance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd() -> Source {
        Source::new(1920, 1080, 2)
    }

    #[test]
    fn source_is_rounded_and_centered() {
        let source = Source::new(1921, 1081, 4);
        assert_eq!(source.rect(), Rect::new(1920, 1080, 0, 0));
        let source = Source::new(1926, 1080, 8);
        assert_eq!(source.rect(), Rect::new(1920, 1080, 3, 0));
    }

    #[test]
    fn letterbox_candidate_has_symmetric_offset() {
        let options = EngineOptions::default();
        let candidate = hd().classify(Rect::new(1920, 800, 0, 140), &options);
        assert_eq!(candidate.offset, Offset { x: 0.0, y: 0.0 });
        assert_eq!(
            candidate.margins,
            Margins {
                top: 140,
                bottom: 140,
                left: 0,
                right: 0
            }
        );
        assert!(candidate.is_known_ratio);
        assert!(!candidate.is_source);
        assert!(!candidate.is_invalid);
    }

    #[test]
    fn shifted_candidate_reports_offset() {
        let options = EngineOptions::default();
        let candidate = hd().classify(Rect::new(1920, 800, 0, 100), &options);
        assert_eq!(candidate.offset.y, -40.0);
        let candidate = hd().classify(Rect::new(1917, 1080, 0, 0), &options);
        assert_eq!(candidate.offset.x, -1.5);
    }

    #[test]
    fn source_candidate_is_flagged() {
        let options = EngineOptions::default();
        let candidate = hd().classify(Rect::new(1920, 1080, 0, 0), &options);
        assert!(candidate.is_source);
        assert!(candidate.is_known_ratio);
    }

    #[test]
    fn negative_sizes_are_invalid_and_never_known() {
        let options = EngineOptions::default();
        let candidate = hd().classify(Rect::new(-1920, -1080, 1920, 1080), &options);
        assert!(candidate.is_invalid);
        assert!(!candidate.is_known_ratio);
    }

    #[test]
    fn small_regions_skip_ratio_matching() {
        let options = EngineOptions::default();
        // 960x400 is exactly 2.4 but covers only half the frame.
        let candidate = hd().classify(Rect::new(960, 400, 480, 340), &options);
        assert!(!candidate.is_known_ratio);
    }

    #[test]
    fn pillarbox_matches_by_candidate_width() {
        let options = EngineOptions::default();
        let candidate = hd().classify(Rect::new(1440, 1080, 240, 0), &options);
        assert!(candidate.is_known_ratio);
    }
}
