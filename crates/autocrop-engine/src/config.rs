use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_RATIOS: &str = "2.4 2.39 2.35 2.2 2 1.85 16/9 5/3 1.5 4/3 1.25 9/16";

/// How the engine starts and how long it keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Mode {
    Disabled,
    OnDemand,
    SingleStart,
    AutoManual,
    AutoStart,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::OnDemand => "on-demand",
            Mode::SingleStart => "single-start",
            Mode::AutoManual => "auto-manual",
            Mode::AutoStart => "auto-start",
        }
    }

    /// Starts on file load without waiting for a toggle.
    pub fn starts_automatically(&self) -> bool {
        matches!(self, Mode::SingleStart | Mode::AutoStart)
    }

    /// Stops after the first committed crop.
    pub fn is_single_shot(&self) -> bool {
        matches!(self, Mode::OnDemand | Mode::SingleStart)
    }
}

impl TryFrom<u8> for Mode {
    type Error = OptionsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Disabled),
            1 => Ok(Mode::OnDemand),
            2 => Ok(Mode::SingleStart),
            3 => Ok(Mode::AutoManual),
            4 => Ok(Mode::AutoStart),
            other => Err(OptionsError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which commits are still allowed while the post-change cooldown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum PreventChangeBias {
    /// Blocks every change, larger or smaller, until the cooldown expires.
    Any,
    /// Only a rectangle with a larger area may replace the applied one.
    LargerOnly,
    /// Only a rectangle with a smaller area may replace the applied one.
    SmallerOnly,
}

impl PreventChangeBias {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreventChangeBias::Any => "any",
            PreventChangeBias::LargerOnly => "larger-only",
            PreventChangeBias::SmallerOnly => "smaller-only",
        }
    }
}

impl FromStr for PreventChangeBias {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "0" => Ok(PreventChangeBias::Any),
            "larger-only" | "keep-largest" | "1" => Ok(PreventChangeBias::LargerOnly),
            "smaller-only" | "keep-lowest" | "2" => Ok(PreventChangeBias::SmallerOnly),
            other => Err(OptionsError::InvalidBias(other.to_string())),
        }
    }
}

impl TryFrom<String> for PreventChangeBias {
    type Error = OptionsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PreventChangeBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid aspect ratio '{0}'")]
pub struct RatioParseError(pub String);

/// Known aspect ratios, parsed from a whitespace separated list such as
/// `"2.4 2.39 16/9 4/3"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct RatioList(Vec<f64>);

impl RatioList {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RatioList {
    fn default() -> Self {
        DEFAULT_RATIOS
            .parse()
            .unwrap_or_else(|_| RatioList(Vec::new()))
    }
}

impl FromStr for RatioList {
    type Err = RatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ratios = Vec::new();
        for token in s.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let value = match token.split_once('/') {
                Some((num, den)) => {
                    let num: f64 = num
                        .trim()
                        .parse()
                        .map_err(|_| RatioParseError(token.to_string()))?;
                    let den: f64 = den
                        .trim()
                        .parse()
                        .map_err(|_| RatioParseError(token.to_string()))?;
                    num / den
                }
                None => token
                    .parse()
                    .map_err(|_| RatioParseError(token.to_string()))?,
            };
            if !value.is_finite() || value <= 0.0 {
                return Err(RatioParseError(token.to_string()));
            }
            ratios.push(value);
        }
        Ok(RatioList(ratios))
    }
}

impl TryFrom<String> for RatioList {
    type Error = RatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("mode {0} is out of range (expected 0-4)")]
    InvalidMode(u8),

    #[error("unknown prevent-change bias '{0}'")]
    InvalidBias(String),

    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidTimer { field: &'static str, value: f64 },

    #[error("{field} must be within {min}..={max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("at least one aspect ratio is required")]
    EmptyRatios,

    #[error(transparent)]
    Ratio(#[from] RatioParseError),
}

/// Tuning knobs for the decision engine. Timers are in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub mode: Mode,
    pub start_delay: f64,
    pub fast_change_timer: f64,
    pub new_known_ratio_timer: f64,
    pub new_fallback_timer: f64,
    pub ratios: RatioList,
    pub ratio_pixel_tolerance: i32,
    pub offset_pixel_tolerance: i32,
    pub segmentation_factor: f64,
    pub correction_area_fraction: f64,
    pub correction_max_margin: i32,
    pub stabilization_pixels: i32,
    pub detect_limit: u32,
    pub detect_limit_step: u32,
    pub detect_round: u32,
    pub detect_reset: u32,
    pub detect_skip: u32,
    pub sample_jitter_pixels: i32,
    pub prevent_change_timer: f64,
    pub prevent_change_bias: PreventChangeBias,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: Mode::AutoStart,
            start_delay: 0.0,
            fast_change_timer: 1.0,
            new_known_ratio_timer: 5.0,
            new_fallback_timer: 20.0,
            ratios: RatioList::default(),
            ratio_pixel_tolerance: 2,
            offset_pixel_tolerance: 2,
            segmentation_factor: 0.5,
            correction_area_fraction: 0.6,
            correction_max_margin: 16,
            stabilization_pixels: 4,
            detect_limit: 26,
            detect_limit_step: 2,
            detect_round: 2,
            detect_reset: 1,
            detect_skip: 1,
            sample_jitter_pixels: 4,
            prevent_change_timer: 0.0,
            prevent_change_bias: PreventChangeBias::SmallerOnly,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        for (field, value) in [
            ("start_delay", self.start_delay),
            ("fast_change_timer", self.fast_change_timer),
            ("new_known_ratio_timer", self.new_known_ratio_timer),
            ("new_fallback_timer", self.new_fallback_timer),
            ("prevent_change_timer", self.prevent_change_timer),
            ("segmentation_factor", self.segmentation_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OptionsError::InvalidTimer { field, value });
            }
        }
        if !(0.0..=1.0).contains(&self.correction_area_fraction) {
            return Err(OptionsError::OutOfRange {
                field: "correction_area_fraction",
                value: self.correction_area_fraction,
                min: 0.0,
                max: 1.0,
            });
        }
        for (field, value) in [
            ("ratio_pixel_tolerance", self.ratio_pixel_tolerance),
            ("offset_pixel_tolerance", self.offset_pixel_tolerance),
            ("correction_max_margin", self.correction_max_margin),
            ("stabilization_pixels", self.stabilization_pixels),
            ("sample_jitter_pixels", self.sample_jitter_pixels),
        ] {
            if value < 0 {
                return Err(OptionsError::OutOfRange {
                    field,
                    value: f64::from(value),
                    min: 0.0,
                    max: f64::from(i32::MAX),
                });
            }
        }
        if self.ratios.is_empty() {
            return Err(OptionsError::EmptyRatios);
        }
        Ok(())
    }

    pub fn start_delay(&self) -> Duration {
        seconds(self.start_delay)
    }

    pub fn fast_change(&self) -> Duration {
        seconds(self.fast_change_timer)
    }

    pub fn known_ratio_timer(&self) -> Duration {
        seconds(self.new_known_ratio_timer)
    }

    /// `None` when fallback validation is disabled, i.e. configured as zero
    /// or shorter than the known-ratio timer.
    pub fn fallback_timer(&self) -> Option<Duration> {
        if self.new_fallback_timer <= 0.0 || self.new_fallback_timer < self.new_known_ratio_timer {
            None
        } else {
            Some(seconds(self.new_fallback_timer))
        }
    }

    pub fn prevent_change(&self) -> Option<Duration> {
        (self.prevent_change_timer > 0.0).then(|| seconds(self.prevent_change_timer))
    }

    pub fn correction_enabled(&self) -> bool {
        self.correction_area_fraction > 0.0
    }

    /// Divisor used to round the source frame size, never zero.
    pub fn round_divisor(&self) -> u32 {
        self.detect_round.max(1)
    }
}

/// Negative and NaN inputs map to zero; values past the representable range
/// saturate.
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
