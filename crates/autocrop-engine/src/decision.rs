//! Commit gate and the post-change cooldown.

use std::time::Duration;

use autocrop_types::Rect;

use crate::config::{EngineOptions, PreventChangeBias};
use crate::geometry::Candidate;

/// Time remaining until a deadline, advanced explicitly by the playback clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: Duration,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            remaining: duration,
        }
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    /// Source came back while the detector threshold was below its limit.
    LimitRaised,
    /// Source was re-observed for the fast-change time.
    SourceRestored,
    /// A trusted rectangle was re-observed for the fast-change time.
    Reobserved,
    /// A buffered candidate reached promotion this tick.
    Promoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    Invalid,
    AlreadyApplied,
    UntrustedOffset,
    Unconfirmed,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Commit(CommitReason),
    Hold(HoldReason),
}

impl Verdict {
    pub fn is_commit(&self) -> bool {
        matches!(self, Verdict::Commit(_))
    }
}

/// Everything the gate looks at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct CommitInput<'a> {
    pub candidate: &'a Candidate,
    pub applied: Rect,
    pub offsets_trusted: bool,
    pub trusted: bool,
    pub limit_raised: bool,
    /// Continuous re-observation time of this rectangle.
    pub streak: Duration,
    pub promoted: bool,
}

#[derive(Debug, Clone)]
pub struct CommitGate {
    fast_change: Duration,
    prevent_change: Option<Duration>,
    bias: PreventChangeBias,
    cooldown: Option<Countdown>,
}

impl CommitGate {
    pub fn new(options: &EngineOptions) -> Self {
        Self {
            fast_change: options.fast_change(),
            prevent_change: options.prevent_change(),
            bias: options.prevent_change_bias,
            cooldown: None,
        }
    }

    pub fn advance(&mut self, elapsed: Duration) {
        if let Some(cooldown) = self.cooldown.as_mut() {
            cooldown.advance(elapsed);
            if cooldown.is_expired() {
                self.cooldown = None;
            }
        }
    }

    pub fn cancel(&mut self) {
        self.cooldown = None;
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.cooldown.map(|cooldown| cooldown.remaining())
    }

    /// Starts the cooldown after a commit, when one is configured.
    pub fn arm(&mut self) {
        self.cooldown = self.prevent_change.map(Countdown::new);
    }

    pub fn evaluate(&self, input: &CommitInput<'_>) -> Verdict {
        let candidate = input.candidate;
        if candidate.is_invalid {
            return Verdict::Hold(HoldReason::Invalid);
        }
        if candidate.rect == input.applied {
            return Verdict::Hold(HoldReason::AlreadyApplied);
        }
        if !input.offsets_trusted {
            return Verdict::Hold(HoldReason::UntrustedOffset);
        }

        let confirmed = input.streak >= self.fast_change;
        let reason = if candidate.is_source {
            if input.limit_raised {
                Some(CommitReason::LimitRaised)
            } else if confirmed {
                Some(CommitReason::SourceRestored)
            } else {
                None
            }
        } else if input.promoted {
            Some(CommitReason::Promoted)
        } else if input.trusted && confirmed {
            Some(CommitReason::Reobserved)
        } else {
            None
        };
        let Some(reason) = reason else {
            return Verdict::Hold(HoldReason::Unconfirmed);
        };

        if self.cooldown.is_some() && !self.bias_allows(candidate.area(), input.applied.area()) {
            return Verdict::Hold(HoldReason::Cooldown);
        }
        Verdict::Commit(reason)
    }

    /// Whether a change may pass the running cooldown. `Any` blocks every
    /// change, larger or smaller, until the cooldown expires.
    fn bias_allows(&self, next_area: i64, applied_area: i64) -> bool {
        match self.bias {
            PreventChangeBias::Any => false,
            PreventChangeBias::LargerOnly => next_area > applied_area,
            PreventChangeBias::SmallerOnly => next_area < applied_area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Source;

    const SOURCE: Rect = Rect::new(1920, 1080, 0, 0);
    const LETTERBOX: Rect = Rect::new(1920, 800, 0, 140);

    fn candidate(rect: Rect) -> Candidate {
        Source::new(1920, 1080, 2).classify(rect, &EngineOptions::default())
    }

    fn input(candidate: &Candidate, applied: Rect) -> CommitInput<'_> {
        CommitInput {
            candidate,
            applied,
            offsets_trusted: true,
            trusted: true,
            limit_raised: false,
            streak: Duration::from_secs(2),
            promoted: false,
        }
    }

    #[test]
    fn countdown_saturates() {
        let mut countdown = Countdown::new(Duration::from_secs(2));
        countdown.advance(Duration::from_millis(1500));
        assert_eq!(countdown.remaining(), Duration::from_millis(500));
        assert!(!countdown.is_expired());
        countdown.advance(Duration::from_secs(1));
        assert!(countdown.is_expired());
    }

    #[test]
    fn already_applied_is_held() {
        let gate = CommitGate::new(&EngineOptions::default());
        let letterbox = candidate(LETTERBOX);
        assert_eq!(
            gate.evaluate(&input(&letterbox, LETTERBOX)),
            Verdict::Hold(HoldReason::AlreadyApplied)
        );
    }

    #[test]
    fn untrusted_offsets_block_commit() {
        let gate = CommitGate::new(&EngineOptions::default());
        let letterbox = candidate(LETTERBOX);
        let request = CommitInput {
            offsets_trusted: false,
            promoted: true,
            ..input(&letterbox, SOURCE)
        };
        assert_eq!(
            gate.evaluate(&request),
            Verdict::Hold(HoldReason::UntrustedOffset)
        );
    }

    #[test]
    fn trusted_rectangle_needs_fast_change_streak() {
        let gate = CommitGate::new(&EngineOptions::default());
        let letterbox = candidate(LETTERBOX);
        let short = CommitInput {
            streak: Duration::from_millis(400),
            ..input(&letterbox, SOURCE)
        };
        assert_eq!(gate.evaluate(&short), Verdict::Hold(HoldReason::Unconfirmed));
        assert_eq!(
            gate.evaluate(&input(&letterbox, SOURCE)),
            Verdict::Commit(CommitReason::Reobserved)
        );
    }

    #[test]
    fn source_returns_immediately_after_limit_raise() {
        let gate = CommitGate::new(&EngineOptions::default());
        let source = candidate(SOURCE);
        let request = CommitInput {
            limit_raised: true,
            streak: Duration::ZERO,
            ..input(&source, LETTERBOX)
        };
        assert_eq!(
            gate.evaluate(&request),
            Verdict::Commit(CommitReason::LimitRaised)
        );
    }

    #[test]
    fn invalid_candidates_never_commit() {
        let gate = CommitGate::new(&EngineOptions::default());
        let invalid = candidate(Rect::new(-1920, -1080, 1920, 1080));
        let request = CommitInput {
            promoted: true,
            ..input(&invalid, SOURCE)
        };
        assert_eq!(gate.evaluate(&request), Verdict::Hold(HoldReason::Invalid));
    }

    #[test]
    fn cooldown_bias_filters_by_area() {
        let options = EngineOptions {
            prevent_change_timer: 10.0,
            prevent_change_bias: PreventChangeBias::SmallerOnly,
            ..EngineOptions::default()
        };
        let mut gate = CommitGate::new(&options);
        gate.arm();
        assert_eq!(gate.cooldown_remaining(), Some(Duration::from_secs(10)));

        let source = candidate(SOURCE);
        assert_eq!(
            gate.evaluate(&input(&source, LETTERBOX)),
            Verdict::Hold(HoldReason::Cooldown)
        );
        let letterbox = candidate(LETTERBOX);
        assert!(gate.evaluate(&input(&letterbox, SOURCE)).is_commit());

        gate.advance(Duration::from_secs(10));
        assert_eq!(gate.cooldown_remaining(), None);
        assert!(gate.evaluate(&input(&source, LETTERBOX)).is_commit());
    }

    #[test]
    fn any_bias_blocks_everything_until_cancelled() {
        let options = EngineOptions {
            prevent_change_timer: 10.0,
            prevent_change_bias: PreventChangeBias::Any,
            ..EngineOptions::default()
        };
        let mut gate = CommitGate::new(&options);
        gate.arm();
        let letterbox = candidate(LETTERBOX);
        assert_eq!(
            gate.evaluate(&input(&letterbox, SOURCE)),
            Verdict::Hold(HoldReason::Cooldown)
        );
        let source = candidate(SOURCE);
        let restore = CommitInput {
            limit_raised: true,
            ..input(&source, LETTERBOX)
        };
        assert_eq!(gate.evaluate(&restore), Verdict::Hold(HoldReason::Cooldown));
        gate.cancel();
        assert!(gate.evaluate(&input(&letterbox, SOURCE)).is_commit());
    }

    #[test]
    fn no_cooldown_without_timer() {
        let mut gate = CommitGate::new(&EngineOptions::default());
        gate.arm();
        assert_eq!(gate.cooldown_remaining(), None);
    }
}
