use std::time::Duration;

use autocrop_types::{LifecycleEvent, PipelineError, Rect};
use tracing::{debug, error, info, trace};

use crate::buffer::CandidateBuffer;
use crate::config::{EngineOptions, Mode, OptionsError};
use crate::correction;
use crate::decision::{CommitGate, CommitInput, CommitReason, Verdict};
use crate::geometry::{Candidate, Source};
use crate::lifecycle::{EngineState, SuspendReason, ToggleAction, toggle_action};
use crate::pipeline::CropPipeline;
use crate::stabilization;
use crate::threshold::SensitivityController;
use crate::trust::{TrustStore, TrustedEntry, TrustedOffsets};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tick carried no playback position.
    MissingTime,
    /// The engine is not running.
    Inactive,
    /// No detection is pending since the last reset.
    NoSample,
    /// An automatic start is still before `start_delay`.
    BeforeStartDelay,
}

/// What one processed tick decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub observed: Rect,
    /// Rectangle after correction and stabilization.
    pub decided: Rect,
    pub corrected: bool,
    pub stabilized: bool,
    pub promoted: bool,
    pub elapsed: Duration,
    pub threshold: u32,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Processed(TickReport),
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped(_))
    }

    /// The rectangle committed on this tick, if any.
    pub fn committed(&self) -> Option<Rect> {
        match self {
            TickOutcome::Processed(report) if report.verdict.is_commit() => Some(report.decided),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSample {
    rect: Rect,
    at: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Streak {
    key: Rect,
    dwell: Duration,
}

/// Everything that lives from file load to file end.
#[derive(Debug)]
struct Session {
    source: Source,
    trust: TrustStore,
    offsets: TrustedOffsets,
    buffer: CandidateBuffer,
    sensitivity: SensitivityController,
    gate: CommitGate,
    applied: Rect,
    pending: Option<PendingSample>,
    clock: Option<Duration>,
    streak: Option<Streak>,
    honor_start_delay: bool,
    commits: u32,
}

impl Session {
    fn new(source: Source, options: &EngineOptions) -> Self {
        let seed = source.classify(source.rect(), options);
        Self {
            source,
            trust: TrustStore::seeded(seed),
            offsets: TrustedOffsets::seeded(options.offset_pixel_tolerance),
            buffer: CandidateBuffer::new(options),
            sensitivity: SensitivityController::new(options),
            gate: CommitGate::new(options),
            applied: source.rect(),
            pending: None,
            clock: None,
            streak: None,
            honor_start_delay: false,
            commits: 0,
        }
    }

    /// Drops state that only makes sense for uninterrupted playback. Trust
    /// and offsets are kept.
    fn reset_transient(&mut self) {
        self.buffer.clear();
        self.pending = None;
        self.clock = None;
        self.streak = None;
        self.sensitivity.forget_sample();
        self.gate.cancel();
    }

    fn applied_is_source(&self) -> bool {
        self.applied == self.source.rect()
    }

    fn step<P: CropPipeline>(
        &mut self,
        now: Duration,
        sample: PendingSample,
        options: &EngineOptions,
        pipeline: &mut P,
    ) -> (TickReport, bool) {
        let elapsed = now.saturating_sub(self.clock.unwrap_or(sample.at));
        self.clock = Some(now);
        self.gate.advance(elapsed);

        let observed = self.source.classify(sample.rect, options);
        let mut candidate = observed;

        let corrected = self.substitute(
            &mut candidate,
            correction::nearest_trusted(
                &observed,
                &self.trust,
                self.source.area(),
                self.applied,
                options,
            ),
        );
        if corrected {
            debug!(from = %observed.rect, to = %candidate.rect, "corrected candidate");
        }
        let previous = candidate.rect;
        let settled = stabilization::settle(&previous, &self.trust, options.stabilization_pixels);
        let mut stabilized = self.substitute(&mut candidate, settled);
        if stabilized {
            debug!(from = %previous, to = %candidate.rect, "stabilized candidate");
        }

        let mut key = candidate.key();
        let trusted = self.trust.contains(&key);
        self.buffer.record(&candidate, elapsed, trusted);
        let promoted = if trusted {
            self.trust.observe(&key, elapsed, now);
            false
        } else {
            self.promote(&candidate, now, options)
        };
        if promoted {
            let settled = stabilization::settle(&key, &self.trust, options.stabilization_pixels);
            if self.substitute(&mut candidate, settled) {
                debug!(from = %key, to = %candidate.rect, "stabilized promoted candidate");
                stabilized = true;
                key = candidate.key();
            }
        }

        let streak = match self.streak {
            Some(streak) if streak.key == key => streak.dwell.saturating_add(elapsed),
            _ => elapsed,
        };
        self.streak = Some(Streak { key, dwell: streak });

        let adjustment =
            self.sensitivity
                .adjust(candidate.is_source, self.applied_is_source(), sample.rect);

        let verdict = self.gate.evaluate(&CommitInput {
            candidate: &candidate,
            applied: self.applied,
            offsets_trusted: self.offsets.contains(candidate.offset),
            trusted: self.trust.contains(&key),
            limit_raised: adjustment.limit_raised,
            streak,
            promoted,
        });
        trace!(
            observed = %observed.rect,
            decided = %key,
            elapsed_ms = elapsed.as_millis() as u64,
            streak_ms = streak.as_millis() as u64,
            threshold = adjustment.threshold,
            ?verdict,
            "tick processed"
        );
        if let Verdict::Commit(reason) = verdict {
            self.commit(&candidate, reason, pipeline);
        }

        let report = TickReport {
            observed: observed.rect,
            decided: key,
            corrected,
            stabilized,
            promoted,
            elapsed,
            threshold: adjustment.threshold,
            verdict,
        };
        (report, adjustment.changed)
    }

    /// Replaces `candidate` with the trusted entry for `target`.
    fn substitute(&self, candidate: &mut Candidate, target: Option<Rect>) -> bool {
        match target.and_then(|target| self.trust.get(&target)) {
            Some(entry) => {
                *candidate = entry.candidate;
                true
            }
            None => false,
        }
    }

    fn promote(&mut self, candidate: &Candidate, now: Duration, options: &EngineOptions) -> bool {
        let key = candidate.key();
        let Some(readiness) = self.buffer.readiness(&key, options) else {
            return false;
        };
        let Some(entry) = self.buffer.take(&key) else {
            return false;
        };
        let offsets_grew = self.offsets.add(candidate.offset);
        info!(
            rect = %key,
            ?readiness,
            dwell_ms = entry.dwell.as_millis() as u64,
            offsets_grew,
            "promoted candidate to trusted"
        );
        self.trust
            .insert(TrustedEntry::new(*candidate, entry.dwell, Some(now)));
        true
    }

    fn commit<P: CropPipeline>(&mut self, candidate: &Candidate, reason: CommitReason, pipeline: &mut P) {
        let rect = candidate.key();
        if candidate.is_source {
            pipeline.remove_crop();
        } else {
            pipeline.apply_crop(rect);
        }
        if let Some(entry) = self.trust.get_mut(&rect) {
            entry.applied_count = entry.applied_count.saturating_add(1);
        }
        info!(from = %self.applied, to = %rect, ?reason, "crop changed");
        self.applied = rect;
        self.commits = self.commits.saturating_add(1);
        self.gate.arm();
    }
}

/// Decides when to change the crop from a stream of detections.
///
/// Detections are stored until the next clock tick, which does all of the
/// processing. Lifecycle events may arrive at any time.
pub struct CropEngine<P> {
    options: EngineOptions,
    pipeline: P,
    state: EngineState,
    session: Option<Session>,
    detector_installed: bool,
}

impl<P: CropPipeline> CropEngine<P> {
    pub fn new(options: EngineOptions, pipeline: P) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self {
            options,
            pipeline,
            state: EngineState::Unloaded,
            session: None,
            detector_installed: false,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    pub fn into_pipeline(self) -> P {
        self.pipeline
    }

    pub fn source(&self) -> Option<Rect> {
        self.session.as_ref().map(|session| session.source.rect())
    }

    pub fn applied(&self) -> Option<Rect> {
        self.session.as_ref().map(|session| session.applied)
    }

    pub fn threshold(&self) -> Option<u32> {
        self.session
            .as_ref()
            .map(|session| session.sensitivity.current())
    }

    pub fn trust(&self) -> Option<&TrustStore> {
        self.session.as_ref().map(|session| &session.trust)
    }

    pub fn offsets(&self) -> Option<&TrustedOffsets> {
        self.session.as_ref().map(|session| &session.offsets)
    }

    pub fn buffer(&self) -> Option<&CandidateBuffer> {
        self.session.as_ref().map(|session| &session.buffer)
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.session
            .as_ref()
            .and_then(|session| session.gate.cooldown_remaining())
    }

    /// Crop changes committed since the file was loaded.
    pub fn commits(&self) -> u32 {
        self.session.as_ref().map_or(0, |session| session.commits)
    }

    /// Stores the latest detector output. `None` means the detector reset
    /// and the previous sample no longer applies.
    pub fn on_detection(&mut self, sample: Option<Rect>, arrival: Duration) {
        if !self.state.is_active() {
            trace!(state = %self.state, "detection ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match sample {
            Some(rect) => session.pending = Some(PendingSample { rect, at: arrival }),
            None => {
                session.pending = None;
                session.clock = None;
            }
        }
    }

    pub fn on_clock_tick(&mut self, time: Option<Duration>) -> TickOutcome {
        let Some(now) = time else {
            trace!("tick without playback position skipped");
            return TickOutcome::Skipped(SkipReason::MissingTime);
        };
        if !self.state.is_active() {
            return TickOutcome::Skipped(SkipReason::Inactive);
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Skipped(SkipReason::Inactive);
        };
        if session.honor_start_delay && now < self.options.start_delay() {
            return TickOutcome::Skipped(SkipReason::BeforeStartDelay);
        }
        let Some(sample) = session.pending else {
            return TickOutcome::Skipped(SkipReason::NoSample);
        };

        let (report, threshold_changed) = session.step(now, sample, &self.options, &mut self.pipeline);
        let settings = session.sensitivity.settings();

        if report.verdict.is_commit() && self.options.mode.is_single_shot() {
            self.complete();
        } else if threshold_changed {
            if let Err(err) = self.pipeline.configure_detector(settings) {
                self.disable(err);
            }
        }
        TickOutcome::Processed(report)
    }

    pub fn on_lifecycle(&mut self, event: LifecycleEvent) -> EngineState {
        debug!(event = event.as_str(), state = %self.state, "lifecycle event");
        match event {
            LifecycleEvent::FileLoaded { width, height, fps } => self.load(width, height, fps),
            LifecycleEvent::FileEnded => {
                self.teardown();
                self.state = EngineState::Ended;
            }
            LifecycleEvent::Seek => self.suspend_playback(SuspendReason::Seek),
            LifecycleEvent::Pause { paused: true } => self.suspend_playback(SuspendReason::Pause),
            LifecycleEvent::Pause { paused: false } | LifecycleEvent::Resume => {
                if let EngineState::Suspended(reason) = self.state {
                    if reason.is_playback() {
                        self.state = EngineState::Active;
                    }
                }
            }
            LifecycleEvent::Toggle => self.toggle(),
        }
        self.state
    }

    fn load(&mut self, width: u32, height: u32, fps: Option<f64>) {
        if self.session.is_some() {
            self.teardown();
        }
        let source = Source::new(width, height, self.options.round_divisor());
        info!(
            source = %source.rect(),
            fps = fps.unwrap_or_default(),
            mode = %self.options.mode,
            "file loaded"
        );
        self.session = Some(Session::new(source, &self.options));
        self.state = EngineState::Loaded;

        if self.options.mode == Mode::Disabled {
            debug!("automatic cropping disabled by mode");
        } else if self.options.mode.starts_automatically() {
            self.activate(true);
        }
    }

    fn activate(&mut self, honor_start_delay: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.reset_transient();
        session.honor_start_delay = honor_start_delay;
        let settings = session.sensitivity.settings();
        match self.pipeline.configure_detector(settings) {
            Ok(()) => {
                self.detector_installed = true;
                self.state = EngineState::Active;
                info!(threshold = settings.threshold, "detection started");
            }
            Err(err) => self.disable(err),
        }
    }

    fn suspend_playback(&mut self, reason: SuspendReason) {
        if !self.state.is_running() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.reset_transient();
        }
        self.state = EngineState::Suspended(reason);
    }

    fn toggle(&mut self) {
        match toggle_action(self.state, self.options.mode) {
            ToggleAction::Start | ToggleAction::Resume => self.activate(false),
            ToggleAction::Suspend => {
                self.remove_detector();
                if let Some(session) = self.session.as_mut() {
                    session.reset_transient();
                }
                self.state = EngineState::Suspended(SuspendReason::Toggle);
                info!("detection suspended by toggle");
            }
            ToggleAction::Revert => {
                self.remove_detector();
                if let Some(session) = self.session.as_mut() {
                    if !session.applied_is_source() {
                        self.pipeline.remove_crop();
                        session.applied = session.source.rect();
                    }
                    session.reset_transient();
                }
                self.state = EngineState::Loaded;
                info!("crop reverted to source");
            }
            ToggleAction::Ignore => {
                debug!(state = %self.state, "toggle ignored");
            }
        }
    }

    /// Single-shot modes stop looking once their crop is in place.
    fn complete(&mut self) {
        self.remove_detector();
        if let Some(session) = self.session.as_mut() {
            session.reset_transient();
        }
        self.state = EngineState::Suspended(SuspendReason::Completed);
        info!("single crop applied, detection stopped");
    }

    fn disable(&mut self, err: PipelineError) {
        error!(%err, "detector unavailable, automatic cropping disabled");
        if let Some(session) = self.session.as_mut() {
            session.pending = None;
            session.gate.cancel();
        }
        self.state = EngineState::Disabled;
    }

    fn remove_detector(&mut self) {
        if self.detector_installed {
            self.pipeline.remove_detector();
            self.detector_installed = false;
        }
    }

    fn teardown(&mut self) {
        self.remove_detector();
        let Some(session) = self.session.take() else {
            return;
        };
        if !session.applied_is_source() {
            self.pipeline.remove_crop();
        }
        if session.trust.len() > 1 || session.commits > 0 {
            info!(
                commits = session.commits,
                trusted = session.trust.len(),
                "session closed"
            );
        } else {
            debug!("session closed without crops");
        }
        if !session.buffer.is_empty() {
            debug!(
                pending = session.buffer.len(),
                "discarding unpromoted candidates"
            );
        }
    }
}
