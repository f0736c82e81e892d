//! The acquisition loop: drive the motor, sample position and force, stop.
//!
//! `Acquisition` owns the `Rig` for the length of a run. Each `step` is one
//! poll iteration and returns a typed `AcquisitionStatus`; fatal device
//! failures come back as `Err` after the motor has been sent home.

use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel as xch;
use freeloader_traits::clock::{Clock, MonotonicClock};
use freeloader_traits::{BoxError, LoadCell, Motor};

use crate::config::{MotionCfg, SamplingCfg, StopPolicy};
use crate::error::{BuildError, FreeloaderError, Result};
use crate::export::SampleSink;
use crate::hw_error::map_hw_error;
use crate::sample::{RunLog, Sample};
use crate::session::Rig;
use crate::status::{AcquisitionStatus, RunEvent};
use crate::stop::{StopReason, StopToken};

/// Summary of a finished (or aborted) run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub samples: usize,
    pub skipped: usize,
    /// `None` when the run aborted with an error.
    pub stop_reason: Option<StopReason>,
    pub peak_weight: Option<f64>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Which {
    Motor,
    LoadCell,
}

/// Per-run state, reset by `begin`.
#[derive(Debug, Default)]
struct RunState {
    begun: bool,
    goal: i32,
    prev_nonzero: Option<f64>,
    samples: usize,
    skipped: usize,
    peak: Option<f64>,
    started: Option<Instant>,
    stop_reason: Option<StopReason>,
}

pub struct Acquisition<M, L> {
    rig: Rig<M, L>,
    motion: MotionCfg,
    sampling: SamplingCfg,
    policy: StopPolicy,
    clock: Box<dyn Clock + Send + Sync>,
    stop: StopToken,
    log: RunLog,
    sink: Option<Box<dyn SampleSink + Send>>,
    events: Option<xch::Sender<RunEvent>>,
    state: RunState,
}

impl<M, L> core::fmt::Debug for Acquisition<M, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Acquisition")
            .field("motion", &self.motion)
            .field("policy", &self.policy)
            .field("begun", &self.state.begun)
            .field("samples", &self.state.samples)
            .field("stop_reason", &self.state.stop_reason)
            .finish_non_exhaustive()
    }
}

impl<M: Motor, L: LoadCell> Acquisition<M, L> {
    pub fn builder() -> AcquisitionBuilder<M, L> {
        AcquisitionBuilder::default()
    }

    /// Handle to the samples of the current run.
    pub fn log(&self) -> RunLog {
        self.log.clone()
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub const fn rig(&self) -> &Rig<M, L> {
        &self.rig
    }

    pub const fn rig_mut(&mut self) -> &mut Rig<M, L> {
        &mut self.rig
    }

    /// Give the rig back once the run is over.
    pub fn into_rig(self) -> Rig<M, L> {
        self.rig
    }

    pub const fn policy(&self) -> &StopPolicy {
        &self.policy
    }

    /// Replace the streaming sink for the next run.
    pub fn set_sink(&mut self, sink: Option<Box<dyn SampleSink + Send>>) {
        self.sink = sink;
    }

    pub(crate) fn set_events(&mut self, tx: xch::Sender<RunEvent>) {
        self.events = Some(tx);
    }

    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop_reason
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            samples: self.state.samples,
            skipped: self.state.skipped,
            stop_reason: self.state.stop_reason,
            peak_weight: self.state.peak,
            elapsed: self
                .state
                .started
                .map_or(Duration::ZERO, |t| self.clock.now().saturating_duration_since(t)),
        }
    }

    fn emit(&self, ev: RunEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is watching; the run carries on.
            let _ = tx.send(ev);
        }
    }

    /// Start a run: clear the log, enable torque, set speed and the first goal.
    ///
    /// The stop token is left as is. A stop requested before `begin` ends the
    /// run at the first `step`; callers reset the token before arming it.
    pub fn begin(&mut self) -> Result<()> {
        if !self.rig.is_ready() {
            return Err(eyre::Report::new(FreeloaderError::State(
                "motor and load cell must both be connected".into(),
            )));
        }
        self.log.clear();
        self.state = RunState::default();

        let goal = if self.motion.step_increment.is_some() {
            self.motion.home_position
        } else {
            self.motion.target_position
        };
        let speed = self.motion.speed;
        self.motor_call("enable torque", |m| m.set_torque(true))?;
        self.motor_call("set speed", |m| m.set_speed(speed))?;
        self.motor_call("set goal", |m| m.set_position(goal))?;

        self.state.goal = goal;
        self.state.started = Some(self.clock.now());
        self.state.begun = true;
        tracing::info!(
            target_position = self.motion.target_position,
            speed,
            incremental = self.motion.step_increment.is_some(),
            "run start"
        );
        Ok(())
    }

    /// One poll iteration.
    pub fn step(&mut self) -> Result<AcquisitionStatus> {
        if let Some(reason) = self.state.stop_reason {
            return Ok(AcquisitionStatus::Stopped(reason));
        }
        if !self.state.begun {
            return Err(eyre::Report::new(FreeloaderError::State(
                "run not begun".into(),
            )));
        }
        if self.stop.is_requested() {
            return Ok(self.halt(StopReason::UserRequested));
        }

        if let Some(inc) = self.motion.step_increment {
            if self.state.goal < self.motion.target_position {
                let goal = self
                    .state
                    .goal
                    .saturating_add(inc)
                    .min(self.motion.target_position);
                self.try_motor("set goal", |m| m.set_position(goal))?;
                self.state.goal = goal;
            }
        }

        let position = self.try_motor("read position", |m| m.position())?;
        let reading = self.rig.load_cell.device_mut()?.read_weight();
        let weight = match reading {
            Ok(w) => w,
            Err(e) => match map_hw_error("read weight", &*e) {
                FreeloaderError::Parse(raw) => {
                    self.state.skipped += 1;
                    tracing::warn!(raw = %raw, "skipping malformed weight reading");
                    let reason = format!("malformed weight reading {raw:?}");
                    self.emit(RunEvent::Skipped {
                        reason: reason.clone(),
                    });
                    self.clock.sleep(self.sampling.interval);
                    return Ok(AcquisitionStatus::Skipped(reason));
                }
                err => return Err(self.abort(Which::LoadCell, err)),
            },
        };

        let sample = Sample::new(Local::now(), position, weight);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_sample(&sample) {
                self.home();
                self.state.begun = false;
                let msg = format!("writing sample: {e}");
                tracing::error!(error = %msg, "run aborted");
                self.emit(RunEvent::Failed(msg.clone()));
                return Err(eyre::Report::new(FreeloaderError::Io(msg)));
            }
        }
        // Log only what the sink accepted, so the file and the log agree.
        self.log.push(sample.clone());
        self.state.samples += 1;
        self.state.peak = Some(self.state.peak.map_or(weight, |p| p.max(weight)));
        tracing::debug!(position, weight, "sample");
        self.emit(RunEvent::Sampled(sample.clone()));

        if let Some(reason) = self.evaluate(position, weight) {
            return Ok(self.halt(reason));
        }

        self.clock.sleep(self.sampling.interval);
        Ok(AcquisitionStatus::Sampled(sample))
    }

    fn evaluate(&mut self, position: i32, weight: f64) -> Option<StopReason> {
        if self.stop.is_requested() {
            return Some(StopReason::UserRequested);
        }
        if self.policy.is_overload(weight) {
            if let Ok(m) = self.rig.motor.device_mut() {
                if let Err(e) = m.set_torque(false) {
                    tracing::warn!(error = %e, "torque off failed on overload");
                }
            }
            let msg = format!(
                "force {weight} exceeds limit {}; torque disabled",
                self.policy.max_force
            );
            tracing::warn!(weight, max_force = self.policy.max_force, "overload");
            self.emit(RunEvent::Warning(msg));
            return Some(StopReason::Overload);
        }
        let prev = self.state.prev_nonzero;
        if weight != 0.0 {
            self.state.prev_nonzero = Some(weight);
        }
        if prev.is_some_and(|p| self.policy.is_break(p, weight)) {
            tracing::info!(previous = prev, weight, "sample break detected");
            return Some(StopReason::SampleBreak);
        }
        if self.policy.is_travel_limit(position) {
            return Some(StopReason::TravelLimit);
        }
        None
    }

    fn halt(&mut self, reason: StopReason) -> AcquisitionStatus {
        self.state.stop_reason = Some(reason);
        self.home();
        tracing::info!(
            %reason,
            samples = self.state.samples,
            skipped = self.state.skipped,
            "run stopped"
        );
        self.emit(RunEvent::Stopped(reason));
        AcquisitionStatus::Stopped(reason)
    }

    /// Send the motor to its resting position. Best-effort.
    pub fn home(&mut self) {
        let Ok(m) = self.rig.motor.device_mut() else {
            tracing::warn!("cannot home: motor offline");
            return;
        };
        let res = m
            .set_speed(self.motion.home_speed)
            .and_then(|()| m.set_position(self.motion.home_position));
        if let Err(e) = res {
            tracing::warn!(error = %e, "homing failed");
            self.emit(RunEvent::Warning(format!("homing failed: {e}")));
        }
    }

    /// Home, invalidate the failing session and build the abort error.
    fn abort(&mut self, which: Which, err: FreeloaderError) -> eyre::Report {
        self.home();
        match which {
            Which::Motor => self.rig.motor.invalidate(),
            Which::LoadCell => self.rig.load_cell.invalidate(),
        }
        self.state.begun = false;
        tracing::error!(error = %err, samples = self.state.samples, "run aborted");
        self.emit(RunEvent::Failed(err.to_string()));
        eyre::Report::new(err)
    }

    /// Motor call inside a run; failures abort.
    fn try_motor<T>(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut M) -> std::result::Result<T, BoxError>,
    ) -> Result<T> {
        let res = f(self.rig.motor.device_mut()?);
        res.map_err(|e| {
            let err = map_hw_error(op, &*e);
            self.abort(Which::Motor, err)
        })
    }

    /// Motor call during `begin`; nothing to home yet.
    fn motor_call(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut M) -> std::result::Result<(), BoxError>,
    ) -> Result<()> {
        let res = f(self.rig.motor.device_mut()?);
        res.map_err(|e| {
            let err = map_hw_error(op, &*e);
            self.rig.motor.invalidate();
            tracing::error!(error = %err, "run start failed");
            eyre::Report::new(err)
        })
    }
}

/// Builder for `Acquisition`. Only the rig is required.
pub struct AcquisitionBuilder<M, L> {
    rig: Option<Rig<M, L>>,
    motion: MotionCfg,
    sampling: SamplingCfg,
    policy: StopPolicy,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    stop: Option<StopToken>,
    sink: Option<Box<dyn SampleSink + Send>>,
    events: Option<xch::Sender<RunEvent>>,
}

impl<M, L> Default for AcquisitionBuilder<M, L> {
    fn default() -> Self {
        Self {
            rig: None,
            motion: MotionCfg::default(),
            sampling: SamplingCfg::default(),
            policy: StopPolicy::default(),
            clock: None,
            stop: None,
            sink: None,
            events: None,
        }
    }
}

impl<M: Motor, L: LoadCell> AcquisitionBuilder<M, L> {
    #[must_use]
    pub fn with_rig(mut self, rig: Rig<M, L>) -> Self {
        self.rig = Some(rig);
        self
    }

    #[must_use]
    pub fn with_motion(mut self, motion: MotionCfg) -> Self {
        self.motion = motion;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingCfg) -> Self {
        self.sampling = sampling;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn SampleSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_events(mut self, tx: xch::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Check motion and policy without consuming the builder, so a caller
    /// can still hand its rig elsewhere on failure.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));

        if self.motion.speed == 0 {
            return invalid("speed must be > 0");
        }
        if self.motion.step_increment.is_some_and(|i| i <= 0) {
            return invalid("step_increment must be > 0");
        }
        if !(self.policy.max_force.is_finite() && self.policy.max_force > 0.0) {
            return invalid("max_force must be > 0");
        }
        if !(0.0..1.0).contains(&self.policy.break_ratio) {
            return invalid("break_ratio must be in [0, 1)");
        }
        if self.policy.break_floor.is_sign_negative() {
            return invalid("break_floor must be >= 0");
        }
        Ok(())
    }

    pub fn build(self) -> Result<Acquisition<M, L>> {
        self.validate()?;
        let rig = self
            .rig
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRig))?;

        Ok(Acquisition {
            rig,
            motion: self.motion,
            sampling: self.sampling,
            policy: self.policy,
            clock: self
                .clock
                .unwrap_or_else(|| Box::new(MonotonicClock::new())),
            stop: self.stop.unwrap_or_default(),
            log: RunLog::new(),
            sink: self.sink,
            events: self.events,
            state: RunState::default(),
        })
    }
}
