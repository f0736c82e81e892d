//! Simulated rig: a motor and a load cell sharing one physical state, so
//! force tracks how far the motor has pulled the sample.
use std::sync::{Arc, Mutex, MutexGuard};

use freeloader_traits::{BoxError, Device, LoadCell, Motor, MalformedReading};
use tracing::trace;

use crate::error::HwError;

/// Knobs for the simulated specimen and link.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Encoder ticks travelled per position poll while torque is on.
    pub ticks_per_poll: i32,
    /// Force per tick of stretch beyond `slack`.
    pub stiffness: f64,
    /// Travel before the sample starts carrying load.
    pub slack: i32,
    /// Position at which the sample snaps; `None` never breaks.
    pub break_at: Option<i32>,
    /// Force left on the cell after the break.
    pub residual: f64,
    /// Weight reads succeed this many times, then the link drops.
    pub fail_after_reads: Option<usize>,
    /// Every n-th weight read returns garbage.
    pub garble_every: Option<usize>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            ticks_per_poll: 5,
            stiffness: 0.2,
            slack: 20,
            break_at: Some(600),
            residual: 0.05,
            fail_after_reads: None,
            garble_every: None,
        }
    }
}

#[derive(Debug, Default)]
struct RigState {
    position: i32,
    goal: i32,
    speed: u16,
    torque: bool,
    tare: f64,
    broken: bool,
    weight_reads: usize,
}

/// Shared handle to the simulated mechanics.
#[derive(Debug, Clone)]
pub struct SimRig {
    state: Arc<Mutex<RigState>>,
    params: Arc<SimParams>,
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new(SimParams::default())
    }
}

impl SimRig {
    pub fn new(params: SimParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState::default())),
            params: Arc::new(params),
        }
    }

    pub fn motor(&self) -> SimulatedMotor {
        SimulatedMotor { rig: self.clone() }
    }

    pub fn load_cell(&self) -> SimulatedLoadCell {
        SimulatedLoadCell { rig: self.clone() }
    }

    /// Current encoder position without advancing the simulation.
    pub fn position(&self) -> i32 {
        self.state.lock().map(|s| s.position).unwrap_or_default()
    }

    pub fn torque_enabled(&self) -> bool {
        self.state.lock().map(|s| s.torque).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RigState>, HwError> {
        self.state.lock().map_err(|_| HwError::Closed)
    }

    fn raw_force(&self, state: &mut RigState) -> f64 {
        if let Some(at) = self.params.break_at {
            if state.position >= at {
                state.broken = true;
            }
        }
        if state.broken {
            return self.params.residual;
        }
        let stretch = (state.position - self.params.slack).max(0);
        self.params.stiffness * f64::from(stretch)
    }
}

pub struct SimulatedMotor {
    rig: SimRig,
}

impl Device for SimulatedMotor {
    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.rig.lock()?.torque = false;
        Ok(())
    }
}

impl Motor for SimulatedMotor {
    fn set_torque(&mut self, enabled: bool) -> Result<(), BoxError> {
        self.rig.lock()?.torque = enabled;
        Ok(())
    }

    fn set_speed(&mut self, speed: u16) -> Result<(), BoxError> {
        self.rig.lock()?.speed = speed;
        Ok(())
    }

    fn set_position(&mut self, position: i32) -> Result<(), BoxError> {
        self.rig.lock()?.goal = position;
        Ok(())
    }

    fn position(&mut self) -> Result<i32, BoxError> {
        let step = self.rig.params.ticks_per_poll.max(1);
        let mut s = self.rig.lock()?;
        if s.torque && s.speed > 0 {
            let delta = (s.goal - s.position).clamp(-step, step);
            s.position += delta;
        }
        trace!(position = s.position, goal = s.goal, "sim motor position");
        Ok(s.position)
    }

    fn ping(&mut self) -> bool {
        self.rig.lock().is_ok()
    }
}

pub struct SimulatedLoadCell {
    rig: SimRig,
}

impl Device for SimulatedLoadCell {}

impl LoadCell for SimulatedLoadCell {
    fn tare(&mut self) -> Result<(), BoxError> {
        let mut s = self.rig.lock()?;
        let raw = self.rig.raw_force(&mut s);
        s.tare = raw;
        Ok(())
    }

    fn read_weight(&mut self) -> Result<f64, BoxError> {
        let mut s = self.rig.lock()?;
        s.weight_reads += 1;
        let n = s.weight_reads;
        if let Some(limit) = self.rig.params.fail_after_reads {
            if n > limit {
                return Err(HwError::Timeout.into());
            }
        }
        if let Some(every) = self.rig.params.garble_every {
            if every > 0 && n % every == 0 {
                return Err(MalformedReading("ERR".into()).into());
            }
        }
        let w = self.rig.raw_force(&mut s) - s.tare;
        trace!(weight = w, "sim load cell reading");
        Ok(w)
    }
}
