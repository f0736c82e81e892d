//! Runtime configuration for the acquisition loop.
//!
//! These are the types `Acquisition` consumes. They are separate from the
//! TOML-deserialized config in `freeloader_config`; see `conversions`.

use std::time::Duration;

/// How the motor is driven during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionCfg {
    /// Moving speed while pulling.
    pub speed: u16,
    /// Closed-loop goal, or the ceiling for incremental goals.
    pub target_position: i32,
    /// When set, the goal advances by this much every iteration.
    pub step_increment: Option<i32>,
    pub home_position: i32,
    pub home_speed: u16,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            speed: 10,
            target_position: 1020,
            step_increment: None,
            home_position: 0,
            home_speed: 1023,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingCfg {
    /// Sleep between iterations.
    pub interval: Duration,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
        }
    }
}

/// Stop thresholds evaluated after every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPolicy {
    /// Force above which torque is cut and the run stops.
    pub max_force: f64,
    /// Encoder position at which the run stops.
    pub travel_limit: i32,
    /// A reading below `previous * break_ratio` counts as a break. 0 disables.
    pub break_ratio: f64,
    /// Drops from a previous reading at or below this are ignored.
    pub break_floor: f64,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            max_force: 200.0,
            travel_limit: 1000,
            break_ratio: 0.1,
            break_floor: 0.5,
        }
    }
}
