//! Iteration status and run events.

use crate::sample::Sample;
use crate::stop::StopReason;

/// Result of one `Acquisition::step`.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionStatus {
    /// A sample was recorded; keep going.
    Sampled(Sample),
    /// The load cell answered with garbage; nothing was recorded.
    Skipped(String),
    /// The run is over and the motor has been sent home.
    Stopped(StopReason),
}

impl AcquisitionStatus {
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

/// Progress notifications for a presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Sampled(Sample),
    Skipped { reason: String },
    /// Safety trip or homing trouble; the run may still end cleanly.
    Warning(String),
    Stopped(StopReason),
    Failed(String),
}
