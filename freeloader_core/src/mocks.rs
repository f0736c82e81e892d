//! Scripted devices for tests, benches and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use freeloader_traits::{BoxError, Device, LoadCell, MalformedReading, Motor};

/// Every command a `ScriptedMotor` received, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Torque(bool),
    Speed(u16),
    Goal(i32),
    Disconnect,
}

/// Shared view of a scripted motor's command history.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<MotorCommand>>>);

impl CommandLog {
    fn push(&self, c: MotorCommand) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(c);
    }

    pub fn snapshot(&self) -> Vec<MotorCommand> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A motor that reports positions from a script.
///
/// Once the script runs out the last position repeats.
#[derive(Debug)]
pub struct ScriptedMotor {
    positions: VecDeque<i32>,
    current: i32,
    fail_after: Option<usize>,
    reads: usize,
    answers_ping: bool,
    log: CommandLog,
}

impl Default for ScriptedMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedMotor {
    pub fn new() -> Self {
        Self {
            positions: VecDeque::new(),
            current: 0,
            fail_after: None,
            reads: 0,
            answers_ping: true,
            log: CommandLog::default(),
        }
    }

    #[must_use]
    pub fn with_positions(mut self, positions: impl IntoIterator<Item = i32>) -> Self {
        self.positions = positions.into_iter().collect();
        self
    }

    /// Position reads beyond the first `n` fail.
    #[must_use]
    pub const fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.answers_ping = false;
        self
    }

    pub fn commands(&self) -> CommandLog {
        self.log.clone()
    }
}

impl Device for ScriptedMotor {
    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.log.push(MotorCommand::Disconnect);
        Ok(())
    }
}

impl Motor for ScriptedMotor {
    fn set_torque(&mut self, enabled: bool) -> Result<(), BoxError> {
        self.log.push(MotorCommand::Torque(enabled));
        Ok(())
    }

    fn set_speed(&mut self, speed: u16) -> Result<(), BoxError> {
        self.log.push(MotorCommand::Speed(speed));
        Ok(())
    }

    fn set_position(&mut self, goal: i32) -> Result<(), BoxError> {
        self.log.push(MotorCommand::Goal(goal));
        Ok(())
    }

    fn position(&mut self) -> Result<i32, BoxError> {
        self.reads += 1;
        if self.fail_after.is_some_and(|n| self.reads > n) {
            return Err(Box::new(std::io::Error::other("motor link down")));
        }
        if let Some(p) = self.positions.pop_front() {
            self.current = p;
        }
        Ok(self.current)
    }

    fn ping(&mut self) -> bool {
        self.answers_ping
    }
}

/// One scripted load-cell reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Weight(f64),
    Malformed(String),
    LinkDown,
}

/// A load cell that replays a list of replies, then reads zero.
#[derive(Debug, Default)]
pub struct ScriptedLoadCell {
    replies: VecDeque<Reading>,
    tares: Arc<AtomicUsize>,
}

impl ScriptedLoadCell {
    pub fn new(replies: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            tares: Arc::default(),
        }
    }

    pub fn weights(weights: impl IntoIterator<Item = f64>) -> Self {
        Self::new(weights.into_iter().map(Reading::Weight))
    }

    /// Shared counter of tare commands received.
    pub fn tare_count(&self) -> Arc<AtomicUsize> {
        self.tares.clone()
    }
}

impl Device for ScriptedLoadCell {}

impl LoadCell for ScriptedLoadCell {
    fn tare(&mut self) -> Result<(), BoxError> {
        self.tares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_weight(&mut self) -> Result<f64, BoxError> {
        match self.replies.pop_front().unwrap_or(Reading::Weight(0.0)) {
            Reading::Weight(w) => Ok(w),
            Reading::Malformed(raw) => Err(Box::new(MalformedReading(raw))),
            Reading::LinkDown => Err(Box::new(std::io::Error::other("load cell link down"))),
        }
    }
}
