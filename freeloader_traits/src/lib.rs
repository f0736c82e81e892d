//! Device contracts shared by the acquisition core and the drivers.
//!
//! Errors cross these boundaries as `Box<dyn Error + Send + Sync>` so drivers
//! stay free to use their own error types. The one distinction the core needs
//! (an unparsable load-cell reply versus a broken link) is carried by the
//! `MalformedReading` marker type below.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Lifecycle shared by every device behind a session.
pub trait Device {
    /// Release the device. The default does nothing beyond dropping the handle.
    fn disconnect(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Position-controlled servo that pulls the sample.
pub trait Motor: Device {
    fn set_torque(&mut self, enabled: bool) -> Result<(), BoxError>;
    fn set_speed(&mut self, speed: u16) -> Result<(), BoxError>;
    fn set_position(&mut self, position: i32) -> Result<(), BoxError>;
    /// Present encoder position.
    fn position(&mut self) -> Result<i32, BoxError>;
    fn ping(&mut self) -> bool;
}

/// Force transducer read over a request/response protocol.
pub trait LoadCell: Device {
    fn tare(&mut self) -> Result<(), BoxError>;
    /// Current force. A reply that is not a number must be reported as
    /// [`MalformedReading`] so callers can skip it instead of aborting.
    fn read_weight(&mut self) -> Result<f64, BoxError>;
}

/// The device answered, but the answer could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReading(pub String);

impl std::fmt::Display for MalformedReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed reading: {:?}", self.0)
    }
}

impl std::error::Error for MalformedReading {}

impl<T: Device + ?Sized> Device for Box<T> {
    fn disconnect(&mut self) -> Result<(), BoxError> {
        (**self).disconnect()
    }
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn set_torque(&mut self, enabled: bool) -> Result<(), BoxError> {
        (**self).set_torque(enabled)
    }
    fn set_speed(&mut self, speed: u16) -> Result<(), BoxError> {
        (**self).set_speed(speed)
    }
    fn set_position(&mut self, position: i32) -> Result<(), BoxError> {
        (**self).set_position(position)
    }
    fn position(&mut self) -> Result<i32, BoxError> {
        (**self).position()
    }
    fn ping(&mut self) -> bool {
        (**self).ping()
    }
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn tare(&mut self) -> Result<(), BoxError> {
        (**self).tare()
    }
    fn read_weight(&mut self) -> Result<f64, BoxError> {
        (**self).read_weight()
    }
}
