//! Device sessions and the rig context.
//!
//! A `DeviceSession` is a guarded online/offline slot around one driver.
//! `Rig` owns the motor and load-cell sessions and is moved into an
//! `Acquisition` for the length of a run.

use freeloader_traits::{BoxError, Device, LoadCell, Motor};

use crate::error::{FreeloaderError, Result};
use crate::hw_error::{map_connect_error, map_hw_error};

/// Online flag plus connection handle for a single device.
#[derive(Debug)]
pub struct DeviceSession<D> {
    name: &'static str,
    device: Option<D>,
}

impl<D: Device> DeviceSession<D> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, device: None }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn is_online(&self) -> bool {
        self.device.is_some()
    }

    /// Open the device with `open` and mark the session online.
    ///
    /// Rejected while already online. On failure the session stays offline.
    pub fn connect<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<D, BoxError>,
    {
        if self.is_online() {
            return Err(eyre::Report::new(FreeloaderError::State(format!(
                "{} is already connected",
                self.name
            ))));
        }
        match open() {
            Ok(d) => {
                self.device = Some(d);
                tracing::info!(device = self.name, "connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(device = self.name, error = %e, "connect failed");
                Err(eyre::Report::new(map_connect_error(self.name, &*e)))
            }
        }
    }

    pub fn device_mut(&mut self) -> Result<&mut D> {
        let name = self.name;
        self.device.as_mut().ok_or_else(|| {
            eyre::Report::new(FreeloaderError::State(format!("{name} is not connected")))
        })
    }

    /// Release the device. A no-op when already offline.
    ///
    /// The session goes offline even if the driver reports an error.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(mut d) = self.device.take() else {
            tracing::debug!(device = self.name, "disconnect while offline");
            return Ok(());
        };
        tracing::info!(device = self.name, "disconnected");
        d.disconnect()
            .map_err(|e| eyre::Report::new(map_hw_error("disconnect", &*e)))
    }

    /// Drop the handle after a fatal communication error, without talking
    /// to the device again.
    pub fn invalidate(&mut self) {
        if self.device.take().is_some() {
            tracing::warn!(device = self.name, "session invalidated");
        }
    }
}

/// Both device sessions of the tensile rig.
#[derive(Debug)]
pub struct Rig<M, L> {
    pub(crate) motor: DeviceSession<M>,
    pub(crate) load_cell: DeviceSession<L>,
}

impl<M: Motor, L: LoadCell> Default for Rig<M, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Motor, L: LoadCell> Rig<M, L> {
    pub const fn new() -> Self {
        Self {
            motor: DeviceSession::new("motor"),
            load_cell: DeviceSession::new("load cell"),
        }
    }

    /// Open the motor, check it answers a ping, then enable torque.
    pub fn connect_motor<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<M, BoxError>,
    {
        self.motor.connect(|| {
            let mut m = open()?;
            if !m.ping() {
                return Err("motor did not answer ping".into());
            }
            m.set_torque(true)?;
            Ok(m)
        })
    }

    pub fn connect_load_cell<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<L, BoxError>,
    {
        self.load_cell.connect(open)
    }

    pub const fn motor(&self) -> &DeviceSession<M> {
        &self.motor
    }

    pub const fn load_cell(&self) -> &DeviceSession<L> {
        &self.load_cell
    }

    pub const fn is_ready(&self) -> bool {
        self.motor.is_online() && self.load_cell.is_online()
    }

    /// Zero the load cell. Repeating it is harmless.
    pub fn tare(&mut self) -> Result<()> {
        let res = self.load_cell.device_mut()?.tare();
        res.map_err(|e| {
            let err = map_hw_error("tare", &*e);
            if matches!(err, FreeloaderError::Communication(_)) {
                self.load_cell.invalidate();
            }
            eyre::Report::new(err)
        })?;
        tracing::info!("load cell tared");
        Ok(())
    }

    /// One weight reading outside of a run, for diagnostics.
    pub fn read_weight(&mut self) -> Result<f64> {
        let res = self.load_cell.device_mut()?.read_weight();
        res.map_err(|e| eyre::Report::new(map_hw_error("read weight", &*e)))
    }

    /// Command a manual move outside of a run (torque on, speed, goal).
    /// Returns as soon as the goal is sent; poll `motor_position` to follow it.
    pub fn jog(&mut self, position: i32, speed: u16) -> Result<()> {
        let m = self.motor.device_mut()?;
        let res = m
            .set_torque(true)
            .and_then(|()| m.set_speed(speed))
            .and_then(|()| m.set_position(position));
        res.map_err(|e| self.motor_failure("jog", &*e))?;
        tracing::info!(position, speed, "jog");
        Ok(())
    }

    pub fn motor_position(&mut self) -> Result<i32> {
        let res = self.motor.device_mut()?.position();
        res.map_err(|e| self.motor_failure("read position", &*e))
    }

    fn motor_failure(&mut self, op: &str, e: &(dyn std::error::Error + 'static)) -> eyre::Report {
        let err = map_hw_error(op, e);
        if matches!(err, FreeloaderError::Communication(_)) {
            self.motor.invalidate();
        }
        eyre::Report::new(err)
    }

    pub fn ping_motor(&mut self) -> Result<bool> {
        Ok(self.motor.device_mut()?.ping())
    }

    /// Disconnect both devices, reporting the first failure.
    pub fn disconnect_all(&mut self) -> Result<()> {
        let m = self.motor.disconnect();
        let l = self.load_cell.disconnect();
        m.and(l)
    }
}
