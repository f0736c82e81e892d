//! Serial-port plumbing for the real rig.
use std::path::Path;
use std::time::Duration;

use dynamixel_driver::DynamixelDriver;
use serialport::SerialPort;
use tracing::{info, warn};

use crate::dynamixel::DynamixelMotor;
use crate::error::{HwError, Result};
use crate::loadstar::LoadstarCell;

pub type Port = Box<dyn SerialPort>;
pub type SerialDynamixel = DynamixelMotor<DynamixelDriver, Port>;

fn open_error(port: &str, reason: impl ToString) -> HwError {
    HwError::Open {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

/// Names of the serial ports the OS currently reports.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| open_error("*", e))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Fail early, naming the port, when it is neither a device path nor a port
/// the OS lists. If enumeration itself fails the open is left to decide.
pub fn ensure_port_exists(port: &str) -> Result<()> {
    if Path::new(port).exists() {
        return Ok(());
    }
    match list_ports() {
        Ok(ports) if ports.iter().any(|p| p == port) => Ok(()),
        Ok(ports) => {
            warn!(port, available = ?ports, "serial port not found");
            Err(open_error(port, "port not found"))
        }
        Err(e) => {
            warn!(error = %e, "could not enumerate serial ports");
            Ok(())
        }
    }
}

pub fn open_serial(port: &str, baud_rate: u32, timeout: Duration) -> Result<Port> {
    ensure_port_exists(port)?;
    serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| open_error(port, e))
}

/// Open without claiming the port exclusively, so the servo bus library can
/// open the same device afterwards.
fn open_shared(port: &str, baud_rate: u32, timeout: Duration) -> Result<Port> {
    let builder = serialport::new(port, baud_rate).timeout(timeout);
    #[cfg(unix)]
    {
        let mut tty = builder.open_native().map_err(|e| open_error(port, e))?;
        tty.set_exclusive(false).map_err(|e| open_error(port, e))?;
        Ok(Box::new(tty))
    }
    #[cfg(not(unix))]
    {
        builder.open().map_err(|e| open_error(port, e))
    }
}

pub fn connect_dynamixel(port: &str, baud_rate: u32, id: u8, timeout: Duration) -> Result<SerialDynamixel> {
    ensure_port_exists(port)?;
    let speed_port = open_shared(port, baud_rate, timeout)?;
    let bus = DynamixelDriver::with_baud_rate(port, baud_rate).map_err(|e| open_error(port, e))?;
    info!(port, baud_rate, id, "dynamixel bus open");
    Ok(DynamixelMotor::new(bus, speed_port, id))
}

pub fn connect_loadstar(port: &str, baud_rate: u32, timeout: Duration) -> Result<LoadstarCell<Port>> {
    let link = open_serial(port, baud_rate, timeout)?;
    info!(port, baud_rate, "load cell port open");
    Ok(LoadstarCell::new(link))
}
