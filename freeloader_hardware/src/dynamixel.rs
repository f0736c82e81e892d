//! Dynamixel MX servo as a `Motor`.
//!
//! Ping, torque, goal and present position go through the `dynamixel_driver`
//! crate. That crate has no moving-speed call, so the speed register is
//! written here as a single protocol 1.0 WRITE on a second handle to the
//! same bus.
use std::io::{Read, Write};

use freeloader_traits::{BoxError, Device, Motor};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::read_exact;

const HEADER: [u8; 2] = [0xFF, 0xFF];
const WRITE_DATA: u8 = 0x03;
const MOVING_SPEED: u8 = 32;

/// Largest goal position the MX encoder accepts.
pub const MAX_POSITION: u16 = 4095;
/// Moving-speed register range (bit 10 selects direction in wheel mode).
pub const MAX_SPEED: u16 = 2047;

/// Servo calls the motor needs from the bus library.
pub trait ServoBus {
    fn ping(&mut self, id: u8) -> bool;
    fn write_torque(&mut self, id: u8, enabled: bool) -> Result<()>;
    fn write_position(&mut self, id: u8, goal: u16) -> Result<()>;
    fn read_position(&mut self, id: u8) -> Result<u16>;
}

#[cfg(feature = "hardware")]
impl ServoBus for dynamixel_driver::DynamixelDriver {
    fn ping(&mut self, id: u8) -> bool {
        dynamixel_driver::DynamixelDriver::ping(self, id).is_ok()
    }

    fn write_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        dynamixel_driver::DynamixelDriver::write_torque(self, id, enabled)
            .map_err(|e| HwError::Bus(e.to_string()))
    }

    fn write_position(&mut self, id: u8, goal: u16) -> Result<()> {
        dynamixel_driver::DynamixelDriver::write_position(self, id, goal.into())
            .map_err(|e| HwError::Bus(e.to_string()))
    }

    fn read_position(&mut self, id: u8) -> Result<u16> {
        let raw = dynamixel_driver::DynamixelDriver::read_position(self, id)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        u16::try_from(raw).map_err(|_| HwError::OutOfRange("present position".into()))
    }
}

fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Write the moving-speed register of servo `id` and wait for its status
/// reply (`FF FF id 02 err chk`).
pub fn write_moving_speed<P: Read + Write + ?Sized>(port: &mut P, id: u8, speed: u16) -> Result<()> {
    let [lo, hi] = speed.to_le_bytes();
    let body = [id, 5, WRITE_DATA, MOVING_SPEED, lo, hi];
    let mut pkt = Vec::with_capacity(body.len() + 3);
    pkt.extend_from_slice(&HEADER);
    pkt.extend_from_slice(&body);
    pkt.push(checksum(&body));
    port.write_all(&pkt)?;
    port.flush()?;

    let mut reply = [0u8; 6];
    read_exact(port, &mut reply)?;
    let [h0, h1, rid, len, flags, actual] = reply;
    if [h0, h1] != HEADER || len != 2 {
        return Err(HwError::Packet(format!("unexpected status reply {reply:02x?}")));
    }
    let expected = checksum(&[rid, len, flags]);
    if expected != actual {
        return Err(HwError::Checksum { expected, actual });
    }
    if rid != id {
        return Err(HwError::Packet(format!("reply from id {rid} while addressing {id}")));
    }
    if flags != 0 {
        return Err(HwError::Status { id, flags });
    }
    trace!(id, speed, "moving speed set");
    Ok(())
}

/// One servo: bus library for the common calls, raw port for speed.
pub struct DynamixelMotor<B, P> {
    bus: B,
    speed_port: P,
    id: u8,
}

impl<B: ServoBus, P: Read + Write> DynamixelMotor<B, P> {
    pub fn new(bus: B, speed_port: P, id: u8) -> Self {
        Self { bus, speed_port, id }
    }
}

impl<B: ServoBus, P: Read + Write> Device for DynamixelMotor<B, P> {
    fn disconnect(&mut self) -> std::result::Result<(), BoxError> {
        self.bus.write_torque(self.id, false)?;
        Ok(())
    }
}

impl<B: ServoBus, P: Read + Write> Motor for DynamixelMotor<B, P> {
    fn set_torque(&mut self, enabled: bool) -> std::result::Result<(), BoxError> {
        self.bus.write_torque(self.id, enabled)?;
        Ok(())
    }

    fn set_speed(&mut self, speed: u16) -> std::result::Result<(), BoxError> {
        if speed > MAX_SPEED {
            return Err(HwError::OutOfRange(format!("speed {speed} > {MAX_SPEED}")).into());
        }
        write_moving_speed(&mut self.speed_port, self.id, speed)?;
        Ok(())
    }

    fn set_position(&mut self, position: i32) -> std::result::Result<(), BoxError> {
        let goal = u16::try_from(position)
            .ok()
            .filter(|p| *p <= MAX_POSITION)
            .ok_or_else(|| HwError::OutOfRange(format!("position {position}")))?;
        self.bus.write_position(self.id, goal)?;
        Ok(())
    }

    fn position(&mut self) -> std::result::Result<i32, BoxError> {
        Ok(i32::from(self.bus.read_position(self.id)?))
    }

    fn ping(&mut self) -> bool {
        self.bus.ping(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Raw port: records what the host writes, replays canned bytes.
    #[derive(Default)]
    struct FakePort {
        replies: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl FakePort {
        fn status(&mut self, id: u8, flags: u8) {
            self.replies.extend(HEADER);
            self.replies.extend([id, 2, flags, checksum(&[id, 2, flags])]);
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.replies.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.replies.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Torque(u8, bool),
        Goal(u8, u16),
    }

    #[derive(Default)]
    struct FakeServo {
        calls: Vec<Call>,
        position: u16,
        offline: bool,
    }

    impl ServoBus for FakeServo {
        fn ping(&mut self, _id: u8) -> bool {
            !self.offline
        }
        fn write_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
            if self.offline {
                return Err(HwError::Bus("no status packet".into()));
            }
            self.calls.push(Call::Torque(id, enabled));
            Ok(())
        }
        fn write_position(&mut self, id: u8, goal: u16) -> Result<()> {
            self.calls.push(Call::Goal(id, goal));
            Ok(())
        }
        fn read_position(&mut self, _id: u8) -> Result<u16> {
            Ok(self.position)
        }
    }

    #[test]
    fn speed_packet_matches_reference_bytes() {
        let mut port = FakePort::default();
        port.status(1, 0);
        write_moving_speed(&mut port, 1, 0x0200).unwrap();
        // WRITE_DATA to id 1, address 32, value 0x0200; checksum 0xD4.
        assert_eq!(port.written, vec![0xFF, 0xFF, 0x01, 0x05, 0x03, 0x20, 0x00, 0x02, 0xD4]);
    }

    #[test]
    fn servo_error_flags_fail_the_speed_write() {
        let mut port = FakePort::default();
        port.status(1, 0x20); // overload flag
        let err = write_moving_speed(&mut port, 1, 100).unwrap_err();
        assert!(matches!(err, HwError::Status { id: 1, flags: 0x20 }));
    }

    #[test]
    fn corrupted_speed_reply_is_rejected() {
        let mut port = FakePort::default();
        port.status(1, 0);
        let last = port.replies.len() - 1;
        port.replies[last] ^= 0x55;
        let err = write_moving_speed(&mut port, 1, 100).unwrap_err();
        assert!(matches!(err, HwError::Checksum { .. }));
    }

    #[test]
    fn silent_port_reports_closed() {
        let mut port = FakePort::default();
        assert!(matches!(write_moving_speed(&mut port, 1, 100), Err(HwError::Closed)));
    }

    #[test]
    fn motor_calls_go_to_the_addressed_servo() {
        let mut motor = DynamixelMotor::new(
            FakeServo {
                position: 800,
                ..FakeServo::default()
            },
            FakePort::default(),
            4,
        );
        assert!(motor.ping());
        motor.set_torque(true).unwrap();
        motor.set_position(1000).unwrap();
        assert_eq!(motor.position().unwrap(), 800);
        motor.disconnect().unwrap();
        assert_eq!(
            motor.bus.calls,
            vec![Call::Torque(4, true), Call::Goal(4, 1000), Call::Torque(4, false)]
        );
    }

    #[test]
    fn out_of_range_commands_are_not_sent() {
        let mut motor = DynamixelMotor::new(FakeServo::default(), FakePort::default(), 1);
        assert!(motor.set_position(-5).is_err());
        assert!(motor.set_position(5000).is_err());
        assert!(motor.set_speed(MAX_SPEED + 1).is_err());
        assert!(motor.bus.calls.is_empty());
        assert!(motor.speed_port.written.is_empty());
    }

    #[test]
    fn lost_bus_is_a_bus_error() {
        let mut motor = DynamixelMotor::new(
            FakeServo {
                offline: true,
                ..FakeServo::default()
            },
            FakePort::default(),
            1,
        );
        assert!(!motor.ping());
        let err = motor.set_torque(true).unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Bus(_))));
    }
}
