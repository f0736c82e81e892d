//! Loadstar-style load-cell interface: ASCII commands terminated by CR,
//! replies as a single numeric line.
use std::io::{Read, Write};

use freeloader_traits::{BoxError, Device, LoadCell, MalformedReading};
use tracing::{debug, trace};

use crate::error::Result;
use crate::util::read_line;

pub const CMD_WEIGH: &str = "W";
pub const CMD_TARE: &str = "TARE";
const MAX_REPLY_LEN: usize = 64;

pub struct LoadstarCell<P> {
    port: P,
}

impl<P: Read + Write> LoadstarCell<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn command(&mut self, cmd: &str) -> Result<()> {
        self.port.write_all(cmd.as_bytes())?;
        self.port.write_all(b"\r")?;
        self.port.flush()?;
        Ok(())
    }
}

/// Parse one weight reply. Non-finite values count as malformed.
pub fn parse_weight(reply: &str) -> std::result::Result<f64, MalformedReading> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .ok_or_else(|| MalformedReading(reply.trim().to_string()))
}

impl<P: Read + Write> Device for LoadstarCell<P> {}

impl<P: Read + Write> LoadCell for LoadstarCell<P> {
    fn tare(&mut self) -> std::result::Result<(), BoxError> {
        self.command(CMD_TARE)?;
        debug!("load cell tare sent");
        Ok(())
    }

    fn read_weight(&mut self) -> std::result::Result<f64, BoxError> {
        self.command(CMD_WEIGH)?;
        let reply = read_line(&mut self.port, MAX_REPLY_LEN)?;
        trace!(reply = %reply, "load cell reply");
        Ok(parse_weight(&reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    struct Duplex {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn cell(reply: &[u8]) -> LoadstarCell<Duplex> {
        LoadstarCell::new(Duplex {
            rx: Cursor::new(reply.to_vec()),
            tx: Vec::new(),
        })
    }

    #[rstest]
    #[case(" 12.50\r\n", 12.5)]
    #[case("-0.031\r", -0.031)]
    #[case("7\n", 7.0)]
    fn numeric_replies_parse(#[case] reply: &str, #[case] expected: f64) {
        let mut c = cell(reply.as_bytes());
        assert_eq!(c.read_weight().unwrap(), expected);
        assert_eq!(c.into_inner().tx, b"W\r");
    }

    #[rstest]
    #[case("ERR\r\n")]
    #[case("nan\r\n")]
    #[case("12.5 lb\r\n")]
    fn garbage_is_malformed(#[case] reply: &str) {
        let mut c = cell(reply.as_bytes());
        let err = c.read_weight().unwrap_err();
        assert!(err.downcast_ref::<MalformedReading>().is_some());
    }

    #[test]
    fn missing_reply_is_a_link_error() {
        let mut c = cell(b"");
        let err = c.read_weight().unwrap_err();
        assert!(err.downcast_ref::<MalformedReading>().is_none());
    }

    #[test]
    fn tare_sends_command_without_waiting() {
        let mut c = cell(b"");
        c.tare().unwrap();
        c.tare().unwrap();
        assert_eq!(c.into_inner().tx, b"TARE\rTARE\r");
    }
}
