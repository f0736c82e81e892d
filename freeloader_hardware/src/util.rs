use std::io::Read;

use crate::error::{HwError, Result};

/// Fill `buf` from the port. Serial timeouts surface as `HwError::Timeout`,
/// a closed stream as `HwError::Closed`.
pub fn read_exact<R: Read + ?Sized>(port: &mut R, buf: &mut [u8]) -> Result<()> {
    port.read_exact(buf).map_err(HwError::from)
}

/// Read one CR- or LF-terminated line, skipping leading terminators left over
/// from a previous reply. Fails with `Packet` once `max_len` bytes arrive
/// without a terminator.
pub fn read_line<R: Read + ?Sized>(port: &mut R, max_len: usize) -> Result<String> {
    let mut line = Vec::with_capacity(16);
    let mut byte = [0u8; 1];
    loop {
        read_exact(port, &mut byte)?;
        match byte[0] {
            b'\r' | b'\n' if line.is_empty() => continue,
            b'\r' | b'\n' => break,
            b => {
                if line.len() >= max_len {
                    return Err(HwError::Packet(format!(
                        "no line terminator within {max_len} bytes"
                    )));
                }
                line.push(b);
            }
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
