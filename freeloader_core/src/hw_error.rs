//! Maps `Box<dyn Error>` from trait boundaries to typed `FreeloaderError`.
//!
//! The traits in `freeloader_traits` return `Box<dyn Error + Send + Sync>`.
//! A `MalformedReading` is a parse failure the loop can skip past; anything
//! else is a broken exchange with the device. With the `hardware-errors`
//! feature, `freeloader_hardware::HwError` is downcast for a sharper message.

use crate::error::FreeloaderError;
use freeloader_traits::MalformedReading;

/// Classify an error raised by a device call during `op`.
pub fn map_hw_error(op: &str, e: &(dyn std::error::Error + 'static)) -> FreeloaderError {
    if let Some(m) = e.downcast_ref::<MalformedReading>() {
        return FreeloaderError::Parse(m.0.clone());
    }

    #[cfg(feature = "hardware-errors")]
    {
        use freeloader_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Open { .. } => FreeloaderError::Connection(format!("{op}: {hw}")),
                HwError::Timeout => {
                    FreeloaderError::Communication(format!("{op}: no reply from device"))
                }
                other => FreeloaderError::Communication(format!("{op}: {other}")),
            };
        }
    }

    FreeloaderError::Communication(format!("{op}: {e}"))
}

/// Classify an error raised while opening or verifying a device.
pub fn map_connect_error(device: &str, e: &(dyn std::error::Error + 'static)) -> FreeloaderError {
    FreeloaderError::Connection(format!("{device}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_reading_is_a_parse_error() {
        let e = MalformedReading("abc".into());
        assert_eq!(
            map_hw_error("read weight", &e),
            FreeloaderError::Parse("abc".into())
        );
    }

    #[test]
    fn unknown_errors_name_the_operation() {
        let e = std::io::Error::other("cable pulled");
        match map_hw_error("read position", &e) {
            FreeloaderError::Communication(msg) => {
                assert!(msg.starts_with("read position"));
                assert!(msg.contains("cable pulled"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_timeout_maps_to_communication() {
        let e = freeloader_hardware::HwError::Timeout;
        assert!(matches!(
            map_hw_error("ping", &e),
            FreeloaderError::Communication(_)
        ));
    }
}
