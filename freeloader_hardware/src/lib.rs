//! Device drivers for the Freeloader rig.
//!
//! The simulated rig is always available. The Loadstar driver and the
//! Dynamixel speed write are generic over `Read + Write`; opening real serial
//! ports and the servo bus library need the `hardware` feature.
pub mod dynamixel;
pub mod error;
pub mod loadstar;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod util;

pub use dynamixel::DynamixelMotor;
pub use error::HwError;
pub use loadstar::LoadstarCell;
pub use sim::{SimParams, SimRig, SimulatedLoadCell, SimulatedMotor};
