#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware-agnostic acquisition core for the Freeloader tensile rig.
//!
//! All device access goes through `freeloader_traits::Motor` and
//! `freeloader_traits::LoadCell`. The crate owns the run lifecycle and the
//! data it produces.
//!
//! ## Architecture
//!
//! - **Sessions**: guarded online/offline device slots and the `Rig` context (`session`)
//! - **Acquisition**: the polling loop and its builder (`acquisition`)
//! - **Stop conditions**: `StopToken`, `StopReason` and the threshold checks (`stop`)
//! - **Runners**: blocking `run` and the threaded `BackgroundRun` (`runner`)
//! - **Export**: CSV files and the streaming sink (`export`)

pub mod acquisition;
pub mod config;
pub mod conversions;
pub mod error;
pub mod export;
pub mod hw_error;
pub mod mocks;
pub mod runner;
pub mod sample;
pub mod session;
pub mod status;
pub mod stop;
pub mod util;

pub use acquisition::{Acquisition, AcquisitionBuilder, RunReport};
pub use config::{MotionCfg, SamplingCfg, StopPolicy};
pub use error::{BuildError, FreeloaderError, Report, Result};
pub use export::{
    CsvSampleSink, RunFile, RunMetadata, SampleSink, create_stream_file, load_csv, read_csv,
    save_csv, write_csv,
};
pub use runner::{BackgroundRun, RunOutcome};
pub use sample::{RunLog, Sample};
pub use session::{DeviceSession, Rig};
pub use status::{AcquisitionStatus, RunEvent};
pub use stop::{StopReason, StopToken};
