//! `From` implementations bridging `freeloader_config` types to core types.

use std::time::Duration;

use crate::config::{MotionCfg, SamplingCfg, StopPolicy};

impl From<&freeloader_config::Motion> for MotionCfg {
    fn from(c: &freeloader_config::Motion) -> Self {
        Self {
            speed: c.speed,
            target_position: c.target_position,
            step_increment: c.step_increment,
            home_position: c.home_position,
            home_speed: c.home_speed,
        }
    }
}

impl From<&freeloader_config::Sampling> for SamplingCfg {
    fn from(c: &freeloader_config::Sampling) -> Self {
        Self {
            interval: Duration::from_millis(c.interval_ms),
        }
    }
}

impl From<&freeloader_config::Safety> for StopPolicy {
    fn from(c: &freeloader_config::Safety) -> Self {
        Self {
            max_force: c.max_force,
            travel_limit: c.travel_limit,
            break_ratio: c.break_ratio,
            break_floor: c.break_floor,
        }
    }
}

impl From<&freeloader_config::Export> for crate::export::RunMetadata {
    fn from(c: &freeloader_config::Export) -> Self {
        Self::new(c.software_version.clone())
    }
}
