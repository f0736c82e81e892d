#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the Freeloader rig.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section except `[motor]` and `[load_cell]` has defaults, so a
//!   minimal file only names the two serial ports.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MotorPort {
    pub port: String,
    #[serde(default = "default_motor_baud")]
    pub baud_rate: u32,
    /// Servo bus id.
    #[serde(default = "default_motor_id")]
    pub id: u8,
    /// Per-transaction reply timeout.
    #[serde(default = "default_motor_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_motor_baud() -> u32 {
    57_600
}
fn default_motor_id() -> u8 {
    1
}
fn default_motor_timeout_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoadCellPort {
    pub port: String,
    #[serde(default = "default_cell_baud")]
    pub baud_rate: u32,
    /// Max time to wait for a weight reply.
    #[serde(default = "default_cell_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause after a tare command before the next reading is trusted.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    200
}
fn default_cell_baud() -> u32 {
    9_600
}
fn default_cell_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Motion {
    /// Moving-speed register value while pulling.
    pub speed: u16,
    pub target_position: i32,
    /// Advance the goal this many ticks per iteration instead of a single
    /// closed-loop move to `target_position`.
    pub step_increment: Option<i32>,
    pub home_position: i32,
    pub home_speed: u16,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            speed: 10,
            target_position: 1020,
            step_increment: None,
            home_position: 0,
            home_speed: 1023,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Sampling {
    pub interval_ms: u64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    /// Disable torque and stop once force exceeds this.
    pub max_force: f64,
    /// Stop once the encoder reaches this position.
    pub travel_limit: i32,
    /// Break when a reading falls below this fraction of the previous one
    /// (0 disables break detection).
    pub break_ratio: f64,
    /// Ignore drops from readings at or below this force.
    pub break_floor: f64,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            max_force: 200.0,
            travel_limit: 1000,
            break_ratio: 0.1,
            break_floor: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Export {
    /// First metadata row written into every data file.
    pub software_version: String,
    /// Default directory for streamed run files.
    pub output_dir: Option<String>,
}

impl Default for Export {
    fn default() -> Self {
        Self {
            software_version: format!("freeloader {}", env!("CARGO_PKG_VERSION")),
            output_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub motor: MotorPort,
    pub load_cell: LoadCellPort,
    #[serde(default)]
    pub motion: Motion,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub export: Export,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

const MAX_SPEED: u16 = 2047;

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Ports
        if self.motor.port.trim().is_empty() {
            eyre::bail!("motor.port must not be empty");
        }
        if self.load_cell.port.trim().is_empty() {
            eyre::bail!("load_cell.port must not be empty");
        }
        if self.motor.baud_rate == 0 || self.load_cell.baud_rate == 0 {
            eyre::bail!("baud_rate must be > 0");
        }
        if self.motor.id > 253 {
            eyre::bail!("motor.id must be in 0..=253");
        }
        if self.motor.timeout_ms == 0 {
            eyre::bail!("motor.timeout_ms must be >= 1");
        }
        if self.load_cell.read_timeout_ms == 0 {
            eyre::bail!("load_cell.read_timeout_ms must be >= 1");
        }

        // Motion
        if self.motion.speed == 0 || self.motion.speed > MAX_SPEED {
            eyre::bail!("motion.speed must be in 1..={MAX_SPEED}");
        }
        if self.motion.home_speed > MAX_SPEED {
            eyre::bail!("motion.home_speed must be <= {MAX_SPEED}");
        }
        if self.motion.target_position < 0 || self.motion.home_position < 0 {
            eyre::bail!("motion positions must be >= 0");
        }
        if let Some(inc) = self.motion.step_increment {
            if inc <= 0 {
                eyre::bail!("motion.step_increment must be > 0");
            }
        }

        // Sampling
        if self.sampling.interval_ms > 60_000 {
            eyre::bail!("sampling.interval_ms is unreasonably large (>60s)");
        }

        // Safety
        if !(self.safety.max_force.is_finite() && self.safety.max_force > 0.0) {
            eyre::bail!("safety.max_force must be > 0");
        }
        if !(0.0..1.0).contains(&self.safety.break_ratio) {
            eyre::bail!("safety.break_ratio must be in [0.0, 1.0)");
        }
        if !(self.safety.break_floor.is_finite() && self.safety.break_floor >= 0.0) {
            eyre::bail!("safety.break_floor must be >= 0");
        }
        if self.safety.travel_limit <= self.motion.home_position {
            eyre::bail!("safety.travel_limit must be beyond motion.home_position");
        }
        // The motor parks at the target; a limit past it is never reached.
        if self.safety.travel_limit > self.motion.target_position {
            eyre::bail!("safety.travel_limit must not exceed motion.target_position");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly");
            }
        }

        Ok(())
    }
}
