//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Set while an acquisition thread is running; Ctrl-C stops the run instead
/// of the process.
pub static RUN_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "freeloader", version, about = "Freeloader tensile rig CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/freeloader.toml")]
    pub config: PathBuf,

    /// Structured output: JSON log lines, JSON summary and JSON errors
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Use the simulated rig even when built with hardware support
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Directory for the streamed data file (default: export.output_dir or ".")
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Operator initials recorded in the data file
    #[arg(long)]
    pub operator: Option<String>,
    #[arg(long)]
    pub sample_name: Option<String>,
    #[arg(long = "material", value_name = "CODE")]
    pub material: Option<String>,
    #[arg(long)]
    pub lot: Option<String>,
    /// e.g. Monofilament, "ASTM Dog Bone", "Slit Film Yarn"
    #[arg(long)]
    pub sample_type: Option<String>,
    /// Override safety.max_force
    #[arg(long, value_name = "FORCE")]
    pub max_force: Option<f64>,
    /// Override safety.travel_limit
    #[arg(long, value_name = "POSITION")]
    pub travel_limit: Option<i32>,
    /// Also write the finished run to this CSV file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct JogArgs {
    /// Goal position in encoder ticks, within 0..=safety.travel_limit
    #[arg(long, value_name = "POSITION", allow_negative_numbers = true)]
    pub to: i32,
    /// Moving speed (default: motion.home_speed)
    #[arg(long)]
    pub speed: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull a sample until it breaks, overloads or reaches the travel limit
    Run(RunArgs),
    /// Zero the load cell
    Tare,
    /// Move the motor to a position, e.g. to mount the next sample
    Jog(JogArgs),
    /// Interactive numbered menu
    Menu,
    /// Connect both devices, ping the motor and read one weight
    SelfCheck,
}
