//! Manual motor positioning outside of a run.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use freeloader_config::Config;
use freeloader_core::FreeloaderError;

use crate::cli::RUN_ACTIVE;
use crate::rig::CliRig;

/// Ticks from the goal that count as arrived.
const ARRIVED_WITHIN: i32 = 3;
const JOG_TIMEOUT: Duration = Duration::from_secs(10);

fn ensure_idle(run_active: &AtomicBool) -> eyre::Result<()> {
    if run_active.load(Ordering::SeqCst) {
        return Err(eyre::Report::new(FreeloaderError::State(
            "cannot jog while a run is active".into(),
        )));
    }
    Ok(())
}

/// Check a jog request against the configured travel window and resolve the
/// speed (default `motion.home_speed`).
pub fn resolve(cfg: &Config, to: i32, speed: Option<u16>) -> eyre::Result<u16> {
    if to < 0 || to > cfg.safety.travel_limit {
        eyre::bail!(
            "invalid configuration: jog target {to} is outside 0..={} (safety.travel_limit)",
            cfg.safety.travel_limit
        );
    }
    let speed = speed.unwrap_or(cfg.motion.home_speed);
    if speed == 0 {
        eyre::bail!("invalid configuration: jog speed must be > 0");
    }
    Ok(speed)
}

/// Send the motor to `to` and follow it until it arrives or the wait runs
/// out. Torque stays on afterwards so the position holds.
pub fn jog<W: Write>(
    rig: &mut CliRig,
    cfg: &Config,
    to: i32,
    speed: Option<u16>,
    json: bool,
    out: &mut W,
) -> eyre::Result<i32> {
    ensure_idle(&RUN_ACTIVE)?;
    let speed = resolve(cfg, to, speed)?;
    rig.jog(to, speed)?;

    let poll = Duration::from_millis(cfg.sampling.interval_ms.max(10));
    let deadline = Instant::now() + JOG_TIMEOUT;
    let (position, arrived) = loop {
        let pos = rig.motor_position()?;
        if (pos - to).abs() <= ARRIVED_WITHIN {
            break (pos, true);
        }
        if Instant::now() >= deadline {
            tracing::warn!(position = pos, goal = to, "jog did not arrive in time");
            break (pos, false);
        }
        std::thread::sleep(poll);
    };

    if json {
        writeln!(
            out,
            "{}",
            serde_json::json!({ "position": position, "goal": to, "arrived": arrived })
        )?;
    } else if arrived {
        writeln!(out, "Motor at position {position}")?;
    } else {
        writeln!(out, "Motor still moving: at {position}, goal {to}")?;
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cfg() -> Config {
        freeloader_config::load_toml(
            "[motor]\nport = \"/dev/null\"\n[load_cell]\nport = \"/dev/null\"\n[sampling]\ninterval_ms = 0\n",
        )
        .unwrap()
    }

    #[rstest]
    #[case(-1, None)]
    #[case(1001, None)]
    #[case(100, Some(0))]
    fn rejected_requests(#[case] to: i32, #[case] speed: Option<u16>) {
        assert!(resolve(&cfg(), to, speed).is_err());
    }

    #[test]
    fn speed_defaults_to_home_speed() {
        let c = cfg();
        assert_eq!(resolve(&c, c.safety.travel_limit, None).unwrap(), c.motion.home_speed);
    }

    #[test]
    fn refused_while_a_run_is_active() {
        let active = AtomicBool::new(true);
        let err = ensure_idle(&active).unwrap_err();
        assert!(matches!(err.downcast_ref::<FreeloaderError>(), Some(FreeloaderError::State(_))));
        active.store(false, Ordering::SeqCst);
        assert!(ensure_idle(&active).is_ok());
    }
}
