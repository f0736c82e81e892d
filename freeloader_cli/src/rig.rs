//! Device assembly: simulated or serial-port rig from config.

use freeloader_config::Config;
use freeloader_core::Rig;
use freeloader_hardware::{SimParams, SimRig};
use freeloader_traits::{LoadCell, Motor};

pub type DynMotor = Box<dyn Motor + Send>;
pub type DynLoadCell = Box<dyn LoadCell + Send>;
pub type CliRig = Rig<DynMotor, DynLoadCell>;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable simulator setting");
            None
        }
    }
}

/// Simulator knobs, overridable through `FREELOADER_SIM_*` variables.
pub fn sim_params_from_env() -> SimParams {
    let mut p = SimParams::default();
    if let Some(v) = env_parse("FREELOADER_SIM_STEP") {
        p.ticks_per_poll = v;
    }
    if let Some(v) = env_parse("FREELOADER_SIM_STIFFNESS") {
        p.stiffness = v;
    }
    if let Ok(v) = std::env::var("FREELOADER_SIM_BREAK_AT") {
        p.break_at = if v.trim().eq_ignore_ascii_case("none") {
            None
        } else {
            env_parse("FREELOADER_SIM_BREAK_AT").or(p.break_at)
        };
    }
    if let Some(v) = env_parse("FREELOADER_SIM_FAIL_AT") {
        p.fail_after_reads = Some(v);
    }
    if let Some(v) = env_parse("FREELOADER_SIM_GARBLE_EVERY") {
        p.garble_every = Some(v);
    }
    p
}

fn connect_sim(rig: &mut CliRig) -> eyre::Result<()> {
    let params = sim_params_from_env();
    tracing::info!(?params, "using simulated rig");
    let sim = SimRig::new(params);
    rig.connect_motor(|| Ok(Box::new(sim.motor()) as DynMotor))?;
    rig.connect_load_cell(|| Ok(Box::new(sim.load_cell()) as DynLoadCell))?;
    Ok(())
}

#[cfg(feature = "hardware")]
fn connect_serial(rig: &mut CliRig, cfg: &Config) -> eyre::Result<()> {
    use freeloader_hardware::serial::{connect_dynamixel, connect_loadstar};
    use std::time::Duration;

    let m = &cfg.motor;
    rig.connect_motor(|| {
        connect_dynamixel(&m.port, m.baud_rate, m.id, Duration::from_millis(m.timeout_ms))
            .map(|d| Box::new(d) as DynMotor)
            .map_err(Into::into)
    })?;
    let l = &cfg.load_cell;
    rig.connect_load_cell(|| {
        connect_loadstar(&l.port, l.baud_rate, Duration::from_millis(l.read_timeout_ms))
            .map(|d| Box::new(d) as DynLoadCell)
            .map_err(Into::into)
    })?;
    Ok(())
}

/// Connect both devices. On failure the partially connected rig is released.
pub fn connect(cfg: &Config, sim: bool) -> eyre::Result<CliRig> {
    let mut rig = CliRig::new();
    #[cfg(feature = "hardware")]
    let res = if sim {
        connect_sim(&mut rig)
    } else {
        connect_serial(&mut rig, cfg)
    };
    #[cfg(not(feature = "hardware"))]
    let res = {
        let _ = (cfg, sim);
        connect_sim(&mut rig)
    };
    if let Err(e) = res {
        if let Err(d) = rig.disconnect_all() {
            tracing::warn!(error = %d, "cleanup after failed connect");
        }
        return Err(e);
    }
    Ok(rig)
}
