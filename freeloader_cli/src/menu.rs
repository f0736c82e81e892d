//! Interactive numbered menu over any line input and text output.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use freeloader_config::Config;
use freeloader_core::StopToken;

use crate::cli::RunArgs;
use crate::error_fmt::humanize;
use crate::jog;
use crate::rig::{self, CliRig};
use crate::run::{default_output_dir, run_once};

const MENU: &str = "\nMenu:\n1. Start run\n2. Tare load cell\n3. Exit\n4. Jog motor";

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> std::io::Result<Option<String>> {
    write!(out, "{text}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Reconnect on demand after a failure dropped the rig.
fn ensure_rig<'a>(slot: &'a mut Option<CliRig>, cfg: &Config, sim: bool) -> eyre::Result<&'a mut CliRig> {
    if slot.as_ref().is_none_or(|r| !r.is_ready()) {
        if let Some(mut old) = slot.take() {
            if let Err(e) = old.disconnect_all() {
                tracing::warn!(error = %e, "disconnect before reconnect");
            }
        }
        *slot = Some(rig::connect(cfg, sim)?);
    }
    slot.as_mut()
        .ok_or_else(|| eyre::eyre!("rig unavailable"))
}

pub struct MenuContext<'a> {
    pub cfg: &'a Config,
    pub sim: bool,
    pub stop: StopToken,
    pub json: bool,
}

/// Loop until `3`, `q`, `esc` or end of input. Action failures are printed
/// and the menu carries on.
pub fn run_menu<R: BufRead, W: Write>(ctx: &MenuContext<'_>, mut input: R, mut out: W) -> eyre::Result<()> {
    let mut slot = Some(rig::connect(ctx.cfg, ctx.sim)?);
    writeln!(out, "Motor and load cell connected.")?;

    loop {
        writeln!(out, "{MENU}")?;
        let Some(choice) = prompt(&mut input, &mut out, "Enter your choice (1, 2, 3 or 4): ")? else {
            break;
        };
        match choice.to_ascii_lowercase().as_str() {
            "1" => {
                let default_dir = default_output_dir(ctx.cfg);
                let Some(dir) = prompt(
                    &mut input,
                    &mut out,
                    &format!("Output directory [{}]: ", default_dir.display()),
                )?
                else {
                    break;
                };
                let dir = dir.trim_matches('"');
                let dir = if dir.is_empty() {
                    default_dir
                } else {
                    PathBuf::from(dir)
                };
                let rig = match ensure_rig(&mut slot, ctx.cfg, ctx.sim) {
                    Ok(_) => slot.take(),
                    Err(e) => {
                        writeln!(out, "{}", humanize(&e))?;
                        continue;
                    }
                };
                let Some(rig) = rig else { continue };
                let (back, result) = run_once(
                    ctx.cfg,
                    rig,
                    &RunArgs::default(),
                    &dir,
                    &ctx.stop,
                    ctx.json,
                    &mut out,
                );
                slot = back;
                if let Err(e) = result {
                    tracing::error!(error = %e, "run failed");
                    writeln!(out, "{}", humanize(&e))?;
                }
            }
            "2" => {
                let res = ensure_rig(&mut slot, ctx.cfg, ctx.sim).and_then(CliRig::tare);
                match res {
                    Ok(()) => {
                        std::thread::sleep(Duration::from_millis(ctx.cfg.load_cell.settle_ms));
                        writeln!(out, "Load cell tared.")?;
                    }
                    Err(e) => writeln!(out, "{}", humanize(&e))?,
                }
            }
            "3" | "q" | "esc" | "exit" => break,
            "4" => {
                let Some(raw) = prompt(&mut input, &mut out, "Target position: ")? else {
                    break;
                };
                let Ok(to) = raw.parse::<i32>() else {
                    writeln!(out, "Invalid position {raw:?}.")?;
                    continue;
                };
                let res = ensure_rig(&mut slot, ctx.cfg, ctx.sim)
                    .and_then(|rig| jog::jog(rig, ctx.cfg, to, None, ctx.json, &mut out));
                if let Err(e) = res {
                    writeln!(out, "{}", humanize(&e))?;
                }
            }
            "" => {}
            other => writeln!(out, "Invalid choice {other:?}. Please try again.")?,
        }
    }

    writeln!(out, "Closing the program...")?;
    if let Some(mut rig) = slot {
        rig.disconnect_all()?;
    }
    Ok(())
}
