mod cli;
mod error_fmt;
mod jog;
mod menu;
mod rig;
mod run;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use freeloader_config::{Config, Logging};
use freeloader_core::StopToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, JSON_MODE, RUN_ACTIVE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("color-eyre: {e}");
    }

    let code = match real_main(&cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

/// Console layer plus an optional JSON file layer. The returned guard must
/// live until exit so buffered file lines get flushed.
fn init_tracing(cli: &Cli, logging: &Logging) -> eyre::Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err("invalid --log-level")?;
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let mut guard = None;
    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("invalid configuration: logging.file has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            let level = logging.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(EnvFilter::try_new(level).wrap_err("invalid logging.level")?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}

fn install_ctrlc(stop: &StopToken) -> eyre::Result<()> {
    let token = stop.clone();
    ctrlc::set_handler(move || {
        if RUN_ACTIVE.load(Ordering::SeqCst) {
            tracing::warn!("Ctrl-C: stopping run");
            token.request();
        } else {
            std::process::exit(130);
        }
    })
    .wrap_err("install Ctrl-C handler")
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg: Config = freeloader_config::load_file(&cli.config)?;
    let _log_guard = init_tracing(cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), sim = cli.sim, "config loaded");

    let stop = StopToken::new();
    install_ctrlc(&stop)?;

    match &cli.cmd {
        Commands::Run(args) => {
            let rig = rig::connect(&cfg, cli.sim)?;
            let dir = args
                .output_dir
                .clone()
                .unwrap_or_else(|| run::default_output_dir(&cfg));
            let mut stdout = std::io::stdout().lock();
            // The rig stays connected on exit so the motor can finish homing.
            let (_rig, result) = run::run_once(&cfg, rig, args, &dir, &stop, cli.json, &mut stdout);
            result.map(|_| ())
        }
        Commands::Tare => {
            let mut rig = rig::connect(&cfg, cli.sim)?;
            rig.tare()?;
            std::thread::sleep(Duration::from_millis(cfg.load_cell.settle_ms));
            rig.disconnect_all()?;
            if cli.json {
                println!("{}", serde_json::json!({ "tared": true }));
            } else {
                println!("Load cell tared.");
            }
            Ok(())
        }
        Commands::Jog(args) => {
            let mut rig = rig::connect(&cfg, cli.sim)?;
            let mut stdout = std::io::stdout().lock();
            // Left connected like `run`: torque holds the new position.
            jog::jog(&mut rig, &cfg, args.to, args.speed, cli.json, &mut stdout).map(|_| ())
        }
        Commands::Menu => {
            let ctx = menu::MenuContext {
                cfg: &cfg,
                sim: cli.sim,
                stop,
                json: cli.json,
            };
            menu::run_menu(&ctx, std::io::stdin().lock(), std::io::stdout().lock())
        }
        Commands::SelfCheck => self_check(&cfg, cli),
    }
}

fn self_check(cfg: &Config, cli: &Cli) -> eyre::Result<()> {
    let mut rig = rig::connect(cfg, cli.sim)?;
    let ping = rig.ping_motor()?;
    if !ping {
        let _ = rig.disconnect_all();
        return Err(eyre::Report::new(
            freeloader_core::FreeloaderError::Communication("motor did not answer ping".into()),
        ));
    }
    let weight = rig.read_weight();
    let _ = rig.disconnect_all();
    let weight = weight?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "motor": "ok", "load_cell": "ok", "weight": weight })
        );
    } else {
        println!("motor: ok");
        println!("load cell: ok (weight {weight:.3})");
    }
    Ok(())
}
