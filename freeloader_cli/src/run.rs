//! One tensile run: config mapping, streaming file, progress and summary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Local;
use crossbeam_channel::RecvTimeoutError;
use freeloader_config::Config;
use freeloader_core::error::FreeloaderError;
use freeloader_core::{
    Acquisition, BackgroundRun, MotionCfg, RunEvent, RunMetadata, RunReport, SamplingCfg,
    StopPolicy, StopToken, create_stream_file, save_csv,
};

use crate::cli::{RUN_ACTIVE, RunArgs};
use crate::rig::CliRig;

/// Directory used when neither `--output-dir` nor `export.output_dir` is set.
pub fn default_output_dir(cfg: &Config) -> PathBuf {
    cfg.export
        .output_dir
        .as_deref()
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn metadata(cfg: &Config, args: &RunArgs) -> RunMetadata {
    RunMetadata {
        operator: args.operator.clone(),
        sample_name: args.sample_name.clone(),
        material_code: args.material.clone(),
        lot: args.lot.clone(),
        sample_type: args.sample_type.clone(),
        ..RunMetadata::from(&cfg.export)
    }
}

fn policy(cfg: &Config, args: &RunArgs) -> eyre::Result<StopPolicy> {
    let mut p = StopPolicy::from(&cfg.safety);
    if let Some(f) = args.max_force {
        if !(f.is_finite() && f > 0.0) {
            eyre::bail!("invalid configuration: --max-force must be > 0");
        }
        p.max_force = f;
    }
    if let Some(limit) = args.travel_limit {
        if limit <= cfg.motion.home_position {
            eyre::bail!("invalid configuration: --travel-limit must be beyond motion.home_position");
        }
        if limit > cfg.motion.target_position {
            eyre::bail!(
                "invalid configuration: --travel-limit {limit} is past motion.target_position {}",
                cfg.motion.target_position
            );
        }
        p.travel_limit = limit;
    }
    Ok(p)
}

struct Progress {
    json: bool,
    shown: bool,
}

impl Progress {
    fn handle(&mut self, ev: &RunEvent) {
        if self.json {
            return;
        }
        match ev {
            RunEvent::Sampled(s) => {
                eprint!("\rposition {:>6}  force {:>10.3}", s.position, s.weight);
                self.shown = true;
            }
            RunEvent::Skipped { reason } => self.line(&format!("skipped: {reason}")),
            RunEvent::Warning(w) => self.line(&format!("warning: {w}")),
            RunEvent::Stopped(_) | RunEvent::Failed(_) => self.finish(),
        }
    }

    fn line(&mut self, msg: &str) {
        self.finish();
        eprintln!("{msg}");
    }

    fn finish(&mut self) {
        if self.shown {
            eprintln!();
            self.shown = false;
        }
    }
}

fn summary_json(file: &Path, report: &RunReport, error: Option<&str>) -> String {
    serde_json::json!({
        "timestamp": Local::now().timestamp_millis(),
        "file": file.display().to_string(),
        "samples": report.samples,
        "skipped": report.skipped,
        "stop_reason": report.stop_reason.map(|r| r.as_str()),
        "peak_weight": report.peak_weight,
        "duration_ms": u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "error": error,
    })
    .to_string()
}

fn summary_text(file: &Path, report: &RunReport) -> String {
    let reason = report
        .stop_reason
        .map_or("aborted", |r| match r {
            freeloader_core::StopReason::UserRequested => "stopped by operator",
            freeloader_core::StopReason::Overload => "force limit reached",
            freeloader_core::StopReason::SampleBreak => "sample broke",
            freeloader_core::StopReason::TravelLimit => "travel limit reached",
        });
    let peak = report
        .peak_weight
        .map_or_else(|| "-".to_string(), |w| format!("{w:.3}"));
    format!(
        "Run finished: {reason}. {} samples ({} skipped), peak force {peak}, {:.1} s.\nData: {}",
        report.samples,
        report.skipped,
        report.elapsed.as_secs_f64(),
        file.display()
    )
}

/// Run one acquisition on `rig`, streaming to a new file in `output_dir`.
///
/// The rig comes back whenever the acquisition was built, even if the run
/// failed; the error (if any) is returned alongside.
pub fn run_once<W: Write>(
    cfg: &Config,
    rig: CliRig,
    args: &RunArgs,
    output_dir: &Path,
    stop: &StopToken,
    json: bool,
    out: &mut W,
) -> (Option<CliRig>, eyre::Result<RunReport>) {
    let policy = match policy(cfg, args) {
        Ok(p) => p,
        Err(e) => return (Some(rig), Err(e)),
    };
    let builder = Acquisition::builder()
        .with_motion(MotionCfg::from(&cfg.motion))
        .with_sampling(SamplingCfg::from(&cfg.sampling))
        .with_policy(policy)
        .with_stop_token(stop.clone());
    if let Err(e) = builder.validate() {
        return (Some(rig), Err(e));
    }
    let meta = metadata(cfg, args);
    let (path, sink) = match create_stream_file(output_dir, &meta, Local::now()) {
        Ok(v) => v,
        Err(e) => return (Some(rig), Err(e)),
    };
    let acq = match builder.with_rig(rig).with_sink(Box::new(sink)).build() {
        Ok(a) => a,
        Err(e) => {
            // Validation already passed, so only a missing rig lands here.
            tracing::error!(error = %e, "acquisition build failed");
            return (None, Err(e));
        }
    };

    if !json {
        let _ = writeln!(out, "Run started. Streaming to {}. Press Ctrl-C to stop.", path.display());
    }
    // Clear a stop left over from an earlier run before Ctrl-C is routed
    // to this one.
    stop.reset();
    RUN_ACTIVE.store(true, Ordering::SeqCst);
    let outcome = match BackgroundRun::spawn(acq) {
        Ok(run) => {
            let mut progress = Progress { json, shown: false };
            loop {
                match run.events().recv_timeout(Duration::from_millis(100)) {
                    Ok(ev) => progress.handle(&ev),
                    Err(RecvTimeoutError::Timeout) if run.is_finished() => break,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            for ev in run.events().try_iter() {
                progress.handle(&ev);
            }
            progress.finish();
            run.join()
        }
        Err(outcome) => outcome,
    };
    RUN_ACTIVE.store(false, Ordering::SeqCst);

    let report = outcome.acquisition.report();
    let samples = outcome.acquisition.log().snapshot();
    let rig = outcome.acquisition.into_rig();
    let result = outcome.result;

    let err_text = result.as_ref().err().map(|e| {
        e.downcast_ref::<FreeloaderError>()
            .map_or_else(|| e.to_string(), ToString::to_string)
    });
    if json {
        let _ = writeln!(out, "{}", summary_json(&path, &report, err_text.as_deref()));
    } else if result.is_ok() {
        let _ = writeln!(out, "{}", summary_text(&path, &report));
    } else if !samples.is_empty() {
        let _ = writeln!(out, "{} samples kept in {}", samples.len(), path.display());
    }

    if let Some(export) = &args.export {
        if let Err(e) = save_csv(export, &meta, &samples) {
            return (Some(rig), result.and(Err(e)));
        }
        if !json {
            let _ = writeln!(out, "Exported {} samples to {}", samples.len(), export.display());
        }
    }

    (Some(rig), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freeloader_core::{BuildError, StopReason};

    fn sim_config() -> Config {
        freeloader_config::load_toml(
            r#"
[motor]
port = "/dev/null"

[load_cell]
port = "/dev/null"
settle_ms = 0

[sampling]
interval_ms = 0
"#,
        )
        .unwrap()
    }

    #[test]
    fn invalid_motion_keeps_the_rig_connected() {
        let mut cfg = sim_config();
        cfg.motion.speed = 0;
        let dir = tempfile::tempdir().unwrap();
        let rig = crate::rig::connect(&cfg, true).unwrap();
        let mut out = Vec::new();

        let (back, result) =
            run_once(&cfg, rig, &RunArgs::default(), dir.path(), &StopToken::new(), false, &mut out);

        let rig = back.expect("rig must come back after a rejected config");
        assert!(rig.is_ready());
        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "no file for a rejected run");
    }

    #[test]
    fn stale_stop_request_does_not_end_the_next_run() {
        let cfg = sim_config();
        let dir = tempfile::tempdir().unwrap();
        let rig = crate::rig::connect(&cfg, true).unwrap();
        let stop = StopToken::new();
        stop.request();
        let mut out = Vec::new();

        let (back, result) = run_once(&cfg, rig, &RunArgs::default(), dir.path(), &stop, false, &mut out);

        let report = result.unwrap();
        assert_ne!(report.stop_reason, Some(StopReason::UserRequested));
        assert!(report.samples > 0);
        assert!(back.is_some());
    }

    #[test]
    fn travel_limit_past_the_target_is_rejected() {
        let cfg = sim_config();
        let args = RunArgs {
            travel_limit: Some(cfg.motion.target_position + 1),
            ..RunArgs::default()
        };
        let err = policy(&cfg, &args).unwrap_err();
        assert!(err.to_string().contains("--travel-limit"));
    }
}
