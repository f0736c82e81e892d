//! Drive an `Acquisition` to completion, blocking or on a background thread.
//!
//! `BackgroundRun` owns exactly one worker thread. Dropping the handle
//! requests a stop and joins it, so a run never outlives its handle.

use crossbeam_channel as xch;
use freeloader_traits::{LoadCell, Motor};
use std::thread::JoinHandle;

use crate::acquisition::{Acquisition, RunReport};
use crate::error::Result;
use crate::sample::{RunLog, Sample};
use crate::status::{AcquisitionStatus, RunEvent};
use crate::stop::StopToken;

fn drive<M: Motor, L: LoadCell>(acq: &mut Acquisition<M, L>) -> Result<RunReport> {
    loop {
        match acq.step()? {
            AcquisitionStatus::Stopped(_) => return Ok(acq.report()),
            AcquisitionStatus::Sampled(_) | AcquisitionStatus::Skipped(_) => {}
        }
    }
}

/// Begin a run and step it until it stops or fails.
pub fn run<M: Motor, L: LoadCell>(acq: &mut Acquisition<M, L>) -> Result<RunReport> {
    acq.begin()?;
    let report = drive(acq)?;
    tracing::info!(
        samples = report.samples,
        reason = ?report.stop_reason,
        "run complete"
    );
    Ok(report)
}

/// What a background run hands back: the acquisition (and with it the rig)
/// plus the run result.
pub struct RunOutcome<M, L> {
    pub acquisition: Acquisition<M, L>,
    pub result: Result<RunReport>,
}

impl<M, L> std::fmt::Debug for RunOutcome<M, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOutcome")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

pub struct BackgroundRun<M, L> {
    stop: StopToken,
    log: RunLog,
    events: xch::Receiver<RunEvent>,
    join_handle: Option<JoinHandle<RunOutcome<M, L>>>,
}

impl<M, L> BackgroundRun<M, L>
where
    M: Motor + Send + 'static,
    L: LoadCell + Send + 'static,
{
    /// Call `begin` on this thread, then step on a new one.
    ///
    /// If `begin` fails no thread is started and the acquisition comes back
    /// in the error.
    #[allow(clippy::result_large_err)]
    pub fn spawn(mut acquisition: Acquisition<M, L>) -> std::result::Result<Self, RunOutcome<M, L>> {
        let (tx, rx) = xch::unbounded();
        acquisition.set_events(tx);
        if let Err(e) = acquisition.begin() {
            return Err(RunOutcome {
                acquisition,
                result: Err(e),
            });
        }

        let stop = acquisition.stop_token();
        let log = acquisition.log();
        let join_handle = std::thread::spawn(move || {
            let result = drive(&mut acquisition);
            match &result {
                Ok(r) => tracing::info!(samples = r.samples, reason = ?r.stop_reason, "run complete"),
                Err(e) => tracing::debug!(error = %e, "run thread exiting after failure"),
            }
            RunOutcome {
                acquisition,
                result,
            }
        });

        Ok(Self {
            stop,
            log,
            events: rx,
            join_handle: Some(join_handle),
        })
    }
}

impl<M, L> BackgroundRun<M, L> {
    /// Ask the loop to stop at its next iteration boundary.
    pub fn stop(&self) {
        self.stop.request();
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    pub const fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.log.snapshot()
    }

    pub const fn events(&self) -> &xch::Receiver<RunEvent> {
        &self.events
    }

    /// Wait for the loop to end and take back the acquisition.
    pub fn join(mut self) -> RunOutcome<M, L> {
        let Some(handle) = self.join_handle.take() else {
            unreachable!("join handle is only taken by join or drop");
        };
        match handle.join() {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl<M, L> Drop for BackgroundRun<M, L> {
    fn drop(&mut self) {
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        self.stop.request();
        // Exits after at most one device call plus one sampling interval.
        if handle.join().is_err() {
            tracing::warn!("run thread panicked during shutdown");
        } else {
            tracing::trace!("run thread joined");
        }
    }
}
