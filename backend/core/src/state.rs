//! Scan State Machine
//!
//! `Idle -> Running -> Idle`. Every read and write goes through one mutex and
//! each operation holds it for its whole critical section, so a snapshot is
//! always either entirely before or entirely after a concurrent update.
//!
//! While a [`CancelGuard`] is alive the state is frozen: a scan whose job was
//! killed cannot flip it to idle, and no new scan can start. Dropping the last
//! guard resets to idle, after every process is gone.

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ScanError;
use crate::types::{
    ScanFlags, ScanSnapshot, IDLE_MODULE_NAME, IDLE_STEP_NAME, IDLE_TARGET, STARTING_STEP_NAME,
    STARTING_TARGET,
};

/// Proof that a particular scan was started. Handed back to
/// [`ScanState::finish_scan`] so a late-finishing scan cannot reset a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    pub run_id: Uuid,
    pub total_steps: u32,
}

#[derive(Debug)]
struct Progress {
    running: bool,
    current_step: u32,
    total_steps: u32,
    step_name: String,
    target: String,
    module_name: String,
    run_id: Option<Uuid>,
    /// Cancellations in flight.
    cancellations: u32,
}

impl Progress {
    fn idle() -> Self {
        Self {
            running: false,
            current_step: 0,
            total_steps: 0,
            step_name: IDLE_STEP_NAME.to_string(),
            target: IDLE_TARGET.to_string(),
            module_name: IDLE_MODULE_NAME.to_string(),
            run_id: None,
            cancellations: 0,
        }
    }

    /// Idle fields, keeping the in-flight cancellation count.
    fn reset(&mut self) -> Progress {
        let cancellations = self.cancellations;
        std::mem::replace(
            self,
            Progress {
                cancellations,
                ..Progress::idle()
            },
        )
    }

    fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            running: self.running,
            current_step: self.current_step,
            total_steps: self.total_steps,
            step_name: self.step_name.clone(),
            target: self.target.clone(),
            module_name: self.module_name.clone(),
        }
    }
}

/// Process-wide scan progress. Construct once at startup and share by reference.
#[derive(Debug)]
pub struct ScanState {
    inner: Mutex<Progress>,
}

impl ScanState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Progress::idle()),
        }
    }

    /// Transition `Idle -> Running`. The idle check and the transition share
    /// one lock acquisition, so of two racing starts exactly one succeeds.
    /// Rejected while a cancellation is in flight.
    pub fn start_scan(
        &self,
        flags: ScanFlags,
        domain_count: u32,
        module_name: &str,
    ) -> Result<ScanTicket, ScanError> {
        let mut progress = self.inner.lock();
        if progress.running || progress.cancellations > 0 {
            return Err(ScanError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        let total_steps = flags.total_steps(domain_count);
        *progress = Progress {
            running: true,
            current_step: 1,
            total_steps,
            step_name: STARTING_STEP_NAME.to_string(),
            target: STARTING_TARGET.to_string(),
            module_name: module_name.to_string(),
            run_id: Some(run_id),
            cancellations: 0,
        };
        drop(progress);

        info!(
            run_id = %run_id,
            module = %module_name,
            domain_count,
            total_steps,
            "Scan started"
        );
        Ok(ScanTicket {
            run_id,
            total_steps,
        })
    }

    /// Record one completed step reported by the running job.
    pub fn advance_step(&self, step_name: &str, target: &str) -> Result<ScanSnapshot, ScanError> {
        let mut progress = self.inner.lock();
        if !progress.running {
            return Err(ScanError::NotRunning);
        }
        progress.current_step = progress.current_step.saturating_add(1);
        progress.step_name = step_name.to_string();
        progress.target = target.to_string();
        let snapshot = progress.snapshot();
        drop(progress);

        debug!(
            step = snapshot.current_step,
            total = snapshot.total_steps,
            step_name = %snapshot.step_name,
            target = %snapshot.target,
            "Scan step advanced"
        );
        Ok(snapshot)
    }

    /// Reset to idle defaults. Idempotent; never touches processes.
    pub fn stop_scan(&self) {
        let previous = self.inner.lock().reset();
        if let Some(run_id) = previous.run_id {
            info!(run_id = %run_id, steps = previous.current_step, "Scan state reset");
        }
    }

    /// Reset to idle only if `ticket` still names the active scan and no
    /// cancellation is in flight. A cancelled scan is reset when its
    /// [`CancelGuard`] drops.
    pub fn finish_scan(&self, ticket: &ScanTicket) -> bool {
        let mut progress = self.inner.lock();
        if progress.run_id != Some(ticket.run_id) {
            debug!(run_id = %ticket.run_id, "Stale scan finish ignored");
            return false;
        }
        if progress.cancellations > 0 {
            debug!(run_id = %ticket.run_id, "Scan finish deferred to cancellation");
            return false;
        }
        let steps = progress.current_step;
        progress.reset();
        drop(progress);

        info!(run_id = %ticket.run_id, steps, "Scan finished");
        true
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Id of the active scan, if any.
    pub fn run_id(&self) -> Option<Uuid> {
        self.inner.lock().run_id
    }

    pub fn is_cancelling(&self) -> bool {
        self.inner.lock().cancellations > 0
    }

    /// Freeze the state for the duration of a cancellation. The fields keep
    /// their current values until the returned guard drops.
    pub fn begin_cancel(&self) -> CancelGuard<'_> {
        let mut progress = self.inner.lock();
        progress.cancellations += 1;
        debug!(in_flight = progress.cancellations, "Cancellation started");
        CancelGuard { state: self }
    }
}

/// Held while processes are being terminated. Dropping it resets the state
/// to idle and lifts the freeze once no other cancellation is in flight.
#[derive(Debug)]
#[must_use = "the state resets as soon as the guard is dropped"]
pub struct CancelGuard<'a> {
    state: &'a ScanState,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        let mut progress = self.state.inner.lock();
        progress.cancellations = progress.cancellations.saturating_sub(1);
        let previous = progress.reset();
        drop(progress);

        info!(
            run_id = ?previous.run_id,
            steps = previous.current_step,
            "Scan state reset after cancellation"
        );
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}
