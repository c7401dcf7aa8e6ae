//! Shared machinery of every job: state, abort flag, watchdog, progress
//! aggregation and the single terminal report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{ErrorManager, ErrorRecord, JobRef};
use super::watchdog::Watchdog;
use crate::events::{FailureCause, HandlerResult, Observer};
use crate::logger::render_chain;
use crate::state_machine::{
    JobState, Requestor, StateMachine, TransitionError, UpdateUi, WorkReport,
};

struct Activity {
    instant: Instant,
    at: DateTime<Utc>,
}

/// Part of a job shared with its watchdog and with [`JobHandle`]s.
pub(crate) struct JobShared {
    job: JobRef,
    state: Mutex<JobState>,
    abort: AtomicBool,
    activity: Mutex<Activity>,
}

impl JobShared {
    pub(crate) fn new(job: JobRef) -> Self {
        Self {
            job,
            state: Mutex::new(JobState::CREATED),
            abort: AtomicBool::new(false),
            activity: Mutex::new(Activity {
                instant: Instant::now(),
                at: Utc::now(),
            }),
        }
    }

    pub(crate) fn job(&self) -> &JobRef {
        &self.job
    }

    pub(crate) fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Compute and validate the next state under the state lock.
    pub(crate) fn set(
        &self,
        next: impl FnOnce(JobState) -> JobState,
    ) -> Result<JobState, TransitionError> {
        let mut state = self.state.lock();
        let current = *state;
        let updated = StateMachine::transition(current, next(current))?;
        debug!(job = %self.job.id, from = %current, to = %updated, "job state changed");
        *state = updated;
        Ok(updated)
    }

    /// Force `ERROR|TIMED_OUT` unless the job already concluded. Returns
    /// whether the job was timed out by this call.
    pub(crate) fn time_out(&self) -> bool {
        self.set(|_| JobState::ACTIVE | JobState::ERROR | JobState::TIMED_OUT)
            .is_ok()
    }

    pub(crate) fn touch(&self) {
        let mut activity = self.activity.lock();
        activity.instant = Instant::now();
        activity.at = Utc::now();
    }

    pub(crate) fn last_action(&self) -> Instant {
        self.activity.lock().instant
    }

    fn last_action_at(&self) -> DateTime<Utc> {
        self.activity.lock().at
    }
}

/// Cloneable handle to abort a job or watch its state from another task.
#[derive(Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.shared.job.id
    }

    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    /// Request a cooperative abort. The in-flight request is not interrupted;
    /// the job stops at its next checkpoint.
    pub fn abort(&self) {
        info!(job = %self.shared.job.id, "abort requested");
        self.shared.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.shared.abort.load(Ordering::SeqCst)
    }
}

/// Monotone aggregate progress.
#[derive(Debug, Default, Clone, Copy)]
struct ProgressTracker {
    percent: u8,
    bytes_complete: u64,
    bytes_total: u64,
}

impl ProgressTracker {
    /// Record an update. Returns the percentage to forward, or `None` for
    /// the update that completes the transfer.
    fn update(&mut self, complete: u64, total: u64) -> Option<u8> {
        self.bytes_complete = complete;
        self.bytes_total = total;
        let percent = if total == 0 {
            0
        } else {
            (complete.min(total).saturating_mul(100) / total) as u8
        };
        self.percent = self.percent.max(percent);
        if total > 0 && complete >= total {
            None
        } else {
            Some(self.percent)
        }
    }
}

pub struct JobCore<P> {
    shared: Arc<JobShared>,
    timeout: Duration,
    errors: ErrorManager,
    requestor: Arc<dyn Requestor<P>>,
    update_ui: UpdateUi,
    watchdog: Option<Watchdog>,
    progress: ProgressTracker,
    listeners: usize,
    attachments: usize,
    reported: bool,
    started_at: DateTime<Utc>,
}

impl<P> JobCore<P> {
    pub fn new(
        kind: &'static str,
        timeout: Duration,
        errors: ErrorManager,
        requestor: Arc<dyn Requestor<P>>,
        update_ui: UpdateUi,
    ) -> Self {
        let job = JobRef::new(Uuid::new_v4().to_string(), kind);
        Self {
            shared: Arc::new(JobShared::new(job)),
            timeout,
            errors,
            requestor,
            update_ui,
            watchdog: None,
            progress: ProgressTracker::default(),
            listeners: 0,
            attachments: 0,
            reported: false,
            started_at: Utc::now(),
        }
    }

    pub fn job(&self) -> &JobRef {
        &self.shared.job
    }

    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Data-progress listeners attached over the job's lifetime.
    pub fn progress_attachments(&self) -> usize {
        self.attachments
    }

    pub fn has_progress_listeners(&self) -> bool {
        self.listeners > 0
    }

    /// `CREATED` → `ACTIVE|EXECUTING`. Fails when the job already ran.
    pub fn begin(&mut self) -> bool {
        self.started_at = Utc::now();
        self.shared.touch();
        match self.shared.set(|_| JobState::ACTIVE | JobState::EXECUTING) {
            Ok(_) => {
                info!(job = %self.job().id, kind = self.job().kind, "job started");
                true
            }
            Err(err) => {
                warn!(job = %self.job().id, error = %err, "job cannot run again");
                false
            }
        }
    }

    pub fn start_watchdog(&mut self) -> bool {
        match Watchdog::start(Arc::clone(&self.shared), self.timeout, self.errors.clone()) {
            Ok(watchdog) => {
                self.watchdog = Some(watchdog);
                true
            }
            Err(err) => {
                self.errors
                    .add(ErrorRecord::timeout_failed_to_start(&err, self.job()));
                self.force_error();
                false
            }
        }
    }

    /// Record a failure of the job and move it to `ERROR`.
    pub fn fail(&mut self, reason: &str) {
        self.errors.add(ErrorRecord::job_run_failed(self.job(), reason));
        self.force_error();
    }

    /// Record a failure with its cause chain.
    pub fn fail_with(&mut self, reason: &str, cause: &(dyn std::error::Error + 'static)) {
        self.errors
            .add(ErrorRecord::job_run_failed(self.job(), reason).with_source(cause));
        self.force_error();
    }

    /// Record an exchange that did not complete, against the locator of the
    /// command that ran it. `what` names the exchange in the record.
    pub fn fail_exchange<R>(&mut self, locator: &str, what: &str, outcome: Outcome<R>) {
        let record = match outcome {
            Outcome::Failed { message, source } => {
                let mut record = ErrorRecord::job_run_failed(self.job(), &message);
                record.source = Some(source);
                record
            }
            Outcome::TimedOut => {
                ErrorRecord::job_run_failed(self.job(), &format!("{what} timed out"))
            }
            Outcome::Pending | Outcome::Complete(_) => {
                ErrorRecord::job_run_failed(self.job(), &format!("{what} reported no outcome"))
            }
        };
        self.errors.add(record.with_command(locator));
        self.force_error();
    }

    fn force_error(&self) {
        if let Err(err) = self.shared.set(|_| JobState::ACTIVE | JobState::ERROR) {
            debug!(job = %self.job().id, error = %err, "job already concluded");
        }
    }

    /// Whether the job is in error, either by state or because an error record
    /// exists for it. The latter also moves the state to `ERROR`.
    pub fn is_error(&self) -> bool {
        if self.state().is_error() {
            return true;
        }
        if self.errors.has_errors_for(&self.job().id) {
            self.force_error();
            return true;
        }
        false
    }

    /// Checkpoint after a round-trip. Returns `false` when the job must stop:
    /// it is in error, it timed out, or an abort was requested.
    pub fn checkpoint(&mut self) -> bool {
        self.update_last_action();
        if self.is_error() {
            return false;
        }
        if self.shared.abort.load(Ordering::SeqCst) {
            match self.shared.set(|_| JobState::ACTIVE | JobState::ABORTED) {
                Ok(_) => info!(job = %self.job().id, "job aborted"),
                Err(err) => debug!(job = %self.job().id, error = %err, "abort after conclusion"),
            }
            return false;
        }
        !self.state().is_terminal()
    }

    pub fn update_last_action(&self) {
        self.shared.touch();
    }

    pub fn attach_progress(&mut self) {
        self.listeners += 1;
        self.attachments += 1;
    }

    pub fn detach_progress(&mut self) {
        self.listeners = self.listeners.saturating_sub(1);
    }

    /// Fold a `(bytes_complete, bytes_total)` update into the aggregate and
    /// forward an intermediate report, except for the completing update.
    pub fn update_progress(&mut self, payload: &P, complete: u64, total: u64) {
        self.update_last_action();
        if !self.has_progress_listeners() {
            return;
        }
        if self.progress.update(complete, total).is_some() {
            self.report(payload, false);
        }
    }

    pub fn percent(&self) -> u8 {
        self.progress.percent
    }

    /// `ACTIVE|FINISHED`, unless the job concluded in the meantime.
    pub fn finish(&mut self) -> bool {
        match self.shared.set(|_| JobState::ACTIVE | JobState::FINISHED) {
            Ok(_) => {
                self.progress.percent = 100;
                info!(job = %self.job().id, "job finished");
                true
            }
            Err(err) => {
                debug!(job = %self.job().id, error = %err, "job concluded before finishing");
                false
            }
        }
    }

    /// Single exit of every run: stop the watchdog, detach listeners, make
    /// sure the state is terminal and issue the terminal report once.
    pub fn conclude(&mut self, payload: &P) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        self.listeners = 0;
        if !self.state().is_terminal() {
            self.fail("job ended without reaching a terminal state");
        }
        if self.reported {
            return;
        }
        self.reported = true;
        info!(job = %self.job().id, state = %self.state(), "job concluded");
        self.report(payload, true);
    }

    fn report(&self, payload: &P, terminal: bool) {
        let report = WorkReport {
            job_id: self.job().id.clone(),
            kind: self.job().kind,
            state: self.state(),
            percent: self.progress.percent,
            bytes_complete: self.progress.bytes_complete,
            bytes_total: self.progress.bytes_total,
            terminal,
            last_action: self.shared.last_action_at(),
        };
        self.requestor.work_report(&self.update_ui, &report, payload);
    }
}

/// Outcome of one exchange run under a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    Pending,
    Complete(R),
    /// Error event: the command's message and its rendered cause chain.
    Failed { message: String, source: String },
    TimedOut,
}

impl<R> Outcome<R> {
    pub(crate) fn record_error(&mut self, message: &str, cause: &FailureCause) {
        *self = Outcome::Failed {
            message: message.to_string(),
            source: render_chain(cause),
        };
    }
}

/// Observer keeping the outcome of a command for the job to act on.
pub struct Capture<R> {
    pub outcome: Outcome<R>,
}

impl<R> Default for Capture<R> {
    fn default() -> Self {
        Self {
            outcome: Outcome::Pending,
        }
    }
}

impl<R: Clone + Send> Observer<R> for Capture<R> {
    fn on_complete(&mut self, reply: &R) -> HandlerResult {
        self.outcome = Outcome::Complete(reply.clone());
        Ok(())
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        self.outcome.record_error(message, cause);
        Ok(())
    }

    fn on_timeout(&mut self) -> HandlerResult {
        self.outcome = Outcome::TimedOut;
        Ok(())
    }
}
