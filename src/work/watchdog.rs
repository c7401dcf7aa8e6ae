//! Timeout watchdog of a running job.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use super::errors::{ErrorManager, ErrorRecord};
use super::job::JobShared;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("job timeout must be greater than zero")]
    ZeroTimeout,

    #[error("job timeout of {0:?} does not fit the clock")]
    TimeoutOverflow(Duration),

    #[error("no tokio runtime to run the watchdog on")]
    NoRuntime(#[source] TryCurrentError),
}

/// Timer task that fails the job once it has been idle for `timeout`.
///
/// Stopped explicitly when the job concludes, and on drop.
#[derive(Debug)]
pub struct Watchdog {
    task: JoinHandle<()>,
}

impl Watchdog {
    pub(crate) fn start(
        shared: Arc<JobShared>,
        timeout: Duration,
        errors: ErrorManager,
    ) -> Result<Self, WatchdogError> {
        if timeout.is_zero() {
            return Err(WatchdogError::ZeroTimeout);
        }
        if Instant::now().checked_add(timeout).is_none() {
            return Err(WatchdogError::TimeoutOverflow(timeout));
        }
        let runtime = Handle::try_current().map_err(WatchdogError::NoRuntime)?;
        let task = runtime.spawn(watch(shared, timeout, errors));
        Ok(Self { task })
    }

    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch(shared: Arc<JobShared>, timeout: Duration, errors: ErrorManager) {
    loop {
        let last_action = shared.last_action();
        let Some(deadline) = last_action.checked_add(timeout) else {
            warn!(job = %shared.job().id, ?timeout, "job deadline does not fit the clock");
            return;
        };
        sleep_until(deadline).await;
        if shared.last_action() > last_action {
            // activity since we went to sleep
            continue;
        }
        if shared.time_out() {
            warn!(job = %shared.job().id, ?timeout, "job timed out");
            errors.add(ErrorRecord::job_timed_out(shared.job(), timeout));
        } else {
            debug!(job = %shared.job().id, "job already concluded, watchdog idle");
        }
        return;
    }
}
