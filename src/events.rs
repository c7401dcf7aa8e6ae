//! Event surface shared by Commands, Transactions and Engine Methods.
//!
//! Events flow bottom-up through [`Observer`]s. Every layer receives the
//! observer of the layer above for the duration of one call and forwards each
//! event to it exactly once. [`Subscribers`] is the closure-set observer that
//! requestors register handlers on.

use std::fmt;

use thiserror::Error;

use crate::transport::{Progress, TransportError};
use crate::wire::WireError;

/// Result returned by every event handler. A handler error signals a defect in
/// the surrounding application and is never swallowed.
pub type HandlerResult = anyhow::Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PhaseChanged,
    Progress,
    Complete,
    Error,
    Timeout,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::PhaseChanged => write!(f, "phase-changed"),
            EventKind::Progress => write!(f, "progress"),
            EventKind::Complete => write!(f, "complete"),
            EventKind::Error => write!(f, "error"),
            EventKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// A subscriber failed while handling an event.
#[derive(Debug, Error)]
#[error("{event} subscriber failed: {source}")]
pub struct SubscriberError {
    pub event: EventKind,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl SubscriberError {
    pub fn new(event: EventKind, source: anyhow::Error) -> Self {
        Self {
            event,
            source: source.into(),
        }
    }
}

/// Log a handler failure and turn it into a [`SubscriberError`].
pub fn notify(event: EventKind, result: HandlerResult) -> Result<(), SubscriberError> {
    result.map_err(|source| {
        tracing::error!(%event, error = %source, "an event subscriber failed");
        SubscriberError::new(event, source)
    })
}

/// Why an exchange produced an Error event.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Transport(TransportError),

    #[error("server returned status {status}: {error} ({reason})")]
    Status {
        status: u16,
        error: String,
        reason: String,
    },

    #[error("failed to decode reply: {0}")]
    Decode(#[source] WireError),
}

/// Receiver of the four events of one exchange.
///
/// Complete, Error and Timeout are mutually exclusive and delivered at most
/// once per exchange; Progress may arrive any number of times before them.
pub trait Observer<C>: Send {
    fn on_progress(&mut self, progress: &Progress) -> HandlerResult {
        let _ = progress;
        Ok(())
    }

    fn on_complete(&mut self, reply: &C) -> HandlerResult;

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult;

    fn on_timeout(&mut self) -> HandlerResult;
}

type ProgressHandler = Box<dyn FnMut(&Progress) -> HandlerResult + Send>;
type CompleteHandler<C> = Box<dyn FnMut(&C) -> HandlerResult + Send>;
type ErrorHandler = Box<dyn FnMut(&str, &FailureCause) -> HandlerResult + Send>;
type TimeoutHandler = Box<dyn FnMut() -> HandlerResult + Send>;

/// Sets of handlers for progress, complete, error and timeout.
///
/// Handlers run in registration order; the first failing handler stops the
/// dispatch of that event and its error is returned.
pub struct Subscribers<C> {
    progress: Vec<ProgressHandler>,
    complete: Vec<CompleteHandler<C>>,
    error: Vec<ErrorHandler>,
    timeout: Vec<TimeoutHandler>,
}

impl<C> Default for Subscribers<C> {
    fn default() -> Self {
        Self {
            progress: Vec::new(),
            complete: Vec::new(),
            error: Vec::new(),
            timeout: Vec::new(),
        }
    }
}

impl<C> Subscribers<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_progress(
        &mut self,
        handler: impl FnMut(&Progress) -> HandlerResult + Send + 'static,
    ) -> &mut Self {
        self.progress.push(Box::new(handler));
        self
    }

    pub fn subscribe_complete(
        &mut self,
        handler: impl FnMut(&C) -> HandlerResult + Send + 'static,
    ) -> &mut Self {
        self.complete.push(Box::new(handler));
        self
    }

    pub fn subscribe_error(
        &mut self,
        handler: impl FnMut(&str, &FailureCause) -> HandlerResult + Send + 'static,
    ) -> &mut Self {
        self.error.push(Box::new(handler));
        self
    }

    pub fn subscribe_timeout(
        &mut self,
        handler: impl FnMut() -> HandlerResult + Send + 'static,
    ) -> &mut Self {
        self.timeout.push(Box::new(handler));
        self
    }

    /// Total number of registered handlers across the four sets.
    pub fn len(&self) -> usize {
        self.progress.len() + self.complete.len() + self.error.len() + self.timeout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Observer<C> for Subscribers<C> {
    fn on_progress(&mut self, progress: &Progress) -> HandlerResult {
        for handler in &mut self.progress {
            handler(progress)?;
        }
        Ok(())
    }

    fn on_complete(&mut self, reply: &C) -> HandlerResult {
        for handler in &mut self.complete {
            handler(reply)?;
        }
        Ok(())
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        for handler in &mut self.error {
            handler(message, cause)?;
        }
        Ok(())
    }

    fn on_timeout(&mut self) -> HandlerResult {
        for handler in &mut self.timeout {
            handler()?;
        }
        Ok(())
    }
}
