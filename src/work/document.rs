use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use super::errors::ErrorManager;
use super::job::{Capture, JobCore, JobHandle};
use crate::events::{FailureCause, HandlerResult, Observer};
use crate::state_machine::{JobState, Requestor, UpdateUi};
use crate::storage::{Database, Document, Get, GetDocumentReply, Remoted};
use crate::transport::Progress;

/// Payload of a [`FetchDocumentJob`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPayload {
    pub id: String,
    pub document: Option<Document>,
}

/// Fetches one document through a remoting `Get` transaction.
pub struct FetchDocumentJob {
    core: JobCore<DocumentPayload>,
    db: Database,
    payload: DocumentPayload,
}

impl FetchDocumentJob {
    pub const KIND: &'static str = "FetchDocumentJob";

    pub fn new(
        db: Database,
        document_id: impl Into<String>,
        timeout: Duration,
        errors: ErrorManager,
        requestor: Arc<dyn Requestor<DocumentPayload>>,
        update_ui: UpdateUi,
    ) -> Self {
        Self {
            core: JobCore::new(Self::KIND, timeout, errors, requestor, update_ui),
            db,
            payload: DocumentPayload {
                id: document_id.into(),
                document: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.core.job().id
    }

    pub fn handle(&self) -> JobHandle {
        self.core.handle()
    }

    pub fn state(&self) -> JobState {
        self.core.state()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.core.started_at()
    }

    pub fn payload(&self) -> &DocumentPayload {
        &self.payload
    }

    pub async fn run(mut self) -> Self {
        self.execute().await;
        self.core.conclude(&self.payload);
        self
    }

    async fn execute(&mut self) {
        if !self.core.begin() || self.core.is_error() || !self.core.start_watchdog() {
            return;
        }
        info!(job = %self.id(), document = %self.payload.id, "fetching document");

        let options = self.db.options();
        let get = Get::new(
            self.db.clone(),
            self.payload.id.clone(),
            options.send_timeout,
            options.receive_timeout,
            options.send_buffer_size,
            options.receive_buffer_size,
        );
        let locator = match get.locator() {
            Ok(locator) => locator.to_string(),
            Err(err) => return self.core.fail_with("cannot build document command", &err),
        };
        let mut observer = KeepAlive {
            core: &self.core,
            capture: Capture::default(),
        };
        let result = get.process(&mut observer).await;
        let outcome = observer.capture.outcome;
        match result {
            Ok(Some(document)) => self.payload.document = Some(document),
            Ok(None) => return self.core.fail_exchange(&locator, "document fetch", outcome),
            Err(err) => return self.core.fail_with("document subscriber failed", &err),
        }

        if !self.core.checkpoint() {
            return;
        }
        self.core.finish();
    }
}

/// Keeps the watchdog fed while the document streams in.
struct KeepAlive<'a> {
    core: &'a JobCore<DocumentPayload>,
    capture: Capture<Remoted<GetDocumentReply, Document>>,
}

impl Observer<Remoted<GetDocumentReply, Document>> for KeepAlive<'_> {
    fn on_progress(&mut self, _progress: &Progress) -> HandlerResult {
        self.core.update_last_action();
        Ok(())
    }

    fn on_complete(&mut self, reply: &Remoted<GetDocumentReply, Document>) -> HandlerResult {
        self.capture.on_complete(reply)
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        self.capture.on_error(message, cause)
    }

    fn on_timeout(&mut self) -> HandlerResult {
        self.capture.on_timeout()
    }
}
