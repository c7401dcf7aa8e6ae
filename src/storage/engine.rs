//! Engine methods: storage operations built from one or more commands, with a
//! coarse phase-changed event on top of the command event surface.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, info};
use uuid::Uuid;

use super::Database;
use super::commands::GetDocumentReply;
use super::model::{Document, PutAttachmentReply, ViewReply};
use crate::command::Command;
use crate::error::DmsError;
use crate::events::{
    EventKind, FailureCause, HandlerResult, Observer, Subscribers, notify,
};
use crate::transport::Progress;

const GROUPS_DESIGN: &str = "groups";
const GROUPS_VIEW: &str = "GetAll";

/// Coarse phases reported through phase-changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Preparing,
    GettingGroups,
    GettingDocument,
    UploadingAttachment,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Preparing => write!(f, "Preparing"),
            EnginePhase::GettingGroups => write!(f, "GettingGroups"),
            EnginePhase::GettingDocument => write!(f, "GettingDocument"),
            EnginePhase::UploadingAttachment => write!(f, "UploadingAttachment"),
        }
    }
}

type PhaseHandler = Box<dyn FnMut(Uuid, EnginePhase, bool) -> HandlerResult + Send>;

/// Request context of an engine method: the phase-changed subscribers and the
/// subscriber sets the command events are delivered to.
pub struct EngineRequest<R> {
    id: Uuid,
    phase_changed: Vec<PhaseHandler>,
    events: Subscribers<R>,
}

impl<R> Default for EngineRequest<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> EngineRequest<R> {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase_changed: Vec::new(),
            events: Subscribers::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe_phase_changed(
        &mut self,
        handler: impl FnMut(Uuid, EnginePhase, bool) -> HandlerResult + Send + 'static,
    ) -> &mut Self {
        self.phase_changed.push(Box::new(handler));
        self
    }

    /// Progress, complete, error and timeout subscribers.
    pub fn events(&mut self) -> &mut Subscribers<R> {
        &mut self.events
    }

    fn phase_changed(&mut self, phase: EnginePhase, start: bool) -> Result<(), DmsError> {
        info!(request = %self.id, %phase, start, "phase changed");
        let id = self.id;
        let result = self
            .phase_changed
            .iter_mut()
            .try_for_each(|handler| handler(id, phase, start));
        notify(EventKind::PhaseChanged, result)?;
        Ok(())
    }
}

/// One storage operation.
///
/// Network outcomes reach the request's subscribers only. The returned error
/// covers construction failures and failing subscribers.
#[async_trait]
pub trait EngineMethod: Send {
    type Reply: Send;

    async fn execute(self, request: &mut EngineRequest<Self::Reply>) -> Result<(), DmsError>;
}

/// List every group through the `groups/GetAll` view.
pub struct GetAllGroups {
    db: Database,
}

impl GetAllGroups {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EngineMethod for GetAllGroups {
    type Reply = ViewReply;

    async fn execute(self, request: &mut EngineRequest<ViewReply>) -> Result<(), DmsError> {
        request.phase_changed(EnginePhase::Preparing, false)?;
        let command = Command::<ViewReply>::get_view(&self.db, GROUPS_DESIGN, GROUPS_VIEW)
            .inspect_err(|err| error!(error = %err, "cannot build groups view command"))?;
        request.phase_changed(EnginePhase::GettingGroups, true)?;
        command
            .execute(&self.db.options(), request.events())
            .await?;
        Ok(())
    }
}

/// Upload an attachment to the current revision of a document.
pub struct PutAttachment {
    db: Database,
    document_id: String,
    name: String,
    content_type: String,
    content: Bytes,
}

impl PutAttachment {
    pub fn new(
        db: Database,
        document_id: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: Bytes,
    ) -> Self {
        Self {
            db,
            document_id: document_id.into(),
            name: name.into(),
            content_type: content_type.into(),
            content,
        }
    }
}

#[async_trait]
impl EngineMethod for PutAttachment {
    type Reply = PutAttachmentReply;

    async fn execute(
        self,
        request: &mut EngineRequest<PutAttachmentReply>,
    ) -> Result<(), DmsError> {
        request.phase_changed(EnginePhase::Preparing, false)?;
        let get = Command::<GetDocumentReply>::get_document(&self.db, &self.document_id)
            .inspect_err(|err| error!(error = %err, "cannot build document command"))?;
        request.phase_changed(EnginePhase::GettingDocument, true)?;

        let mut prerequisite = Prerequisite {
            upstream: request.events(),
            document: None,
        };
        get.execute(&self.db.options(), &mut prerequisite).await?;
        // Error or Timeout already reached the subscribers.
        let Some(document) = prerequisite.document else {
            return Ok(());
        };

        let put = Command::<PutAttachmentReply>::put_attachment(
            &self.db,
            &document,
            &self.name,
            &self.content_type,
            self.content,
        )
        .inspect_err(|err| error!(error = %err, "cannot build attachment command"))?;
        request.phase_changed(EnginePhase::UploadingAttachment, true)?;
        put.execute(&self.db.options(), request.events()).await?;
        Ok(())
    }
}

/// Relays the events of a preparatory fetch. Its Complete stays inside the
/// method; the other outcomes end the method and go to the subscribers.
struct Prerequisite<'a, R> {
    upstream: &'a mut Subscribers<R>,
    document: Option<Document>,
}

impl<R: Send> Observer<GetDocumentReply> for Prerequisite<'_, R> {
    fn on_progress(&mut self, progress: &Progress) -> HandlerResult {
        self.upstream.on_progress(progress)
    }

    fn on_complete(&mut self, reply: &GetDocumentReply) -> HandlerResult {
        self.document = Some(reply.document.clone());
        Ok(())
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        self.upstream.on_error(message, cause)
    }

    fn on_timeout(&mut self) -> HandlerResult {
        self.upstream.on_timeout()
    }
}
