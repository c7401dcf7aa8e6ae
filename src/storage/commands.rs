//! Storage command catalogue.

use bytes::Bytes;

use super::model::{Document, PutAttachmentReply, ViewReply};
use super::{Database, uri};
use crate::command::{Command, Reply};
use crate::error::DmsError;
use crate::transport::{Method, Response};
use crate::wire::{self, WireError};

/// Reply to a document GET: the decoded document plus its HTTP metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GetDocumentReply {
    pub status: u16,
    pub etag: Option<String>,
    pub document: Document,
}

impl Reply for GetDocumentReply {
    fn from_response(response: Response) -> Result<Self, WireError> {
        let document = wire::decode(&response.body)?;
        Ok(Self {
            status: response.status,
            etag: response.etag,
            document,
        })
    }
}

impl Reply for ViewReply {
    fn from_response(response: Response) -> Result<Self, WireError> {
        wire::decode(&response.body)
    }
}

impl Reply for PutAttachmentReply {
    fn from_response(response: Response) -> Result<Self, WireError> {
        wire::decode(&response.body)
    }
}

impl Command<GetDocumentReply> {
    pub fn get_document(db: &Database, id: &str) -> Result<Self, DmsError> {
        let target = uri::document(db, id)?;
        Ok(Command::new(db.transport(), Method::Get, target))
    }
}

impl Command<ViewReply> {
    pub fn get_view(db: &Database, design: &str, view: &str) -> Result<Self, DmsError> {
        let target = uri::view(db, design, view)?;
        Ok(Command::new(db.transport(), Method::Get, target))
    }
}

impl Command<PutAttachmentReply> {
    /// Upload `content` as attachment `name` of `document`. The document must
    /// carry the revision being updated.
    pub fn put_attachment(
        db: &Database,
        document: &Document,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<Self, DmsError> {
        let target = uri::attachment(db, &document.id, name, document.rev.as_deref())?;
        Ok(Command::new(db.transport(), Method::Put, target).with_payload(content_type, content))
    }
}
