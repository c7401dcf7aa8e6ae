//! Remoting transactions: one command wrapped 1:1, with the reply projected
//! into a domain object.

use std::time::Duration;

use reqwest::Url;
use tracing::error;

use super::Database;
use super::commands::GetDocumentReply;
use super::model::Document;
use super::uri;
use crate::command::Command;
use crate::error::DmsError;
use crate::events::{FailureCause, HandlerResult, Observer};
use crate::transport::{ExchangeOptions, Progress};

/// Complete payload of a transaction: the command reply and the value
/// projected from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Remoted<R, T> {
    pub reply: R,
    pub value: T,
}

/// Fetch one document.
pub struct Get {
    db: Database,
    id: String,
    options: ExchangeOptions,
}

impl Get {
    pub fn new(
        db: Database,
        id: impl Into<String>,
        send_timeout: Duration,
        receive_timeout: Duration,
        send_buffer_size: usize,
        receive_buffer_size: usize,
    ) -> Self {
        Self {
            db,
            id: id.into(),
            options: ExchangeOptions::new(
                send_timeout,
                receive_timeout,
                send_buffer_size,
                receive_buffer_size,
            ),
        }
    }

    /// Locator of the document this transaction fetches.
    pub fn locator(&self) -> Result<Url, DmsError> {
        uri::document(&self.db, &self.id)
    }

    /// Run the transaction. Returns the fetched document when the command
    /// completed, `None` when it reported Error or Timeout through `observer`.
    pub async fn process(
        self,
        observer: &mut dyn Observer<Remoted<GetDocumentReply, Document>>,
    ) -> Result<Option<Document>, DmsError> {
        let command = Command::<GetDocumentReply>::get_document(&self.db, &self.id)
            .inspect_err(|err| error!(id = %self.id, error = %err, "cannot build get command"))?;

        let mut relay = ProjectDocument {
            upstream: observer,
            document: None,
        };
        command.execute(&self.options, &mut relay).await?;
        Ok(relay.document)
    }
}

/// Forwards every command event once; Complete is enriched with the document
/// after it has been recorded.
struct ProjectDocument<'a> {
    upstream: &'a mut dyn Observer<Remoted<GetDocumentReply, Document>>,
    document: Option<Document>,
}

impl Observer<GetDocumentReply> for ProjectDocument<'_> {
    fn on_progress(&mut self, progress: &Progress) -> HandlerResult {
        self.upstream.on_progress(progress)
    }

    fn on_complete(&mut self, reply: &GetDocumentReply) -> HandlerResult {
        let remoted = Remoted {
            reply: reply.clone(),
            value: reply.document.clone(),
        };
        self.document = Some(remoted.value.clone());
        self.upstream.on_complete(&remoted)
    }

    fn on_error(&mut self, message: &str, cause: &FailureCause) -> HandlerResult {
        self.upstream.on_error(message, cause)
    }

    fn on_timeout(&mut self) -> HandlerResult {
        self.upstream.on_timeout()
    }
}
