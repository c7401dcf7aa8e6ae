//! CouchDB-backed storage engine: model, locators, commands, remoting
//! transactions and engine methods.

pub mod commands;
pub mod engine;
pub mod model;
pub mod remoting;
pub mod uri;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::error::DmsError;
use crate::transport::{ExchangeOptions, Transport};

pub use commands::GetDocumentReply;
pub use engine::{EngineMethod, EnginePhase, EngineRequest, GetAllGroups, PutAttachment};
pub use model::{Attachment, Document, Group, PutAttachmentReply, ViewReply, ViewRow};
pub use remoting::{Get, Remoted};

/// Handle to a storage server: base URL, default exchange parameters and the
/// transport every command goes through.
pub struct Server {
    url: Url,
    timeout: Duration,
    buffer_size: usize,
    transport: Arc<dyn Transport>,
}

impl Server {
    pub fn new(
        url: &str,
        timeout: Duration,
        buffer_size: usize,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DmsError> {
        let url = Url::parse(url).map_err(|e| DmsError::locator(url, e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(DmsError::locator(url.as_str(), "server URL cannot be a base"));
        }
        Ok(Self {
            url,
            timeout,
            buffer_size,
            transport,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn options(&self) -> ExchangeOptions {
        ExchangeOptions::symmetric(self.timeout, self.buffer_size)
    }

    pub fn database(self: &Arc<Self>, name: impl Into<String>) -> Database {
        Database {
            server: Arc::clone(self),
            name: name.into(),
        }
    }
}

/// A database on a storage server. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    server: Arc<Server>,
    name: String,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.server.transport)
    }

    pub fn options(&self) -> ExchangeOptions {
        self.server.options()
    }
}
