//! Asset-transfer server: meta/data asset model and commands.

pub mod commands;
pub mod model;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::error::DmsError;
use crate::transport::{ExchangeOptions, Transport};

pub use commands::{DataAssetReply, MetaAssetReply};
pub use model::{DataAsset, FullAsset, MetaAsset};

/// Handle to the asset server.
#[derive(Clone)]
pub struct AssetServer {
    url: Url,
    options: ExchangeOptions,
    transport: Arc<dyn Transport>,
}

impl AssetServer {
    pub fn new(
        url: &str,
        timeout: Duration,
        buffer_size: usize,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DmsError> {
        let url = Url::parse(url).map_err(|e| DmsError::locator(url, e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(DmsError::locator(url.as_str(), "asset URL cannot be a base"));
        }
        Ok(Self {
            url,
            options: ExchangeOptions::symmetric(timeout, buffer_size),
            transport,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn options(&self) -> ExchangeOptions {
        self.options
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }
}
