//! Asset command catalogue.

use bytes::Bytes;
use uuid::Uuid;

use super::AssetServer;
use super::model::MetaAsset;
use crate::command::{Command, Reply};
use crate::error::DmsError;
use crate::storage::uri::join;
use crate::transport::{Method, Response};
use crate::wire::{self, WireError};

#[derive(Debug, Clone, PartialEq)]
pub struct MetaAssetReply {
    pub meta: MetaAsset,
}

impl Reply for MetaAssetReply {
    fn from_response(response: Response) -> Result<Self, WireError> {
        Ok(Self {
            meta: wire::decode(&response.body)?,
        })
    }
}

/// Raw content of a data asset.
#[derive(Debug, Clone, PartialEq)]
pub struct DataAssetReply {
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl Reply for DataAssetReply {
    fn from_response(response: Response) -> Result<Self, WireError> {
        Ok(Self {
            content_type: response.content_type,
            content: response.body,
        })
    }
}

impl Command<MetaAssetReply> {
    /// `GET {server}/meta/{id}`
    pub fn get_meta_asset(server: &AssetServer, id: Uuid) -> Result<Self, DmsError> {
        let id = id.to_string();
        let target = join(server.url(), &["meta", id.as_str()])?;
        Ok(Command::new(server.transport(), Method::Get, target))
    }
}

impl Command<DataAssetReply> {
    /// `GET {server}/data/{id}?version={version}`
    pub fn get_data_asset(server: &AssetServer, meta: &MetaAsset) -> Result<Self, DmsError> {
        let id = meta.id.to_string();
        let mut target = join(server.url(), &["data", id.as_str()])?;
        target
            .query_pairs_mut()
            .append_pair("version", &meta.version.to_string());
        Ok(Command::new(server.transport(), Method::Get, target))
    }
}
