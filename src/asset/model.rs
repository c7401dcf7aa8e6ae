use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::DmsError;
use crate::wire::{WirePayload, WireValue};

/// Descriptive half of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaAsset {
    pub id: Uuid,
    pub version: u32,
    /// Size of the data half, in bytes.
    pub length: u64,
    #[serde(default)]
    pub extension: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, WireValue>,
}

impl MetaAsset {
    /// File name for the data half: `{id}.{extension}`. An extension that is
    /// not plain ASCII alphanumerics is dropped, so the name never leaves the
    /// target directory.
    pub fn file_name(&self) -> String {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return self.id.to_string();
        }
        if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            warn!(asset = %self.id, extension, "ignoring unsafe asset extension");
            return self.id.to_string();
        }
        format!("{}.{extension}", self.id)
    }
}

/// Content half of an asset, filled as it is received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataAsset {
    pub id: Uuid,
    pub version: u32,
    pub bytes_complete: u64,
    pub bytes_total: u64,
    pub content: Bytes,
}

/// Payload of a download job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullAsset {
    pub id: Uuid,
    pub meta: Option<MetaAsset>,
    pub data: DataAsset,
}

impl FullAsset {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            meta: None,
            data: DataAsset {
                id,
                ..DataAsset::default()
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.meta.is_some() && self.data.bytes_total == self.data.bytes_complete
    }

    /// Write the data into `dir` and the meta asset next to it as
    /// `{file}.meta.json`. Returns the data file path.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, DmsError> {
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| DmsError::Config(format!("asset {} has no meta data", self.id)))?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let data_path = dir.join(meta.file_name());
        std::fs::write(&data_path, &self.data.content)?;

        let sidecar = dir.join(format!("{}.meta.json", meta.file_name()));
        std::fs::write(&sidecar, WirePayload::MetaAsset(meta).encode("utf-8")?)?;
        Ok(data_path)
    }
}
