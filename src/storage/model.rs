use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire::WireError;

/// A CouchDB document. Fields other than the reserved ones are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attachments: BTreeMap<String, Attachment>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            attachments: BTreeMap::new(),
            fields: Map::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Attachment stub as listed in a document's `_attachments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub content_type: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default)]
    pub stub: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewReply {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub offset: u64,
    pub rows: Vec<ViewRow>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    pub key: Value,
    pub value: Value,
}

/// A user group as emitted by the `groups/GetAll` view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl ViewReply {
    /// Project the rows of the groups view. Each row value is one group.
    pub fn groups(&self) -> Result<Vec<Group>, WireError> {
        self.rows
            .iter()
            .map(|row| Ok(serde_json::from_value(row.value.clone())?))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PutAttachmentReply {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}
