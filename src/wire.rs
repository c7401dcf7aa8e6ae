//! Wire serializer contract.
//!
//! Outgoing payloads go through the closed [`WirePayload`] variant: one
//! explicit branch per known payload kind plus a generic fallback. Typed
//! primitive values travel as `{"tag": ..., "value": ...}` pairs and are
//! dispatched over the closed [`WireTag`] set; an unknown tag is an error,
//! never a silent fallback.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::asset::MetaAsset;
use crate::storage::Document;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unsupported charset `{0}`, payloads are UTF-8 only")]
    UnsupportedCharset(String),

    #[error("unsupported wire tag `{0}`")]
    UnsupportedTag(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Decode a reply body. Failures are returned exactly as the JSON layer
/// reports them.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(body)?)
}

/// Payload kinds the client knows how to put on the wire.
#[derive(Debug, Clone, Copy)]
pub enum WirePayload<'a> {
    MetaAsset(&'a MetaAsset),
    Document(&'a Document),
    Generic(&'a Value),
}

impl WirePayload<'_> {
    /// Encode the payload for a stream declared with `charset`.
    pub fn encode(&self, charset: &str) -> Result<Bytes, WireError> {
        if !is_utf8(charset) {
            return Err(WireError::UnsupportedCharset(charset.to_string()));
        }
        let encoded = match self {
            // Meta assets are also written next to downloaded data, keep them readable.
            WirePayload::MetaAsset(meta) => serde_json::to_vec_pretty(meta)?,
            WirePayload::Document(document) => serde_json::to_vec(document)?,
            WirePayload::Generic(value) => serde_json::to_vec(value)?,
        };
        Ok(Bytes::from(encoded))
    }
}

fn is_utf8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8")
}

/// The closed set of primitive wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTag {
    Boolean,
    String,
    Guid,
    Object,
    DateTime,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Double,
    ListOfString,
    ArrayOfString,
    ErrorCode,
}

impl WireTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireTag::Boolean => "boolean",
            WireTag::String => "string",
            WireTag::Guid => "guid",
            WireTag::Object => "object",
            WireTag::DateTime => "dateTime",
            WireTag::Int => "int",
            WireTag::UnsignedInt => "unsignedInt",
            WireTag::Long => "long",
            WireTag::UnsignedLong => "unsignedLong",
            WireTag::Double => "double",
            WireTag::ListOfString => "ListOfString",
            WireTag::ArrayOfString => "ArrayOfString",
            WireTag::ErrorCode => "ErrorCode",
        }
    }
}

impl fmt::Display for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireTag {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(WireTag::Boolean),
            "string" => Ok(WireTag::String),
            "guid" => Ok(WireTag::Guid),
            "object" => Ok(WireTag::Object),
            "dateTime" => Ok(WireTag::DateTime),
            "int" => Ok(WireTag::Int),
            "unsignedInt" => Ok(WireTag::UnsignedInt),
            "long" => Ok(WireTag::Long),
            "unsignedLong" => Ok(WireTag::UnsignedLong),
            "double" => Ok(WireTag::Double),
            "ListOfString" => Ok(WireTag::ListOfString),
            "ArrayOfString" => Ok(WireTag::ArrayOfString),
            "ErrorCode" => Ok(WireTag::ErrorCode),
            other => Err(WireError::UnsupportedTag(other.to_string())),
        }
    }
}

/// Error codes the asset server puts in typed properties and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    None,
    InvalidRequest,
    NotFound,
    Conflict,
    Unauthorized,
    ServerError,
}

/// A typed primitive value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaggedValue", into = "TaggedValue")]
pub enum WireValue {
    Boolean(bool),
    String(String),
    Guid(Uuid),
    Object(Value),
    DateTime(DateTime<Utc>),
    Int(i32),
    UnsignedInt(u32),
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    ListOfString(Vec<String>),
    ArrayOfString(Vec<String>),
    ErrorCode(ErrorCode),
}

impl WireValue {
    /// Dispatch `value` on its wire tag.
    pub fn decode(tag: &str, value: Value) -> Result<Self, WireError> {
        let decoded = match tag.parse::<WireTag>()? {
            WireTag::Boolean => WireValue::Boolean(serde_json::from_value(value)?),
            WireTag::String => WireValue::String(serde_json::from_value(value)?),
            WireTag::Guid => WireValue::Guid(serde_json::from_value(value)?),
            WireTag::Object => WireValue::Object(value),
            WireTag::DateTime => WireValue::DateTime(serde_json::from_value(value)?),
            WireTag::Int => WireValue::Int(serde_json::from_value(value)?),
            WireTag::UnsignedInt => WireValue::UnsignedInt(serde_json::from_value(value)?),
            WireTag::Long => WireValue::Long(serde_json::from_value(value)?),
            WireTag::UnsignedLong => WireValue::UnsignedLong(serde_json::from_value(value)?),
            WireTag::Double => WireValue::Double(serde_json::from_value(value)?),
            WireTag::ListOfString => WireValue::ListOfString(serde_json::from_value(value)?),
            WireTag::ArrayOfString => WireValue::ArrayOfString(serde_json::from_value(value)?),
            WireTag::ErrorCode => WireValue::ErrorCode(serde_json::from_value(value)?),
        };
        Ok(decoded)
    }

    pub fn tag(&self) -> WireTag {
        match self {
            WireValue::Boolean(_) => WireTag::Boolean,
            WireValue::String(_) => WireTag::String,
            WireValue::Guid(_) => WireTag::Guid,
            WireValue::Object(_) => WireTag::Object,
            WireValue::DateTime(_) => WireTag::DateTime,
            WireValue::Int(_) => WireTag::Int,
            WireValue::UnsignedInt(_) => WireTag::UnsignedInt,
            WireValue::Long(_) => WireTag::Long,
            WireValue::UnsignedLong(_) => WireTag::UnsignedLong,
            WireValue::Double(_) => WireTag::Double,
            WireValue::ListOfString(_) => WireTag::ListOfString,
            WireValue::ArrayOfString(_) => WireTag::ArrayOfString,
            WireValue::ErrorCode(_) => WireTag::ErrorCode,
        }
    }

    fn into_value(self) -> Value {
        match self {
            WireValue::Boolean(v) => Value::from(v),
            WireValue::String(v) => Value::from(v),
            WireValue::Guid(v) => Value::from(v.to_string()),
            WireValue::Object(v) => v,
            WireValue::DateTime(v) => Value::from(v.to_rfc3339()),
            WireValue::Int(v) => Value::from(v),
            WireValue::UnsignedInt(v) => Value::from(v),
            WireValue::Long(v) => Value::from(v),
            WireValue::UnsignedLong(v) => Value::from(v),
            WireValue::Double(v) => Value::from(v),
            WireValue::ListOfString(v) | WireValue::ArrayOfString(v) => Value::from(v),
            WireValue::ErrorCode(v) => serde_json::to_value(v).unwrap_or(Value::Null),
        }
    }
}

/// On-the-wire shape of a [`WireValue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedValue {
    pub tag: String,
    pub value: Value,
}

impl TryFrom<TaggedValue> for WireValue {
    type Error = WireError;

    fn try_from(tagged: TaggedValue) -> Result<Self, Self::Error> {
        WireValue::decode(&tagged.tag, tagged.value)
    }
}

impl From<WireValue> for TaggedValue {
    fn from(value: WireValue) -> Self {
        TaggedValue {
            tag: value.tag().to_string(),
            value: value.into_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_known_tag_parses_back_to_itself() {
        for tag in [
            WireTag::Boolean,
            WireTag::String,
            WireTag::Guid,
            WireTag::Object,
            WireTag::DateTime,
            WireTag::Int,
            WireTag::UnsignedInt,
            WireTag::Long,
            WireTag::UnsignedLong,
            WireTag::Double,
            WireTag::ListOfString,
            WireTag::ArrayOfString,
            WireTag::ErrorCode,
        ] {
            assert_eq!(tag.as_str().parse::<WireTag>().unwrap(), tag);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = WireValue::decode("decimal", json!(1.5)).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedTag(ref t) if t == "decimal"));
        assert_eq!(err.to_string(), "unsupported wire tag `decimal`");
    }

    #[test]
    fn decode_dispatches_on_tag() {
        assert_eq!(
            WireValue::decode("unsignedLong", json!(18_000_000_000u64)).unwrap(),
            WireValue::UnsignedLong(18_000_000_000)
        );
        assert_eq!(
            WireValue::decode("ListOfString", json!(["a", "b"])).unwrap(),
            WireValue::ListOfString(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            WireValue::decode("ErrorCode", json!("NotFound")).unwrap(),
            WireValue::ErrorCode(ErrorCode::NotFound)
        );
    }

    #[test]
    fn mismatched_value_surfaces_json_error() {
        let err = WireValue::decode("int", json!("seven")).unwrap_err();
        assert!(matches!(err, WireError::Json(_)));
    }

    #[test]
    fn tagged_values_deserialize_inside_maps() {
        let raw = r#"{
            "pages": {"tag": "int", "value": 12},
            "reviewed": {"tag": "boolean", "value": true}
        }"#;
        let props: std::collections::BTreeMap<String, WireValue> =
            serde_json::from_str(raw).unwrap();
        assert_eq!(props["pages"], WireValue::Int(12));
        assert_eq!(props["reviewed"], WireValue::Boolean(true));

        let back = serde_json::to_value(&props["pages"]).unwrap();
        assert_eq!(back, json!({"tag": "int", "value": 12}));
    }

    #[test]
    fn tagged_value_with_unknown_tag_fails_deserialization() {
        let raw = r#"{"tag": "blob", "value": "AAAA"}"#;
        assert!(serde_json::from_str::<WireValue>(raw).is_err());
    }

    #[test]
    fn encode_rejects_non_utf8_charsets() {
        let value = json!({"a": 1});
        let payload = WirePayload::Generic(&value);
        assert!(payload.encode("UTF-8").is_ok());
        let err = payload.encode("utf-16").unwrap_err();
        assert!(matches!(err, WireError::UnsupportedCharset(_)));
    }

    #[test]
    fn decode_failure_is_passed_through() {
        let err = decode::<Value>(b"{not json").unwrap_err();
        assert!(matches!(err, WireError::Json(_)));
    }
}
