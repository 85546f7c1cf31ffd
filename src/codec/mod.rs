//! Value codec: documents to stored bytes and back.

mod timestamp;
pub use timestamp::*;


use serde_json::Value;

use crate::errors::CodecError;
use crate::Document;

/// Serializes documents for storage.
///
/// The codec is agnostic to timestamps; the write path merges them before
/// calling [`pack`](ValueCodec::pack). `id` and `band` are passed through for
/// codecs that lay out values per band.
pub trait ValueCodec: Send + Sync + 'static {
    fn pack(
        &self,
        value: &Document,
        id: &str,
        band: &str,
    ) -> Result<Vec<u8>, CodecError>;

    /// `Ok(None)` means "no value", which is distinct from an empty mapping.
    fn unpack(
        &self,
        bytes: &[u8],
        id: &str,
        band: &str,
    ) -> Result<Option<Document>, CodecError>;
}

/// JSON with null fields compacted away.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn pack(
        &self,
        value: &Document,
        _id: &str,
        _band: &str,
    ) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&compact(value)).map_err(CodecError::Serialize)
    }

    fn unpack(
        &self,
        bytes: &[u8],
        _id: &str,
        _band: &str,
    ) -> Result<Option<Document>, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(bytes).map_err(CodecError::Deserialize)? {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            _ => Err(CodecError::NotAMapping),
        }
    }
}

/// Drops null-valued fields, recursing through nested mappings.
/// Nulls inside arrays are positional and kept.
pub fn compact(value: &Document) -> Document {
    value
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), compact_value(v)))
        .collect()
}

fn compact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(compact(map)),
        Value::Array(items) => Value::Array(items.iter().map(compact_value).collect()),
        other => other.clone(),
    }
}
