use serde_json::Value;
use thiserror::Error;

/// Store bookkeeping fields that never leave this service
pub const SUPPRESSED_FIELDS: [&str; 11] = [
    "_id",
    "_userId",
    "_groupId",
    "_version",
    "_active",
    "_schemaVersion",
    "_deduplicator",
    "_state",
    "createdTime",
    "modifiedTime",
    "groupId",
];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strip bookkeeping fields and serialize one document.
///
/// Returns `Ok(None)` for a document with nothing left to show.
pub fn encode_document(document: Value) -> Result<Option<Vec<u8>>, DocumentError> {
    let mut fields = match document {
        Value::Object(fields) => fields,
        other => return Err(DocumentError::NotAnObject(kind_of(&other))),
    };

    fields.retain(|key, _| !SUPPRESSED_FIELDS.contains(&key.as_str()));
    if fields.is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::to_vec(&fields)?))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
