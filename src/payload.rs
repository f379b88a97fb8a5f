use mongodb::bson::{Bson, Document, extjson};

/// Failure to turn an incoming payload into a document.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid extended JSON: {0}")]
    ExtJson(#[from] extjson::de::Error),

    #[error("payload must be a JSON object, got {0}")]
    NotADocument(&'static str),
}

/// Decode an extended JSON string (canonical or relaxed) into a document.
///
/// The top-level value has to be an object; `{"_id": {"$oid": "..."}}`
/// and friends are converted to their native BSON types.
pub fn parse_document(payload: &str) -> Result<Document, PayloadError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    document_from_json(value)
}

fn document_from_json(value: serde_json::Value) -> Result<Document, PayloadError> {
    match Bson::try_from(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(PayloadError::NotADocument(kind_of(&other))),
    }
}

/// Relaxed extended JSON rendering, used when documents leave the process.
pub fn to_relaxed_json(value: impl Into<Bson>) -> serde_json::Value {
    value.into().into_relaxed_extjson()
}

fn kind_of(value: &Bson) -> &'static str {
    match value {
        Bson::Array(_) => "an array",
        Bson::String(_) => "a string",
        Bson::Boolean(_) => "a boolean",
        Bson::Null => "null",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "a number",
        _ => "a scalar value",
    }
}
