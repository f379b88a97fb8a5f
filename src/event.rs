use mongodb::bson::{Document, RawDocumentBuf};

/// One change notification exactly as the server sent it.
///
/// Forwarding never looks inside the event beyond its `operationType`;
/// the accessors exist for consumers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    raw: RawDocumentBuf,
}

impl ChangeEvent {
    pub fn from_raw(raw: RawDocumentBuf) -> Self {
        Self { raw }
    }

    pub fn from_document(doc: &Document) -> Result<Self, mongodb::bson::raw::Error> {
        Ok(Self {
            raw: RawDocumentBuf::from_document(doc)?,
        })
    }

    pub fn operation_type(&self) -> Option<&str> {
        self.raw.get_str("operationType").ok()
    }

    pub fn is_insert(&self) -> bool {
        self.operation_type() == Some("insert")
    }

    /// Collection name from the event's `ns` field.
    pub fn collection(&self) -> Option<&str> {
        self.raw
            .get_document("ns")
            .ok()
            .and_then(|ns| ns.get_str("coll").ok())
    }

    pub fn full_document(&self) -> Option<Document> {
        self.raw
            .get_document("fullDocument")
            .ok()
            .and_then(|doc| Document::try_from(doc).ok())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_bytes()
    }

    pub fn to_document(&self) -> Result<Document, mongodb::bson::raw::Error> {
        Document::try_from(&*self.raw)
    }
}
