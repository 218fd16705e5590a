use serde::{Deserialize, Serialize};

/// Kind of mutation an outbound event reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification of one committed mutation.
///
/// Events are:
/// - **immutable** (created at commit time)
/// - consumed **once** by the publish step
/// - never persisted by this service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    entity_id: String,
    kind: EventKind,
    payload: Vec<u8>,
}

impl OutboundEvent {
    pub fn new(entity_id: impl Into<String>, kind: EventKind, payload: Vec<u8>) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            payload,
        }
    }

    /// Event carrying the JSON form of `entity`.
    pub fn json<T: Serialize>(
        entity_id: impl Into<String>,
        kind: EventKind,
        entity: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(entity_id, kind, serde_json::to_vec(entity)?))
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
