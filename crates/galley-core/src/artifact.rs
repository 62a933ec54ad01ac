use serde::{Deserialize, Serialize};

use crate::request::GenerationKind;

pub fn new_artifact_id() -> String {
    format!("art_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting should not fail")
}

/// One unit of a stored artifact. Always carries its payload; the
/// loading/failed distinction only exists on live sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactUnit {
    pub key: String,
    pub payload: serde_json::Value,
}

/// The persisted shape of a finished generation, as written by `save()`
/// and as found during recovery when the backend completed server-side
/// after the client connection dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub kind: GenerationKind,
    pub subject: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub total_units: usize,
    pub units: Vec<ArtifactUnit>,
}

impl Artifact {
    pub fn new(
        kind: GenerationKind,
        subject: &str,
        summary: Option<String>,
        units: Vec<ArtifactUnit>,
    ) -> Self {
        Artifact {
            id: new_artifact_id(),
            kind,
            subject: subject.to_string(),
            created_at: now_rfc3339(),
            summary,
            total_units: units.len(),
            units,
        }
    }

    /// Structurally complete: a declared size, every declared unit
    /// present, and every payload populated. Recovery only adopts
    /// artifacts that pass this check.
    pub fn is_complete(&self) -> bool {
        self.total_units > 0
            && self.units.len() == self.total_units
            && self.units.iter().all(|u| !u.payload.is_null())
    }
}
