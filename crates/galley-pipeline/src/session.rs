use std::collections::HashMap;

use anyhow::{bail, Result};
use galley_core::{now_rfc3339, skeletons, GenerationRequest, ProgressState, Unit};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ── Session step ──

/// Where a session sits in the generation flow. `Validation` means a
/// complete result is on screen awaiting save or discard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStep {
    Configuration,
    Generating,
    Validation,
    Error,
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(SessionStep, &[SessionStep])] = &[
    (SessionStep::Configuration, &[SessionStep::Generating]),
    (
        SessionStep::Generating,
        &[
            SessionStep::Validation,
            SessionStep::Error,
            SessionStep::Configuration, // cancel
        ],
    ),
    (SessionStep::Validation, &[SessionStep::Configuration]), // save or discard
    (SessionStep::Error, &[SessionStep::Configuration]),      // reset
];

fn is_valid_transition(from: SessionStep, to: SessionStep) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

// ── Session state ──

/// One generation attempt: the request, the unit grid being filled in,
/// and everything observers need to render it. Lives in memory for the
/// duration of the attempt; only accepted artifacts are persisted.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: String,
    pub step: SessionStep,
    pub request: GenerationRequest,
    /// RFC 3339; recovery only adopts artifacts created after this.
    pub started_at: String,
    pub units: Vec<Unit>,
    pub progress: ProgressState,
    /// Artifact reference from the stream's `complete` event, if any.
    pub artifact_id: Option<String>,
    pub summary: Option<String>,
    pub failure: Option<PipelineError>,
    pub version: u32,
    /// Key to units position, kept in lockstep with `units`.
    pub(crate) index: HashMap<String, usize>,
    /// How many units the backend has declared. Starts at the request's
    /// count; `skeleton_count` events revise it.
    pub(crate) declared_total: usize,
    /// High-water mark so displayed progress never moves backwards.
    pub(crate) percent_floor: u8,
    /// Latched by the first terminal event; later events are ignored.
    pub(crate) terminal: bool,
    /// Units appended beyond the declared total.
    pub(crate) appended: usize,
}

impl GenerationSession {
    /// Validate the request and build the placeholder grid. No network
    /// activity happens here; a rejected request never leaves
    /// `Configuration`.
    pub fn new(request: GenerationRequest) -> Result<Self, PipelineError> {
        request
            .validate()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        let units = skeletons(request.unit_count, &request.key_scheme)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        let index = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.key.clone(), i))
            .collect();
        let declared_total = request.unit_count;
        Ok(GenerationSession {
            id: uuid::Uuid::new_v4().to_string(),
            step: SessionStep::Configuration,
            request,
            started_at: now_rfc3339(),
            units,
            progress: ProgressState::idle(),
            artifact_id: None,
            summary: None,
            failure: None,
            version: 0,
            index,
            declared_total,
            percent_floor: 0,
            terminal: false,
            appended: 0,
        })
    }

    pub fn ready_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_ready()).count()
    }

    /// CAS-guarded step transition. Returns Ok(true) on success,
    /// Ok(false) when the current step no longer matches `from`.
    pub fn transition(&mut self, from: SessionStep, to: SessionStep) -> Result<bool> {
        if self.step != from {
            return Ok(false); // CAS miss
        }
        if !is_valid_transition(from, to) {
            bail!("invalid step transition: {from:?} → {to:?}");
        }
        self.step = to;
        self.version += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::{GenerationKind, KeyScheme, UnitStatus};

    fn request() -> GenerationRequest {
        GenerationRequest {
            kind: GenerationKind::Recipes,
            subject: "user-1".into(),
            selection: "goal-lean".into(),
            unit_count: 3,
            key_scheme: KeyScheme::Ordinal {
                prefix: "recipe".into(),
            },
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn new_builds_placeholder_grid() {
        let session = GenerationSession::new(request()).unwrap();
        assert_eq!(session.step, SessionStep::Configuration);
        assert_eq!(session.units.len(), 3);
        assert!(session
            .units
            .iter()
            .all(|u| u.status == UnitStatus::Loading));
        assert_eq!(session.units[1].key, "recipe-2");
        assert_eq!(session.index["recipe-2"], 1);
        assert_eq!(session.progress.percentage, 0);
        assert_eq!(session.version, 0);
    }

    #[test]
    fn new_rejects_blank_subject() {
        let mut bad = request();
        bad.subject = "  ".into();
        let err = GenerationSession::new(bad).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn new_rejects_zero_units() {
        let mut bad = request();
        bad.unit_count = 0;
        let err = GenerationSession::new(bad).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn valid_transition_bumps_version() {
        let mut session = GenerationSession::new(request()).unwrap();
        let ok = session
            .transition(SessionStep::Configuration, SessionStep::Generating)
            .unwrap();
        assert!(ok);
        assert_eq!(session.step, SessionStep::Generating);
        assert_eq!(session.version, 1);
    }

    #[test]
    fn cas_miss_returns_false() {
        let mut session = GenerationSession::new(request()).unwrap();
        // Still in Configuration; a Generating-from transition misses.
        let ok = session
            .transition(SessionStep::Generating, SessionStep::Validation)
            .unwrap();
        assert!(!ok);
        assert_eq!(session.step, SessionStep::Configuration);
        assert_eq!(session.version, 0);
    }

    #[test]
    fn invalid_transition_errors() {
        let mut session = GenerationSession::new(request()).unwrap();
        let err = session.transition(SessionStep::Configuration, SessionStep::Validation);
        assert!(err.is_err());
    }

    #[test]
    fn cancel_returns_generating_to_configuration() {
        let mut session = GenerationSession::new(request()).unwrap();
        session
            .transition(SessionStep::Configuration, SessionStep::Generating)
            .unwrap();
        let ok = session
            .transition(SessionStep::Generating, SessionStep::Configuration)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn error_resets_to_configuration_only() {
        let mut session = GenerationSession::new(request()).unwrap();
        session
            .transition(SessionStep::Configuration, SessionStep::Generating)
            .unwrap();
        session
            .transition(SessionStep::Generating, SessionStep::Error)
            .unwrap();
        assert!(session
            .transition(SessionStep::Error, SessionStep::Generating)
            .is_err());
        let ok = session
            .transition(SessionStep::Error, SessionStep::Configuration)
            .unwrap();
        assert!(ok);
    }
}
