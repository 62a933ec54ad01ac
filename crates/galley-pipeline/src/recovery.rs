//! Silent-recovery pass: when a stream faults, the backend may still
//! have finished the generation and persisted it. Before surfacing an
//! error, query the store a bounded number of times for a complete
//! artifact newer than the session.

use std::time::Duration;

use galley_core::{Artifact, GenerationKind, ProgressState};
use galley_store::ArtifactStore;

use crate::config::PipelineConfig;
use crate::session::GenerationSession;

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// A complete artifact newer than the session was found.
    Recovered(Artifact),
    /// Every lookup came back empty. The fault stands.
    Exhausted,
}

/// Wait out the grace period, then query the store up to
/// `recovery_attempts` times. Lookup errors are logged and count as
/// misses; recovery never polls beyond its bound.
pub async fn run_recovery(
    store: &dyn ArtifactStore,
    subject: &str,
    kind: GenerationKind,
    since: &str,
    config: &PipelineConfig,
) -> RecoveryOutcome {
    tokio::time::sleep(Duration::from_millis(config.recovery_grace_ms)).await;
    for attempt in 1..=config.recovery_attempts {
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(config.recovery_retry_ms)).await;
        }
        match store.latest_for_subject(subject, kind, Some(since)).await {
            Ok(Some(artifact)) if artifact.is_complete() => {
                tracing::info!(
                    "recovered artifact {} for {subject} on attempt {attempt}",
                    artifact.id
                );
                return RecoveryOutcome::Recovered(artifact);
            }
            Ok(Some(artifact)) => {
                tracing::debug!(
                    "artifact {} is incomplete, attempt {attempt} continues",
                    artifact.id
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("recovery lookup failed on attempt {attempt}: {e:#}");
            }
        }
    }
    RecoveryOutcome::Exhausted
}

/// Replace the session grid with a recovered artifact's content. The
/// result is indistinguishable from a stream that finished normally.
pub fn adopt(session: &mut GenerationSession, artifact: &Artifact) {
    session.units = artifact
        .units
        .iter()
        .enumerate()
        .map(|(position, au)| {
            let mut unit = galley_core::Unit::placeholder(au.key.clone(), position);
            unit.mark_ready(au.payload.clone());
            unit
        })
        .collect();
    session.index = session
        .units
        .iter()
        .enumerate()
        .map(|(i, u)| (u.key.clone(), i))
        .collect();
    session.declared_total = session.units.len();
    session.artifact_id = Some(artifact.id.clone());
    session.summary = artifact.summary.clone();
    session.progress = ProgressState::complete(session.request.kind, session.units.len());
    session.terminal = true;
}
