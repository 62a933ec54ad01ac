//! The pipeline controller: owns the current session, drives one
//! stream at a time, and publishes snapshots for observers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use galley_core::{Artifact, ArtifactUnit, GenerationKind, GenerationRequest, ProgressState, Unit};
use galley_store::ArtifactStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::reconcile::Applied;
use crate::recovery::{adopt, run_recovery, RecoveryOutcome};
use crate::rewards::{RewardGrant, RewardSink};
use crate::session::{GenerationSession, SessionStep};
use crate::transport::GenerationTransport;
use crate::wire::{EventParser, StreamEvent};

/// Observer snapshot. Everything a screen needs to render the current
/// session, published on every meaningful change.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub session_id: Option<String>,
    pub step: SessionStep,
    pub units: Vec<Unit>,
    pub progress: ProgressState,
    pub failure: Option<PipelineError>,
    pub artifact_id: Option<String>,
    pub summary: Option<String>,
}

impl PipelineView {
    pub fn idle() -> Self {
        PipelineView {
            session_id: None,
            step: SessionStep::Configuration,
            units: Vec::new(),
            progress: ProgressState::idle(),
            failure: None,
            artifact_id: None,
            summary: None,
        }
    }

    fn of(session: &GenerationSession) -> Self {
        PipelineView {
            session_id: Some(session.id.clone()),
            step: session.step,
            units: session.units.clone(),
            progress: session.progress.clone(),
            failure: session.failure.clone(),
            artifact_id: session.artifact_id.clone(),
            summary: session.summary.clone(),
        }
    }

    pub fn ready_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_ready()).count()
    }
}

struct ControllerState {
    /// Bumped whenever the current session changes identity. Stale
    /// actors compare epochs and drop their updates.
    epoch: u64,
    session: Option<GenerationSession>,
    cancel: CancellationToken,
}

/// What a batch of applied events means for the drive loop. A fault
/// carries its classification so recovery can log what it is covering
/// for.
enum StreamDisposition {
    Continue,
    Finished,
    Faulted(PipelineError),
    Superseded,
}

/// Drives generations end to end: start, stream, reconcile, recover,
/// save. Clone-cheap; all clones share one session slot.
#[derive(Clone)]
pub struct PipelineController {
    transport: Arc<dyn GenerationTransport>,
    store: Arc<dyn ArtifactStore>,
    rewards: Arc<dyn RewardSink>,
    config: PipelineConfig,
    state: Arc<Mutex<ControllerState>>,
    view_tx: Arc<watch::Sender<PipelineView>>,
}

impl PipelineController {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        store: Arc<dyn ArtifactStore>,
        rewards: Arc<dyn RewardSink>,
        config: PipelineConfig,
    ) -> Self {
        let (view_tx, _) = watch::channel(PipelineView::idle());
        PipelineController {
            transport,
            store,
            rewards,
            config,
            state: Arc::new(Mutex::new(ControllerState {
                epoch: 0,
                session: None,
                cancel: CancellationToken::new(),
            })),
            view_tx: Arc::new(view_tx),
        }
    }

    /// Watch snapshots as they are published.
    pub fn subscribe(&self) -> watch::Receiver<PipelineView> {
        self.view_tx.subscribe()
    }

    /// The latest published snapshot.
    pub fn view(&self) -> PipelineView {
        self.view_tx.borrow().clone()
    }

    /// Validate the request and launch a generation. The placeholder
    /// grid is visible in the next snapshot before any network
    /// activity. A session already in flight is superseded. Must be
    /// called within a Tokio runtime. Returns the session id.
    pub fn start(&self, request: GenerationRequest) -> Result<String> {
        let mut session = GenerationSession::new(request)?;
        session.transition(SessionStep::Configuration, SessionStep::Generating)?;
        session.refresh_progress(&self.config);

        let id = session.id.clone();
        let request = session.request.clone();
        let cancel = CancellationToken::new();
        let epoch = {
            let mut state = self.state.lock().unwrap();
            state.cancel.cancel();
            state.epoch += 1;
            state.cancel = cancel.clone();
            state.session = Some(session);
            self.publish_locked(&state);
            state.epoch
        };

        let controller = self.clone();
        tokio::spawn(async move {
            controller.drive(epoch, request, cancel).await;
        });
        Ok(id)
    }

    /// Abandon the in-flight generation and return to an idle
    /// configuration. Chunks already in flight are discarded.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancel.cancel();
        state.epoch += 1;
        state.session = None;
        self.publish_locked(&state);
    }

    /// Leave a failed session behind and return to configuration.
    pub fn reset(&self) {
        self.cancel();
    }

    /// Throw away a completed-but-unsaved result.
    pub fn discard(&self) {
        self.cancel();
    }

    /// Persist the completed result and clear the session. Only valid
    /// while a completed result is awaiting review; on a store error
    /// the session stays put so the save can be retried.
    pub async fn save(&self) -> Result<String> {
        let (artifact, epoch) = {
            let state = self.state.lock().unwrap();
            let session = match state.session.as_ref() {
                Some(s) if s.step == SessionStep::Validation => s,
                _ => bail!(PipelineError::Validation(
                    "no completed generation to save".into()
                )),
            };
            (build_artifact(session), state.epoch)
        };

        match self.store.save(&artifact).await {
            Ok(id) => {
                let mut state = self.state.lock().unwrap();
                if state.epoch == epoch {
                    state.epoch += 1;
                    state.session = None;
                    self.publish_locked(&state);
                }
                Ok(id)
            }
            Err(e) => {
                let failure = PipelineError::Persistence(format!("{e:#}"));
                let mut state = self.state.lock().unwrap();
                if state.epoch == epoch {
                    if let Some(session) = state.session.as_mut() {
                        session.failure = Some(failure.clone());
                    }
                    self.publish_locked(&state);
                }
                Err(failure.into())
            }
        }
    }

    // ── Stream driving ──

    async fn drive(
        &self,
        epoch: u64,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) {
        let mut stream = match self.transport.open(&request).await {
            Ok(s) => s,
            Err(e) => {
                // Nothing was ever streaming, so there is nothing to
                // recover; fail outright.
                self.fail_terminal(epoch, PipelineError::Transport(format!("{e:#}")));
                return;
            }
        };

        let mut parser = EventParser::new();
        let deadline = tokio::time::sleep(Duration::from_millis(self.config.stream_timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                chunk = stream.next_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        match self.apply_events(epoch, parser.feed(&bytes)) {
                            StreamDisposition::Continue => {}
                            StreamDisposition::Finished | StreamDisposition::Superseded => return,
                            StreamDisposition::Faulted(fault) => {
                                self.recover(epoch, &request, fault, &cancel).await;
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        let trailing: Vec<StreamEvent> = parser.flush().into_iter().collect();
                        match self.apply_events(epoch, trailing) {
                            StreamDisposition::Finished | StreamDisposition::Superseded => {}
                            StreamDisposition::Faulted(fault) => {
                                self.recover(epoch, &request, fault, &cancel).await;
                            }
                            StreamDisposition::Continue => {
                                // Closed without a terminal event. Keep
                                // what arrived and look for a
                                // server-side result.
                                let fault = PipelineError::PartialGeneration(
                                    "stream closed before completing".into(),
                                );
                                self.recover(epoch, &request, fault, &cancel).await;
                            }
                        }
                        return;
                    }
                    Err(e) => {
                        let fault = PipelineError::Transport(format!("{e:#}"));
                        self.recover(epoch, &request, fault, &cancel).await;
                        return;
                    }
                },
                _ = &mut deadline => {
                    let fault =
                        PipelineError::Transport("stream exceeded its time ceiling".into());
                    self.recover(epoch, &request, fault, &cancel).await;
                    return;
                }
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Fold a batch of events into the session, guarded by epoch.
    fn apply_events(&self, epoch: u64, events: Vec<StreamEvent>) -> StreamDisposition {
        if events.is_empty() {
            return StreamDisposition::Continue;
        }
        let mut state = self.state.lock().unwrap();
        if state.epoch != epoch {
            return StreamDisposition::Superseded;
        }
        let (disposition, changed, grant) = {
            let Some(session) = state.session.as_mut() else {
                return StreamDisposition::Superseded;
            };
            let mut disposition = StreamDisposition::Continue;
            let mut changed = false;
            let mut grant = None;
            for event in events {
                match session.apply(event, &self.config) {
                    Applied::Ignored => {}
                    Applied::Completed => {
                        changed = true;
                        if let Ok(true) =
                            session.transition(SessionStep::Generating, SessionStep::Validation)
                        {
                            grant = Some(RewardGrant {
                                subject: session.request.subject.clone(),
                                kind: session.request.kind,
                                artifact_id: session.artifact_id.clone(),
                                recovered: false,
                            });
                        }
                        disposition = StreamDisposition::Finished;
                    }
                    Applied::Faulted { message } => {
                        changed = true;
                        disposition =
                            StreamDisposition::Faulted(PipelineError::PartialGeneration(message));
                    }
                    Applied::Resized { .. } | Applied::UnitReady { .. } | Applied::Appended { .. } => {
                        changed = true;
                    }
                }
            }
            (disposition, changed, grant)
        };
        if changed {
            self.publish_locked(&state);
        }
        drop(state);
        if let Some(grant) = grant {
            self.spawn_grant(grant);
        }
        disposition
    }

    /// Funnel a stream fault through the silent-recovery pass. The
    /// fault classification stays in the logs; the user only sees a
    /// failure if recovery comes up empty.
    async fn recover(
        &self,
        epoch: u64,
        request: &GenerationRequest,
        fault: PipelineError,
        cancel: &CancellationToken,
    ) {
        tracing::info!(
            "stream fault for {} ({}): {fault}; checking the store",
            request.subject,
            request.kind
        );
        let since = {
            let mut state = self.state.lock().unwrap();
            if state.epoch != epoch {
                return;
            }
            let since = {
                let Some(session) = state.session.as_mut() else {
                    return;
                };
                session.progress =
                    ProgressState::recovering(session.request.kind, session.progress.percentage);
                session.started_at.clone()
            };
            self.publish_locked(&state);
            since
        };

        let outcome = tokio::select! {
            outcome = run_recovery(
                self.store.as_ref(),
                &request.subject,
                request.kind,
                &since,
                &self.config,
            ) => outcome,
            _ = cancel.cancelled() => return,
        };

        match outcome {
            RecoveryOutcome::Recovered(artifact) => {
                let grant = {
                    let mut state = self.state.lock().unwrap();
                    if state.epoch != epoch {
                        return;
                    }
                    let grant = {
                        let Some(session) = state.session.as_mut() else {
                            return;
                        };
                        match session
                            .transition(SessionStep::Generating, SessionStep::Validation)
                        {
                            Ok(true) => {
                                adopt(session, &artifact);
                                Some(RewardGrant {
                                    subject: session.request.subject.clone(),
                                    kind: session.request.kind,
                                    artifact_id: Some(artifact.id.clone()),
                                    recovered: true,
                                })
                            }
                            _ => None,
                        }
                    };
                    if grant.is_some() {
                        self.publish_locked(&state);
                    }
                    grant
                };
                if let Some(grant) = grant {
                    self.spawn_grant(grant);
                }
            }
            RecoveryOutcome::Exhausted => {
                self.fail_terminal(
                    epoch,
                    PipelineError::RecoveryExhausted(exhausted_message(request.kind)),
                );
            }
        }
    }

    /// Move the session to its failed terminal state. Units still
    /// loading are marked failed so nothing shimmers forever.
    fn fail_terminal(&self, epoch: u64, error: PipelineError) {
        let mut state = self.state.lock().unwrap();
        if state.epoch != epoch {
            return;
        }
        let updated = {
            let Some(session) = state.session.as_mut() else {
                return;
            };
            match session.transition(SessionStep::Generating, SessionStep::Error) {
                Ok(true) => {
                    session.terminal = true;
                    session.fail_loading_units();
                    session.progress = ProgressState::failed(
                        session.request.kind,
                        session.progress.percentage,
                    );
                    session.failure = Some(error);
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.publish_locked(&state);
        }
    }

    fn spawn_grant(&self, grant: RewardGrant) {
        let rewards = self.rewards.clone();
        tokio::spawn(async move {
            rewards.grant(&grant).await;
        });
    }

    fn publish_locked(&self, state: &ControllerState) {
        let view = match &state.session {
            Some(session) => PipelineView::of(session),
            None => PipelineView::idle(),
        };
        self.view_tx.send_replace(view);
    }
}

/// The user-facing copy for the one failure class users actually see.
/// Hints that the result may still exist server-side, since recovery
/// reads are best-effort against an eventually-consistent store.
fn exhausted_message(kind: GenerationKind) -> String {
    format!(
        "We couldn't finish your {}. It may have completed in the background. Refresh to check, or try again.",
        kind.display_name()
    )
}

/// Build the artifact to persist from a completed session, reusing the
/// stream's artifact id when it referenced one so a save merges with
/// the backend's copy instead of duplicating it.
fn build_artifact(session: &GenerationSession) -> Artifact {
    let units = session
        .units
        .iter()
        .map(|u| ArtifactUnit {
            key: u.key.clone(),
            payload: u.payload.clone().unwrap_or(serde_json::Value::Null),
        })
        .collect();
    let mut artifact = Artifact::new(
        session.request.kind,
        &session.request.subject,
        session.summary.clone(),
        units,
    );
    if let Some(id) = &session.artifact_id {
        artifact.id = id.clone();
    }
    artifact
}
