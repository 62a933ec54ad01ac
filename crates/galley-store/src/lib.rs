//! Artifact persistence for galley: the `ArtifactStore` boundary the
//! pipeline saves through and recovers from, a local filesystem
//! implementation, and an in-memory double for tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use galley_core::{Artifact, GenerationKind};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Store boundary used by the pipeline. `latest_for_subject` is the
/// recovery query; `save` persists an accepted result.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an artifact and return its id. Upsert semantics: saving
    /// the same id again replaces the record.
    async fn save(&self, artifact: &Artifact) -> Result<String>;

    /// Most recent artifact for (subject, kind), optionally restricted
    /// to those created strictly after an RFC 3339 instant.
    async fn latest_for_subject(
        &self,
        subject: &str,
        kind: GenerationKind,
        created_after: Option<&str>,
    ) -> Result<Option<Artifact>>;

    /// Artifacts for a subject, newest first.
    async fn list(&self, subject: &str, kind: Option<GenerationKind>) -> Result<Vec<Artifact>>;
}

/// Fold an opaque subject id into a filesystem-safe directory name.
pub fn subject_id(subject: &str) -> String {
    blake3::hash(subject.as_bytes()).to_hex()[..16].to_string()
}

/// Per-user store root: the platform data dir, falling back to a
/// dotfile in the home directory.
pub fn default_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("galley")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".galley")
    } else {
        PathBuf::from(".galley-store")
    }
}

/// Atomic write: write to a temp file in the same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

// ── Local filesystem store ──

/// Lays artifacts out as
/// `<root>/artifacts/<kind>/<subject_id>/<artifact_id>.json`.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    pub fn open_default() -> Self {
        Self::new(default_root())
    }

    fn subject_dir(&self, kind: GenerationKind, subject: &str) -> PathBuf {
        self.root
            .join("artifacts")
            .join(kind.as_str())
            .join(subject_id(subject))
    }

    fn artifacts_in(&self, dir: &Path, subject: &str) -> Vec<Artifact> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let mut found = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(artifact) = read_artifact(&path) {
                // Hash collisions aside, the dir already scopes the
                // subject; the field check keeps junk files out.
                if artifact.subject == subject {
                    found.push(artifact);
                }
            }
        }
        found
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn save(&self, artifact: &Artifact) -> Result<String> {
        let dir = self.subject_dir(artifact.kind, &artifact.subject);
        let path = dir.join(format!("{}.json", artifact.id));
        let data = serde_json::to_vec_pretty(artifact)
            .with_context(|| format!("encoding artifact {}", artifact.id))?;
        write_atomic(&path, &data)
            .with_context(|| format!("writing artifact to {}", path.display()))?;
        Ok(artifact.id.clone())
    }

    async fn latest_for_subject(
        &self,
        subject: &str,
        kind: GenerationKind,
        created_after: Option<&str>,
    ) -> Result<Option<Artifact>> {
        let dir = self.subject_dir(kind, subject);
        let candidates = self.artifacts_in(&dir, subject);
        Ok(pick_latest(candidates, created_after))
    }

    async fn list(&self, subject: &str, kind: Option<GenerationKind>) -> Result<Vec<Artifact>> {
        let kinds = match kind {
            Some(k) => vec![k],
            None => vec![
                GenerationKind::MealPlan,
                GenerationKind::Recipes,
                GenerationKind::ShoppingList,
            ],
        };
        let mut all = Vec::new();
        for k in kinds {
            let dir = self.subject_dir(k, subject);
            all.extend(self.artifacts_in(&dir, subject));
        }
        all.sort_by_key(|a| std::cmp::Reverse(parse_ts(&a.created_at)));
        Ok(all)
    }
}

/// Read one artifact file, skipping anything unreadable or malformed.
fn read_artifact(path: &Path) -> Option<Artifact> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("skipping unreadable artifact {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!("skipping malformed artifact {}: {e}", path.display());
            None
        }
    }
}

fn parse_ts(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Newest artifact by `created_at`, honoring the recency cutoff.
/// Artifacts with unparseable timestamps are ignored.
fn pick_latest(candidates: Vec<Artifact>, created_after: Option<&str>) -> Option<Artifact> {
    let cutoff = match created_after {
        Some(s) => match parse_ts(s) {
            Some(t) => Some(t),
            None => {
                tracing::warn!("unparseable recency cutoff \"{s}\", ignoring it");
                None
            }
        },
        None => None,
    };
    candidates
        .into_iter()
        .filter_map(|a| parse_ts(&a.created_at).map(|t| (t, a)))
        .filter(|(t, _)| cutoff.map_or(true, |c| *t > c))
        .max_by_key(|(t, _)| *t)
        .map(|(_, a)| a)
}

// ── In-memory store (tests) ──

/// Mutex-held double for tests. Seed artifacts directly, script save
/// failures, and count recovery lookups.
#[derive(Default)]
pub struct MemoryStore {
    artifacts: Mutex<Vec<Artifact>>,
    save_error: Mutex<Option<String>>,
    lookup_error: Mutex<Option<String>>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, artifact: Artifact) {
        let mut items = self.artifacts.lock().unwrap();
        items.push(artifact);
    }

    /// Make every subsequent `save` fail with this message until
    /// cleared with `None`.
    pub fn set_save_error(&self, message: Option<&str>) {
        *self.save_error.lock().unwrap() = message.map(|s| s.to_string());
    }

    /// Make every subsequent `latest_for_subject` fail until cleared.
    pub fn set_lookup_error(&self, message: Option<&str>) {
        *self.lookup_error.lock().unwrap() = message.map(|s| s.to_string());
    }

    /// How many times `latest_for_subject` has been called.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(&self, artifact: &Artifact) -> Result<String> {
        if let Some(msg) = self.save_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let mut items = self.artifacts.lock().unwrap();
        match items.iter().position(|a| a.id == artifact.id) {
            Some(i) => items[i] = artifact.clone(),
            None => items.push(artifact.clone()),
        }
        Ok(artifact.id.clone())
    }

    async fn latest_for_subject(
        &self,
        subject: &str,
        kind: GenerationKind,
        created_after: Option<&str>,
    ) -> Result<Option<Artifact>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.lookup_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let candidates: Vec<Artifact> = self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.subject == subject && a.kind == kind)
            .cloned()
            .collect();
        Ok(pick_latest(candidates, created_after))
    }

    async fn list(&self, subject: &str, kind: Option<GenerationKind>) -> Result<Vec<Artifact>> {
        let mut all: Vec<Artifact> = self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.subject == subject && kind.map_or(true, |k| a.kind == k))
            .cloned()
            .collect();
        all.sort_by_key(|a| std::cmp::Reverse(parse_ts(&a.created_at)));
        Ok(all)
    }
}
