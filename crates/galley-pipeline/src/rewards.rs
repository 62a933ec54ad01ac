//! Completion rewards. Grants are fire-and-forget: a finished
//! generation must read as finished even when the rewards backend is
//! down.

use std::sync::Mutex;
use std::time::Duration;

use galley_core::GenerationKind;
use serde::Serialize;

const TIMEOUT: Duration = Duration::from_secs(5);

/// One grant per completed generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardGrant {
    pub subject: String,
    pub kind: GenerationKind,
    pub artifact_id: Option<String>,
    /// True when the result arrived via recovery instead of the live
    /// stream.
    pub recovered: bool,
}

/// Trait for delivering grants. Implementations log and swallow their
/// own errors; callers never wait on or fail with a grant.
#[async_trait::async_trait]
pub trait RewardSink: Send + Sync {
    async fn grant(&self, grant: &RewardGrant);
}

// ── Webhook sink ──

/// POSTs grants to a webhook as JSON.
pub struct WebhookRewards {
    url: String,
}

impl WebhookRewards {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl RewardSink for WebhookRewards {
    async fn grant(&self, grant: &RewardGrant) {
        let payload = format_grant(grant);
        let send = async {
            let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;
            client
                .post(&self.url)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, anyhow::Error>(())
        };
        if let Err(e) = send.await {
            tracing::warn!("reward grant for {} failed: {e:#}", grant.subject);
        }
    }
}

fn format_grant(grant: &RewardGrant) -> serde_json::Value {
    serde_json::json!({
        "event_type": "generation_completed",
        "data": {
            "subject": grant.subject,
            "kind": grant.kind.as_str(),
            "artifact_id": grant.artifact_id,
            "recovered": grant.recovered,
        },
    })
}

// ── Stdout sink ──

/// Prints grants. Used by the CLI when no webhook is configured.
pub struct StdoutRewards;

#[async_trait::async_trait]
impl RewardSink for StdoutRewards {
    async fn grant(&self, grant: &RewardGrant) {
        println!(
            "🏅 Reward: {} finished for {}",
            grant.kind.display_name(),
            grant.subject
        );
    }
}

// ── Collecting sink (tests) ──

/// Records grants for assertions.
#[derive(Default)]
pub struct CollectRewards {
    grants: Mutex<Vec<RewardGrant>>,
}

impl CollectRewards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self) -> Vec<RewardGrant> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RewardSink for CollectRewards {
    async fn grant(&self, grant: &RewardGrant) {
        self.grants.lock().unwrap().push(grant.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> RewardGrant {
        RewardGrant {
            subject: "user-1".into(),
            kind: GenerationKind::MealPlan,
            artifact_id: Some("art_01abc".into()),
            recovered: false,
        }
    }

    #[test]
    fn format_grant_payload() {
        let payload = format_grant(&grant());
        assert_eq!(payload["event_type"], "generation_completed");
        assert_eq!(payload["data"]["subject"], "user-1");
        assert_eq!(payload["data"]["kind"], "meal_plan");
        assert_eq!(payload["data"]["artifact_id"], "art_01abc");
        assert_eq!(payload["data"]["recovered"], false);
    }

    #[tokio::test]
    async fn collect_sink_records_grants() {
        let sink = CollectRewards::new();
        sink.grant(&grant()).await;
        let mut recovered = grant();
        recovered.recovered = true;
        sink.grant(&recovered).await;

        let grants = sink.grants();
        assert_eq!(grants.len(), 2);
        assert!(!grants[0].recovered);
        assert!(grants[1].recovered);
    }
}
