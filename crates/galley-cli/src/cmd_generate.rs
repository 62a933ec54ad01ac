use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use galley_core::GenerationKind;
use galley_pipeline::http::HttpTransport;
use galley_pipeline::rewards::{RewardSink, StdoutRewards, WebhookRewards};
use galley_pipeline::{PipelineConfig, PipelineController};
use galley_store::LocalStore;

use crate::follow;

/// Execute `galley generate <endpoint>`
#[allow(clippy::too_many_arguments)]
pub fn execute(
    endpoint: &str,
    token: Option<&str>,
    kind: &str,
    subject: &str,
    selection: &str,
    count: Option<usize>,
    save: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let kind: GenerationKind = kind.parse()?;
    let config = PipelineConfig::load(config_path);
    let request = follow::build_request(kind, subject, selection, count);

    let transport = HttpTransport::new(endpoint).with_auth_token(token.map(String::from));
    let rewards: Arc<dyn RewardSink> = match &config.rewards_webhook {
        Some(url) => Arc::new(WebhookRewards::new(url.clone())),
        None => Arc::new(StdoutRewards),
    };
    let controller = PipelineController::new(
        Arc::new(transport),
        Arc::new(LocalStore::open_default()),
        rewards,
        config,
    );

    println!(
        "Generating {} for \"{subject}\" via {endpoint} ({} units expected)",
        kind.display_name(),
        request.unit_count
    );

    follow::ctrlc_cancel(controller.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        controller.start(request)?;
        follow::follow(&controller, save).await
    })
}
