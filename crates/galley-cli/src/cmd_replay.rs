use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use galley_core::GenerationKind;
use galley_pipeline::rewards::StdoutRewards;
use galley_pipeline::transport::ReplayTransport;
use galley_pipeline::{PipelineConfig, PipelineController};
use galley_store::LocalStore;

use crate::follow;

/// Execute `galley replay <file>`
#[allow(clippy::too_many_arguments)]
pub fn execute(
    file: &Path,
    kind: &str,
    subject: &str,
    selection: &str,
    count: Option<usize>,
    chunk_size: usize,
    delay_ms: Option<u64>,
    save: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let kind: GenerationKind = kind.parse()?;
    let config = PipelineConfig::load(config_path);
    let request = follow::build_request(kind, subject, selection, count);

    let transport = ReplayTransport::new(file)
        .with_chunk_size(chunk_size)
        .with_delay(delay_ms.map(Duration::from_millis));
    let controller = PipelineController::new(
        Arc::new(transport),
        Arc::new(LocalStore::open_default()),
        Arc::new(StdoutRewards),
        config,
    );

    println!(
        "Replaying {} generation from {} ({} units expected)",
        kind.display_name(),
        file.display(),
        request.unit_count
    );

    follow::ctrlc_cancel(controller.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        controller.start(request)?;
        follow::follow(&controller, save).await
    })
}
