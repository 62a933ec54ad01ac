use anyhow::Result;
use galley_core::GenerationKind;
use galley_store::{ArtifactStore, LocalStore};

/// Execute `galley artifacts`
pub fn execute(subject: &str, kind: Option<&str>, json: bool) -> Result<()> {
    let kind: Option<GenerationKind> = kind.map(str::parse).transpose()?;
    let store = LocalStore::open_default();

    let rt = tokio::runtime::Runtime::new()?;
    let artifacts = rt.block_on(store.list(subject, kind))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No artifacts found for \"{subject}\".");
        return Ok(());
    }

    println!("Artifacts for \"{subject}\" ({}):\n", artifacts.len());
    for artifact in &artifacts {
        let icon = if artifact.is_complete() { "✓" } else { "✗" };
        let summary = artifact.summary.as_deref().unwrap_or("");
        println!(
            "  {icon} {}  {:<13}  {}  {} units  {summary}",
            artifact.id,
            artifact.kind.as_str(),
            artifact.created_at,
            artifact.total_units
        );
    }
    Ok(())
}
