//! Shared pieces of the streaming commands: request assembly and the
//! progress-following loop.

use anyhow::{bail, Result};
use galley_core::{GenerationKind, GenerationRequest, KeyScheme};
use galley_pipeline::{PipelineController, SessionStep};

/// Build a generation request from CLI flags. Meal plans get calendar
/// keys starting today; recipes and shopping lists get ordinal keys.
pub fn build_request(
    kind: GenerationKind,
    subject: &str,
    selection: &str,
    count: Option<usize>,
) -> GenerationRequest {
    let unit_count = count.unwrap_or(match kind {
        GenerationKind::MealPlan => 7,
        GenerationKind::Recipes => 5,
        GenerationKind::ShoppingList => 6,
    });
    let key_scheme = match kind {
        GenerationKind::MealPlan => KeyScheme::DateFrom {
            start: time::OffsetDateTime::now_utc().date(),
        },
        GenerationKind::Recipes => KeyScheme::Ordinal {
            prefix: "recipe".into(),
        },
        GenerationKind::ShoppingList => KeyScheme::Ordinal {
            prefix: "category".into(),
        },
    };
    GenerationRequest {
        kind,
        subject: subject.to_string(),
        selection: selection.to_string(),
        unit_count,
        key_scheme,
        params: serde_json::Value::Null,
    }
}

/// Cancel the in-flight session on Ctrl+C. The follow loop sees the
/// wiped snapshot and exits cleanly.
pub fn ctrlc_cancel(controller: PipelineController) {
    let _ = ctrlc::set_handler(move || {
        controller.cancel();
    });
}

/// Print progress snapshots until the session reaches a terminal step,
/// then save or discard the result per `save`. Returns Err when the
/// session ends in the Error step.
pub async fn follow(controller: &PipelineController, save: bool) -> Result<()> {
    let mut rx = controller.subscribe();
    let mut last = (0u8, String::new());

    loop {
        let view = rx.borrow_and_update().clone();
        match view.step {
            SessionStep::Generating => {
                let line = (view.progress.percentage, view.progress.subtitle.clone());
                if line != last {
                    println!(
                        "  ▶ {:>3}% {} ({})",
                        view.progress.percentage, view.progress.title, view.progress.subtitle
                    );
                    last = line;
                }
            }
            SessionStep::Validation => {
                println!("\n✓ {}", view.progress.title);
                for unit in &view.units {
                    println!("    ✓ {}", unit.key);
                }
                if let Some(summary) = &view.summary {
                    println!("  {summary}");
                }
                if save {
                    let artifact_id = controller.save().await?;
                    println!("Saved artifact {artifact_id}.");
                } else {
                    controller.discard();
                    println!("Result discarded (pass --save to keep it).");
                }
                return Ok(());
            }
            SessionStep::Error => {
                let message = view
                    .failure
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "generation failed".into());
                println!("\n✗ {}", view.progress.title);
                bail!("{message}");
            }
            SessionStep::Configuration => {
                // Only published after a cancel wiped the session.
                if view.session_id.is_none() {
                    println!("\nCancelled.");
                    return Ok(());
                }
            }
        }

        if rx.changed().await.is_err() {
            bail!("pipeline stopped publishing");
        }
    }
}
