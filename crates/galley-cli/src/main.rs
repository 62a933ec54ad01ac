mod cmd_artifacts;
mod cmd_generate;
mod cmd_replay;
mod follow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "galley",
    version,
    about = "Streaming generation pipeline for meal plans, recipes, and shopping lists"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded generation stream through the full pipeline
    Replay {
        /// Path to a recorded stream (one JSON event per line)
        file: PathBuf,
        /// What to generate: meal-plan, recipes, or shopping-list
        #[arg(long, default_value = "recipes")]
        kind: String,
        /// Subject (user or profile id) the result belongs to
        #[arg(long, default_value = "local-dev")]
        subject: String,
        /// Upstream selection (goal or profile id) sent with the request
        #[arg(long, default_value = "default")]
        selection: String,
        /// Expected unit count (defaults to 7 for meal plans, 5 for
        /// recipes, 6 for shopping lists)
        #[arg(long)]
        count: Option<usize>,
        /// Bytes per replayed chunk
        #[arg(long, default_value = "256")]
        chunk_size: usize,
        /// Pause between chunks, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Persist the result to the local store on completion
        #[arg(long)]
        save: bool,
        /// Pipeline config file (defaults to the per-user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a live generation against a streaming HTTP endpoint
    Generate {
        /// Endpoint that streams line-framed JSON generation events
        endpoint: String,
        /// Bearer token for the endpoint
        #[arg(long)]
        token: Option<String>,
        /// What to generate: meal-plan, recipes, or shopping-list
        #[arg(long, default_value = "meal-plan")]
        kind: String,
        /// Subject (user or profile id) the result belongs to
        #[arg(long, default_value = "local-dev")]
        subject: String,
        /// Upstream selection (goal or profile id) sent with the request
        #[arg(long, default_value = "default")]
        selection: String,
        /// Expected unit count (defaults to 7 for meal plans, 5 for
        /// recipes, 6 for shopping lists)
        #[arg(long)]
        count: Option<usize>,
        /// Persist the result to the local store on completion
        #[arg(long)]
        save: bool,
        /// Pipeline config file (defaults to the per-user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List locally stored artifacts for a subject
    Artifacts {
        /// Subject whose artifacts to list
        #[arg(long, default_value = "local-dev")]
        subject: String,
        /// Restrict to one kind: meal-plan, recipes, or shopping-list
        #[arg(long)]
        kind: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Replay {
            file,
            kind,
            subject,
            selection,
            count,
            chunk_size,
            delay_ms,
            save,
            config,
        } => cmd_replay::execute(
            &file,
            &kind,
            &subject,
            &selection,
            count,
            chunk_size,
            delay_ms,
            save,
            config.as_deref(),
        ),
        Command::Generate {
            endpoint,
            token,
            kind,
            subject,
            selection,
            count,
            save,
            config,
        } => cmd_generate::execute(
            &endpoint,
            token.as_deref(),
            &kind,
            &subject,
            &selection,
            count,
            save,
            config.as_deref(),
        ),
        Command::Artifacts {
            subject,
            kind,
            json,
        } => cmd_artifacts::execute(&subject, kind.as_deref(), json),
    }
}
