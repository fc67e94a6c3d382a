//! negotiator CLI
//!
//! Runs the negotiation workflow against offline collaborators, with
//! checkpoints on disk so that a negotiation paused by one invocation can be
//! approved by a later one. Results are printed to stdout as JSON; logs go to
//! stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gategraph_checkpoint::{CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver};
use negotiator::mock::{MockRiskIntelligence, MockTextGenerator};
use negotiator::{
    AgencyLevel, Collaborators, LlmComplianceEvaluator, NegotiationRequest, NegotiationWorkflow,
    NegotiatorConfig,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "negotiator")]
#[command(about = "Contract negotiation workflow with human approval gates", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (yaml, toml or json)
    #[arg(short, long, global = true, env = "NEGOTIATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the checkpoint directory
    #[arg(long, global = true)]
    checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start negotiating a clause
    Start {
        /// Supplier identifier
        #[arg(short, long)]
        supplier: String,

        /// Clause text
        #[arg(long)]
        clause: String,

        /// Contract identifier
        #[arg(long)]
        contract: Option<String>,

        /// Thread id (generated when omitted)
        #[arg(short, long)]
        thread: Option<String>,

        /// Agency level: strict, medium, autonomous
        #[arg(short, long)]
        agency: Option<AgencyLevel>,
    },

    /// Answer the approval request of a paused negotiation
    Resume {
        /// Thread id
        #[arg(short, long)]
        thread: String,

        /// APPROVED or REJECTED
        #[arg(short, long)]
        status: String,

        /// Note for the drafter
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Show the latest checkpoint of a negotiation
    Inspect {
        /// Thread id
        #[arg(short, long)]
        thread: String,
    },

    /// List stored checkpoints of a negotiation, newest first
    History {
        /// Thread id
        #[arg(short, long)]
        thread: String,

        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the workflow graph as a Mermaid diagram
    Graph,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn offline_collaborators() -> Collaborators {
    let generator = Arc::new(MockTextGenerator::new().with_structured(
        "status",
        json!({
            "status": "NEEDS_REVIEW",
            "score": 50,
            "reasoning": "Mock evaluation: no LLM provider is configured.",
            "flagged_issues": []
        }),
    ));
    Collaborators::new(
        generator.clone(),
        Arc::new(LlmComplianceEvaluator::new(generator)),
        Arc::new(MockRiskIntelligence::new()),
    )
}

async fn open_saver(config: &NegotiatorConfig) -> anyhow::Result<Arc<dyn CheckpointSaver>> {
    if config.in_memory {
        tracing::warn!("in-memory checkpoints: paused negotiations will not survive this process");
        return Ok(Arc::new(InMemoryCheckpointSaver::new()));
    }
    let saver = FileCheckpointSaver::open(&config.checkpoint_dir)
        .await
        .with_context(|| {
            format!(
                "failed to open checkpoint directory {}",
                config.checkpoint_dir.display()
            )
        })?;
    Ok(Arc::new(saver))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(rust_log)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = NegotiatorConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(dir) = cli.checkpoint_dir {
        config.checkpoint_dir = dir;
    }

    let saver = open_saver(&config).await?;
    let options = config.workflow_options().context("failed to load policy")?;
    let workflow = NegotiationWorkflow::new(offline_collaborators(), saver, options)?;

    match cli.command {
        Commands::Start {
            supplier,
            clause,
            contract,
            thread,
            agency,
        } => {
            let mut request = NegotiationRequest::new(supplier, clause);
            request.thread_id = thread;
            request.contract_id = contract;
            request.agency_level = agency;
            print_json(&workflow.start(request).await?)?;
        }
        Commands::Resume {
            thread,
            status,
            feedback,
        } => {
            let answer = json!({
                "status": status.to_uppercase(),
                "feedback": feedback,
            });
            print_json(&workflow.resume_raw(&thread, answer).await?)?;
        }
        Commands::Inspect { thread } => match workflow.inspect(&thread).await? {
            Some(snapshot) => print_json(&snapshot)?,
            None => anyhow::bail!("no negotiation with thread id {}", thread),
        },
        Commands::History { thread, limit } => {
            print_json(&workflow.history(&thread, limit).await?)?;
        }
        Commands::Graph => {
            print!("{}", workflow.graph().to_mermaid());
        }
    }

    Ok(())
}
