use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use triad::config::Config;
use triad::ollama::OllamaClient;
use triad::pipeline::{Orchestrator, PipelineProgress};
use triad::search::DuckDuckGoClient;
use triad::store::SessionStore;
use triad::SessionStatus;

#[derive(Parser, Debug)]
#[command(
    name = "triad",
    version,
    about = "Three-agent research pipeline: research, summarize, critique"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the research pipeline on a query
    Run {
        /// The topic or question to research
        query: String,

        /// Ollama model to use (overrides config)
        #[arg(short, long, env = "TRIAD_MODEL")]
        model: Option<String>,

        /// Ollama host to use (overrides config)
        #[arg(long, env = "OLLAMA_HOST")]
        host: Option<String>,
    },
    /// List recent research sessions
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one session's full outputs
    Show { session_id: String },
    /// Delete a session
    Delete { session_id: String },
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("triad=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set logging subscriber: {e}"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let store = SessionStore::new(SessionStore::default_path());

    match cli.command {
        Command::Run { query, model, host } => run_pipeline(store, query, model, host).await,
        Command::History { limit } => {
            let sessions = store.list(limit).context("could not read session history")?;
            if sessions.is_empty() {
                println!("No research sessions yet.");
                return Ok(());
            }
            for session in sessions {
                let mut query = session.query.clone();
                if query.chars().count() > 60 {
                    query = format!("{}...", query.chars().take(60).collect::<String>());
                }
                println!(
                    "{}  [{}]  {}",
                    session.session_id, session.status, query
                );
            }
            Ok(())
        }
        Command::Show { session_id } => {
            let session = store
                .get(&session_id)
                .context("could not read session")?
                .with_context(|| format!("no session with id {session_id}"))?;
            println!("Query: {}\nStatus: {}\n", session.query, session.status);
            print_section("RESEARCH", &session.research_output);
            print_section("SUMMARY", &session.summary_output);
            print_section("CRITIQUE", &session.critique_output);
            Ok(())
        }
        Command::Delete { session_id } => {
            store
                .delete(&session_id)
                .context("could not delete session")?;
            println!("Deleted session {session_id}");
            Ok(())
        }
    }
}

async fn run_pipeline(
    store: SessionStore,
    query: String,
    model: Option<String>,
    host: Option<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let mut config = Config::load();
    if let Some(model) = model {
        config.ollama.model = model;
    }
    if let Some(host) = host {
        config.ollama.host = host;
    }

    // Store problems are availability-over-durability: warn and keep going.
    if let Err(e) = store.init() {
        tracing::warn!(error = %e, "session store unavailable, results will not be persisted");
    }

    let provider = Arc::new(OllamaClient::with_config(
        config.ollama.host.clone(),
        config.ollama.model.clone(),
    ));
    let search = Arc::new(DuckDuckGoClient::new());

    let mut orchestrator = Orchestrator::new(config, provider, search, store);

    let (tx, mut rx) = mpsc::unbounded_channel();
    orchestrator.set_progress_channel(tx);
    let announcer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if let PipelineProgress::StageStarted(stage) = progress {
                println!("[{}/3] {}...", stage.position(), stage.label());
            }
        }
    });

    let result = orchestrator.run(&query).await;
    drop(orchestrator);
    let _ = announcer.await;

    println!();
    print_section("RESEARCH", &result.research);
    print_section("SUMMARY", &result.summary);
    print_section("CRITIQUE", &result.critique);
    println!("Session: {}  Status: {}", result.session_id, result.status);

    if result.status == SessionStatus::Failed {
        bail!("research pipeline failed; see outputs above");
    }
    Ok(())
}

fn print_section(title: &str, body: &str) {
    println!("{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
    println!("{body}\n");
}
