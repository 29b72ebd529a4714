use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentDescriptor, Capability};
use crate::config::Config;
use crate::error::AgentError;
use crate::ollama::CapabilityProvider;
use crate::search::{SearchAdapter, SearchProvider};
use crate::store::{SessionStatus, SessionStore, SessionUpdate};
use crate::task::{self, Stage};

/// Placeholder written for the summary when an earlier stage failed.
pub const SUMMARY_UPSTREAM_PLACEHOLDER: &str =
    "Unable to generate summary due to an upstream failure";

/// Placeholder written for the critique when an earlier stage failed.
pub const CRITIQUE_UPSTREAM_PLACEHOLDER: &str =
    "Unable to provide critique due to an upstream failure";

/// Fire-and-forget progress notifications. Carry no data needed for
/// correctness; a driver may subscribe or ignore them.
#[derive(Debug, Clone)]
pub enum PipelineProgress {
    Started,
    StageStarted(Stage),
    Completed,
    Failed(Stage),
}

/// What `run` returns for every invocation, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub session_id: String,
    pub query: String,
    pub research: String,
    pub summary: String,
    pub critique: String,
    pub status: SessionStatus,
}

struct StageOutputs {
    research: String,
    summary: String,
    critique: String,
}

struct StageFailure {
    stage: Stage,
    error: AgentError,
    research: Option<String>,
    summary: Option<String>,
}

/// Sequences the three agent invocations, threading each stage's output into
/// the next, with persistence checkpoints before and after the stages run.
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn CapabilityProvider>,
    search: Arc<dyn SearchProvider>,
    store: SessionStore,
    progress_tx: Option<mpsc::UnboundedSender<PipelineProgress>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn CapabilityProvider>,
        search: Arc<dyn SearchProvider>,
        store: SessionStore,
    ) -> Self {
        Orchestrator {
            config,
            provider,
            search,
            store,
            progress_tx: None,
        }
    }

    pub fn set_progress_channel(&mut self, tx: mpsc::UnboundedSender<PipelineProgress>) {
        self.progress_tx = Some(tx);
    }

    /// Pass-through store access for history browsing.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn send_progress(&self, progress: PipelineProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Run the full pipeline for one query. Every stage failure is captured
    /// into the returned result and the persisted record; this method never
    /// surfaces stage errors to the caller. Persistence failures are logged
    /// and the in-memory result is still returned.
    pub async fn run(&self, query: &str) -> SessionResult {
        let session_id = Uuid::new_v4().to_string();
        info!(session_id = %session_id, query = %query, "starting research pipeline");
        self.send_progress(PipelineProgress::Started);

        // Durability checkpoint: a crash mid-pipeline leaves a discoverable
        // in_progress record.
        if let Err(e) = self.store.insert(&session_id, query) {
            warn!(session_id = %session_id, error = %e, "could not persist initial session");
        }

        match self.execute_stages(query).await {
            Ok(outputs) => {
                self.persist(
                    &session_id,
                    &outputs.research,
                    &outputs.summary,
                    &outputs.critique,
                    SessionStatus::Completed,
                );
                self.send_progress(PipelineProgress::Completed);
                info!(session_id = %session_id, "pipeline completed");
                SessionResult {
                    session_id,
                    query: query.to_string(),
                    research: outputs.research,
                    summary: outputs.summary,
                    critique: outputs.critique,
                    status: SessionStatus::Completed,
                }
            }
            Err(failure) => {
                let error_text = failure.error.to_string();
                warn!(
                    session_id = %session_id,
                    stage = failure.stage.label(),
                    error = %error_text,
                    "pipeline stage failed"
                );

                let (research, summary, critique) = match failure.stage {
                    Stage::Research => (
                        format!("Research failed: {error_text}"),
                        SUMMARY_UPSTREAM_PLACEHOLDER.to_string(),
                        CRITIQUE_UPSTREAM_PLACEHOLDER.to_string(),
                    ),
                    Stage::Summarize => (
                        failure.research.unwrap_or_default(),
                        format!("Summarization failed: {error_text}"),
                        CRITIQUE_UPSTREAM_PLACEHOLDER.to_string(),
                    ),
                    Stage::Critique => (
                        failure.research.unwrap_or_default(),
                        failure.summary.unwrap_or_default(),
                        format!("Critique failed: {error_text}"),
                    ),
                };

                self.persist(
                    &session_id,
                    &research,
                    &summary,
                    &critique,
                    SessionStatus::Failed,
                );
                self.send_progress(PipelineProgress::Failed(failure.stage));
                SessionResult {
                    session_id,
                    query: query.to_string(),
                    research,
                    summary,
                    critique,
                    status: SessionStatus::Failed,
                }
            }
        }
    }

    async fn execute_stages(&self, query: &str) -> Result<StageOutputs, StageFailure> {
        let limits = &self.config.pipeline.limits;

        // Agents are built fresh per run so nothing leaks across sessions.
        let researcher = self.build_agent(Stage::Research);
        let summarizer = self.build_agent(Stage::Summarize);
        let critic = self.build_agent(Stage::Critique);

        self.announce_stage(Stage::Research).await;
        let spec = task::research(query, limits);
        let research = researcher.invoke(&spec).await.map_err(|error| StageFailure {
            stage: Stage::Research,
            error,
            research: None,
            summary: None,
        })?;
        info!(stage = "research", chars = research.len(), "stage output recorded");

        self.announce_stage(Stage::Summarize).await;
        let spec = task::summarize(&research, limits);
        let summary = summarizer.invoke(&spec).await.map_err(|error| StageFailure {
            stage: Stage::Summarize,
            error,
            research: Some(research.clone()),
            summary: None,
        })?;
        info!(stage = "summarize", chars = summary.len(), "stage output recorded");

        self.announce_stage(Stage::Critique).await;
        let spec = task::critique(&summary, &research, limits);
        let critique = critic.invoke(&spec).await.map_err(|error| StageFailure {
            stage: Stage::Critique,
            error,
            research: Some(research.clone()),
            summary: Some(summary.clone()),
        })?;
        info!(stage = "critique", chars = critique.len(), "stage output recorded");

        Ok(StageOutputs {
            research,
            summary,
            critique,
        })
    }

    fn build_agent(&self, stage: Stage) -> Agent {
        let descriptor = AgentDescriptor::for_stage(stage, &self.config.pipeline);
        let search = match descriptor.capability {
            Capability::GenerationWithSearch => Some(SearchAdapter::new(
                self.search.clone(),
                &self.config.search,
            )),
            Capability::PlainGeneration => None,
        };
        Agent::new(descriptor, self.provider.clone(), search)
    }

    /// Announce the stage about to run, then honor the fixed inter-stage
    /// pause. Neither affects control flow.
    async fn announce_stage(&self, stage: Stage) {
        self.send_progress(PipelineProgress::StageStarted(stage));
        let pause = self.config.pipeline.stage_pause_ms;
        if pause > 0 {
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }

    fn persist(
        &self,
        session_id: &str,
        research: &str,
        summary: &str,
        critique: &str,
        status: SessionStatus,
    ) {
        let update = SessionUpdate {
            research_output: Some(research.to_string()),
            summary_output: Some(summary.to_string()),
            critique_output: Some(critique.to_string()),
            status: Some(status),
        };
        if let Err(e) = self.store.update(session_id, &update) {
            warn!(session_id = %session_id, error = %e, "could not persist session outputs");
        }
    }
}
