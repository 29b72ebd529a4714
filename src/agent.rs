use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::AgentError;
use crate::ollama::CapabilityProvider;
use crate::search::SearchAdapter;
use crate::task::{Stage, TaskSpec};

/// What an agent is allowed to do besides plain text generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    PlainGeneration,
    GenerationWithSearch,
}

/// Per-run agent configuration. Built fresh for every pipeline run so no
/// state leaks across sessions.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub capability: Capability,
    pub max_iterations: usize,
    pub max_calls_per_minute: Option<u32>,
}

impl AgentDescriptor {
    /// Factory keyed on the pipeline stage.
    pub fn for_stage(stage: Stage, config: &PipelineConfig) -> Self {
        match stage {
            Stage::Research => AgentDescriptor {
                role: "Senior Research Analyst".to_string(),
                goal: "Gather comprehensive, accurate, and up-to-date information on \
                       research topics. Be concise and focus on key insights."
                    .to_string(),
                backstory: "You are an expert research analyst with years of experience in \
                            gathering and synthesizing information from diverse sources. You \
                            excel at identifying credible sources, extracting key insights, \
                            and providing well-structured research reports."
                    .to_string(),
                capability: Capability::GenerationWithSearch,
                max_iterations: config.researcher_max_iterations,
                max_calls_per_minute: Some(config.researcher_max_calls_per_minute),
            },
            Stage::Summarize => AgentDescriptor {
                role: "Content Summarizer".to_string(),
                goal: "Condense research findings into clear, concise summaries while \
                       preserving key insights. Be very concise."
                    .to_string(),
                backstory: "You are a skilled technical writer and editor who excels at \
                            distilling complex information into easily understandable \
                            formats, identifying core concepts and presenting them logically."
                    .to_string(),
                capability: Capability::PlainGeneration,
                max_iterations: config.summarizer_max_iterations,
                max_calls_per_minute: None,
            },
            Stage::Critique => AgentDescriptor {
                role: "Quality Assurance Critic".to_string(),
                goal: "Validate research quality, identify gaps, and ensure factual \
                       accuracy. Provide concise feedback."
                    .to_string(),
                backstory: "You are a meticulous quality assurance expert with a background \
                            in academic research and fact-checking. You have zero tolerance \
                            for inaccuracies and always push for comprehensive coverage."
                    .to_string(),
                capability: Capability::PlainGeneration,
                max_iterations: config.critic_max_iterations,
                max_calls_per_minute: None,
            },
        }
    }
}

const SEARCH_DIRECTIVE_INSTRUCTIONS: &str = r#"
You have access to a web search tool. To search the web, respond with ONLY
this JSON on a single line and nothing else:

{"action": "web_search", "query": "<search terms>"}

After you receive search results, either search again (at most a couple of
times) or produce your final answer as plain text. Never respond with JSON
once you have enough information."#;

/// A named role bound to the capability provider and, for search-capable
/// agents, the search adapter. Invoked once per stage.
pub struct Agent {
    descriptor: AgentDescriptor,
    provider: Arc<dyn CapabilityProvider>,
    search: Option<SearchAdapter>,
}

impl Agent {
    pub fn new(
        descriptor: AgentDescriptor,
        provider: Arc<dyn CapabilityProvider>,
        search: Option<SearchAdapter>,
    ) -> Self {
        Agent {
            descriptor,
            provider,
            search,
        }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    fn system_prompt(&self) -> String {
        let mut system = format!(
            "You are a {}.\n\nGoal: {}\n\n{}",
            self.descriptor.role, self.descriptor.goal, self.descriptor.backstory
        );
        if self.descriptor.capability == Capability::GenerationWithSearch
            && self.search.is_some()
        {
            system.push_str(SEARCH_DIRECTIVE_INSTRUCTIONS);
        }
        system
    }

    /// Run the task to completion. Search-capable agents may loop through
    /// search directives, bounded by `max_iterations` provider calls. No
    /// internal retry: the pipeline's failure handling is the only recovery
    /// layer.
    pub async fn invoke(&self, spec: &TaskSpec) -> Result<String, AgentError> {
        let system = self.system_prompt();
        let base_prompt = format!(
            "{}\n\nExpected output: {}",
            spec.instruction, spec.expected_output
        );

        let mut search_context = String::new();

        for iteration in 1..=self.descriptor.max_iterations {
            if iteration > 1 {
                if let Some(cpm) = self.descriptor.max_calls_per_minute {
                    if cpm > 0 {
                        tokio::time::sleep(Duration::from_millis(60_000 / u64::from(cpm))).await;
                    }
                }
            }

            let prompt = if search_context.is_empty() {
                base_prompt.clone()
            } else {
                format!(
                    "{base_prompt}\n\n{search_context}\n\
                     Using the search results above, complete the task."
                )
            };

            let text = self.provider.generate(&system, &prompt).await?;

            if let (Capability::GenerationWithSearch, Some(search)) =
                (self.descriptor.capability, &self.search)
            {
                if let Some(search_query) = parse_search_directive(&text) {
                    info!(
                        role = %self.descriptor.role,
                        iteration,
                        query = %search_query,
                        "agent requested a web search"
                    );
                    let results = search.search_formatted(&search_query).await;
                    search_context.push_str(&format!(
                        "Search results from iteration {iteration}:\n{results}\n"
                    ));
                    continue;
                }
            }

            debug!(role = %self.descriptor.role, iteration, "agent produced final text");
            return Ok(text);
        }

        Err(AgentError::IterationLimit(self.descriptor.max_iterations))
    }
}

/// Detect a single web-search tool directive in a model response.
fn parse_search_directive(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    if value.get("action")?.as_str()? != "web_search" {
        return None;
    }
    value.get("query")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::error::ProviderError;
    use crate::search::{SearchProvider, SearchResult};
    use crate::task;
    use crate::task::TaskLimits;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoProvider {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityProvider for EchoProvider {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl SearchProvider for EmptySearch {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, ProviderError> {
            Ok(vec![])
        }
    }

    #[test]
    fn factory_assigns_search_capability_to_researcher_only() {
        let config = PipelineConfig::default();
        let researcher = AgentDescriptor::for_stage(Stage::Research, &config);
        let summarizer = AgentDescriptor::for_stage(Stage::Summarize, &config);
        let critic = AgentDescriptor::for_stage(Stage::Critique, &config);

        assert_eq!(researcher.capability, Capability::GenerationWithSearch);
        assert_eq!(summarizer.capability, Capability::PlainGeneration);
        assert_eq!(critic.capability, Capability::PlainGeneration);
        assert_eq!(researcher.max_iterations, 5);
        assert_eq!(summarizer.max_iterations, 3);
        assert_eq!(researcher.max_calls_per_minute, Some(10));
        assert_eq!(critic.max_calls_per_minute, None);
    }

    #[test]
    fn directive_parsing_accepts_only_well_formed_search_calls() {
        assert_eq!(
            parse_search_directive(r#"{"action": "web_search", "query": "rust async"}"#),
            Some("rust async".to_string())
        );
        assert_eq!(parse_search_directive("plain text answer"), None);
        assert_eq!(
            parse_search_directive(r#"{"action": "other", "query": "x"}"#),
            None
        );
        assert_eq!(parse_search_directive(r#"{"action": "web_search"}"#), None);
    }

    #[tokio::test]
    async fn plain_reply_finishes_in_one_iteration() {
        let provider = Arc::new(EchoProvider {
            reply: "FINAL".to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = PipelineConfig::default();
        let descriptor = AgentDescriptor::for_stage(Stage::Summarize, &config);
        let agent = Agent::new(descriptor, provider.clone(), None);

        let spec = task::summarize("some research", &TaskLimits::default());
        let out = agent.invoke(&spec).await.unwrap();
        assert_eq!(out, "FINAL");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn endless_search_directives_hit_the_iteration_limit() {
        let provider = Arc::new(EchoProvider {
            reply: r#"{"action": "web_search", "query": "more"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = PipelineConfig::default();
        let mut descriptor = AgentDescriptor::for_stage(Stage::Research, &config);
        descriptor.max_iterations = 3;
        descriptor.max_calls_per_minute = None;
        let adapter = SearchAdapter::new(Arc::new(EmptySearch), &SearchConfig::default());
        let agent = Agent::new(descriptor, provider.clone(), Some(adapter));

        let spec = task::research("anything", &TaskLimits::default());
        let err = agent.invoke(&spec).await.unwrap_err();
        assert!(matches!(err, AgentError::IterationLimit(3)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn plain_generation_agents_treat_json_as_final_text() {
        // A summarizer has no search tool, so a JSON-looking reply is just
        // its answer, not a directive.
        let provider = Arc::new(EchoProvider {
            reply: r#"{"action": "web_search", "query": "x"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = PipelineConfig::default();
        let descriptor = AgentDescriptor::for_stage(Stage::Critique, &config);
        let agent = Agent::new(descriptor, provider.clone(), None);

        let spec = task::critique("s", "r", &TaskLimits::default());
        let out = agent.invoke(&spec).await.unwrap();
        assert!(out.contains("web_search"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
