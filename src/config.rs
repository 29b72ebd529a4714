use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::task::TaskLimits;

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            host: default_host(),
            model: default_model(),
        }
    }
}

fn default_stage_pause_ms() -> u64 {
    2000
}

fn default_researcher_max_iterations() -> usize {
    5
}

fn default_researcher_max_calls_per_minute() -> u32 {
    10
}

fn default_reviewer_max_iterations() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Pause between stages, to be polite to external providers. A scheduling
    /// courtesy, not a correctness requirement.
    #[serde(default = "default_stage_pause_ms")]
    pub stage_pause_ms: u64,
    #[serde(default)]
    pub limits: TaskLimits,
    #[serde(default = "default_researcher_max_iterations")]
    pub researcher_max_iterations: usize,
    #[serde(default = "default_researcher_max_calls_per_minute")]
    pub researcher_max_calls_per_minute: u32,
    #[serde(default = "default_reviewer_max_iterations")]
    pub summarizer_max_iterations: usize,
    #[serde(default = "default_reviewer_max_iterations")]
    pub critic_max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            stage_pause_ms: default_stage_pause_ms(),
            limits: TaskLimits::default(),
            researcher_max_iterations: default_researcher_max_iterations(),
            researcher_max_calls_per_minute: default_researcher_max_calls_per_minute(),
            summarizer_max_iterations: default_reviewer_max_iterations(),
            critic_max_iterations: default_reviewer_max_iterations(),
        }
    }
}

fn default_max_results() -> usize {
    3
}

fn default_snippet_max_chars() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_results: default_max_results(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(error = %e, "error parsing config.toml, using defaults")
                    }
                },
                Err(e) => tracing::warn!(error = %e, "error reading config.toml, using defaults"),
            }
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/triad")
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.pipeline.stage_pause_ms, 2000);
        assert_eq!(config.pipeline.limits.summarize_input_max_chars, 2000);
        assert_eq!(config.pipeline.limits.critique_summary_max_chars, 1000);
        assert_eq!(config.pipeline.limits.critique_research_max_chars, 1500);
        assert_eq!(config.search.max_results, 3);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ollama]
            model = "mistral"

            [pipeline]
            stage_pause_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.ollama.host, "http://localhost:11434");
        assert_eq!(config.pipeline.stage_pause_ms, 0);
        assert_eq!(config.pipeline.researcher_max_iterations, 5);
        assert_eq!(config.search.snippet_max_chars, 200);
    }
}
