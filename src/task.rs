use serde::{Deserialize, Serialize};

/// Appended whenever an upstream text is cut to a ceiling, so the model (and
/// anyone reading the stored prompt) can see information was dropped.
pub const TRUNCATION_MARKER: &str = "... [content truncated for length]";

/// The three ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    Summarize,
    Critique,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Research => "Research",
            Stage::Summarize => "Summarization",
            Stage::Critique => "Critique",
        }
    }

    /// 1-based position in the pipeline, for progress announcements.
    pub fn position(&self) -> usize {
        match self {
            Stage::Research => 1,
            Stage::Summarize => 2,
            Stage::Critique => 3,
        }
    }
}

/// Structured instruction payload for one stage invocation. Built fresh per
/// stage, never persisted. The expected-output descriptor is an opaque
/// natural-language contract; nothing validates it programmatically.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub stage: Stage,
    pub instruction: String,
    pub expected_output: String,
}

fn default_summarize_input_max_chars() -> usize {
    2000
}

fn default_critique_summary_max_chars() -> usize {
    1000
}

fn default_critique_research_max_chars() -> usize {
    1500
}

fn default_research_word_ceiling() -> usize {
    500
}

fn default_summary_word_ceiling() -> usize {
    200
}

fn default_critique_word_ceiling() -> usize {
    150
}

/// Input/output size ceilings per stage. The input ceilings bound the prompt
/// payload deterministically; the word ceilings are embedded in instructions
/// as a request, not enforced on the provider's output. The critique stage's
/// input ceilings are intentionally distinct from the summarize ceiling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskLimits {
    #[serde(default = "default_summarize_input_max_chars")]
    pub summarize_input_max_chars: usize,
    #[serde(default = "default_critique_summary_max_chars")]
    pub critique_summary_max_chars: usize,
    #[serde(default = "default_critique_research_max_chars")]
    pub critique_research_max_chars: usize,
    #[serde(default = "default_research_word_ceiling")]
    pub research_word_ceiling: usize,
    #[serde(default = "default_summary_word_ceiling")]
    pub summary_word_ceiling: usize,
    #[serde(default = "default_critique_word_ceiling")]
    pub critique_word_ceiling: usize,
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            summarize_input_max_chars: default_summarize_input_max_chars(),
            critique_summary_max_chars: default_critique_summary_max_chars(),
            critique_research_max_chars: default_critique_research_max_chars(),
            research_word_ceiling: default_research_word_ceiling(),
            summary_word_ceiling: default_summary_word_ceiling(),
            critique_word_ceiling: default_critique_word_ceiling(),
        }
    }
}

/// Cut `text` to at most `max_chars` characters, appending the truncation
/// marker when anything was dropped.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{TRUNCATION_MARKER}")
}

/// Build the research stage's task from the raw query.
pub fn research(query: &str, limits: &TaskLimits) -> TaskSpec {
    let words = limits.research_word_ceiling;
    TaskSpec {
        stage: Stage::Research,
        instruction: format!(
            "Conduct focused research on: {query}\n\n\
             Requirements:\n\
             - Use the web search tool to gather current information (at most 2-3 searches)\n\
             - Focus on recent and credible sources\n\
             - Extract only key facts, trends, and insights\n\
             - Provide source references\n\n\
             Provide a concise research report with:\n\
             1. Brief executive summary\n\
             2. Key findings with evidence\n\
             3. Important trends\n\
             4. Source credibility assessment\n\
             5. Potential implications\n\n\
             Keep your response under {words} words."
        ),
        expected_output: format!("Concise research report with key insights (under {words} words)"),
    }
}

/// Build the summarize stage's task from the research output, truncated to
/// the summarize input ceiling.
pub fn summarize(research_output: &str, limits: &TaskLimits) -> TaskSpec {
    let input = truncate(research_output, limits.summarize_input_max_chars);
    let words = limits.summary_word_ceiling;
    TaskSpec {
        stage: Stage::Summarize,
        instruction: format!(
            "Summarize the following research findings concisely:\n\n\
             {input}\n\n\
             Create a summary that:\n\
             - Highlights only the most important insights\n\
             - Preserves key details but stays brief\n\
             - Uses clear, accessible language\n\
             - Maintains factual accuracy\n\n\
             Structure your summary with:\n\
             1. Main conclusion (1-2 sentences)\n\
             2. Key supporting points (3-4 bullet points)\n\
             3. Important implications\n\n\
             Keep your entire response under {words} words."
        ),
        expected_output: format!("Very concise summary (under {words} words)"),
    }
}

/// Build the critique stage's task from both upstream outputs, each
/// truncated to its own ceiling.
pub fn critique(summary_output: &str, research_output: &str, limits: &TaskLimits) -> TaskSpec {
    let summary = truncate(summary_output, limits.critique_summary_max_chars);
    let research = truncate(research_output, limits.critique_research_max_chars);
    let words = limits.critique_word_ceiling;
    TaskSpec {
        stage: Stage::Critique,
        instruction: format!(
            "Provide a concise critique of this research summary:\n\n\
             SUMMARY:\n{summary}\n\n\
             ORIGINAL RESEARCH (excerpt):\n{research}\n\n\
             Provide a brief quality assessment evaluating:\n\
             1. Accuracy: does the summary match the research?\n\
             2. Completeness: are any key points missing?\n\
             3. Clarity: is it easy to understand?\n\n\
             Give 1-2 specific improvement suggestions.\n\
             Provide an overall quality rating (1-5 stars).\n\n\
             Keep your entire response under {words} words."
        ),
        expected_output: format!("Concise critique with rating and suggestions (under {words} words)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_input_untouched() {
        assert_eq!(truncate("short", 100), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn truncate_cuts_to_exact_ceiling_and_appends_marker() {
        let input = "a".repeat(50);
        let out = truncate(&input, 10);
        assert_eq!(out, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let input = "日本語のテキストです";
        let out = truncate(input, 3);
        assert_eq!(out, format!("日本語{TRUNCATION_MARKER}"));
    }

    #[test]
    fn research_task_embeds_query_and_word_ceiling() {
        let limits = TaskLimits::default();
        let spec = research("AI in healthcare", &limits);
        assert_eq!(spec.stage, Stage::Research);
        assert!(spec.instruction.contains("AI in healthcare"));
        assert!(spec.instruction.contains("under 500 words"));
        assert!(spec.expected_output.contains("500"));
    }

    #[test]
    fn summarize_task_truncates_long_research_to_ceiling() {
        let limits = TaskLimits::default();
        let long = "x".repeat(limits.summarize_input_max_chars + 500);
        let spec = summarize(&long, &limits);
        let expected = format!(
            "{}{}",
            "x".repeat(limits.summarize_input_max_chars),
            TRUNCATION_MARKER
        );
        assert!(spec.instruction.contains(&expected));
        // The full untruncated input must not appear anywhere.
        assert!(!spec.instruction.contains(&long));
        assert!(spec.instruction.contains("under 200 words"));
    }

    #[test]
    fn critique_task_truncates_inputs_independently() {
        let limits = TaskLimits::default();
        let summary = "s".repeat(limits.critique_summary_max_chars + 1);
        let research = "r".repeat(limits.critique_research_max_chars + 1);
        let spec = critique(&summary, &research, &limits);
        assert!(spec.instruction.contains(&format!(
            "{}{}",
            "s".repeat(limits.critique_summary_max_chars),
            TRUNCATION_MARKER
        )));
        assert!(spec.instruction.contains(&format!(
            "{}{}",
            "r".repeat(limits.critique_research_max_chars),
            TRUNCATION_MARKER
        )));
        assert!(spec.instruction.contains("under 150 words"));
    }

    #[test]
    fn critique_task_keeps_short_inputs_whole() {
        let limits = TaskLimits::default();
        let spec = critique("fine summary", "fine research", &limits);
        assert!(spec.instruction.contains("fine summary"));
        assert!(spec.instruction.contains("fine research"));
        assert!(!spec.instruction.contains(TRUNCATION_MARKER));
    }
}
