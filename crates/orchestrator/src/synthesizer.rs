//! Turns execution results into one user-facing answer.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::ExecutionResult;
use switchyard_llm::ResilientModelClient;
use tracing::debug;

pub const NO_ANSWER: &str =
    "I wasn't able to find an answer for that right now. Please try rephrasing your question.";

pub struct Synthesizer {
    model: Arc<ResilientModelClient>,
}

impl Synthesizer {
    pub fn new(model: Arc<ResilientModelClient>) -> Self {
        Self { model }
    }

    /// Combine successful results in execution order.
    ///
    /// `section_chars` caps each provider's section; zero means no cap.
    /// `summary_budget` bounds the wait for a model-written summary.
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[ExecutionResult],
        section_chars: usize,
        summary_budget: Option<Duration>,
    ) -> String {
        let successes: Vec<&ExecutionResult> = results.iter().filter(|r| r.success).collect();
        match successes.as_slice() {
            [] => NO_ANSWER.to_string(),
            [only] => only.response.clone(),
            many => {
                let summary = self.summary(query, many, summary_budget).await;
                let mut out = format!("Here's what I found from {} specialists:\n\n{summary}", many.len());
                for r in many {
                    let _ = write!(out, "\n\n**{}**\n{}", r.provider_id, truncate(r.response.trim(), section_chars));
                }
                out
            }
        }
    }

    /// Model-written summary, or the first sentence of each answer.
    async fn summary(&self, query: &str, results: &[&ExecutionResult], budget: Option<Duration>) -> String {
        let answers: String = results
            .iter()
            .map(|r| format!("## {}\n{}", r.provider_id, r.response.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Several specialists answered the same question.\n\n\
             Question: {query}\n\n\
             Answers:\n{answers}\n\n\
             Write a two-sentence summary that combines them."
        );
        let request = self.model.request(prompt).with_temperature(0.3);

        let generation = match budget {
            Some(budget) => self.model.generate_within(&request, budget).await,
            None => self.model.generate(&request).await,
        };
        let text = generation.text.trim();
        if !generation.degraded && !text.is_empty() {
            return text.to_string();
        }
        debug!("Model summary unavailable, using first sentences");
        results
            .iter()
            .map(|r| first_sentence(&r.response))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Text up to and including the first sentence terminator, or the first line.
pub fn first_sentence(text: &str) -> String {
    let line = text.trim().lines().next().unwrap_or_default().trim();
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if matches!(c, '.' | '!' | '?') && at_boundary {
            return line[..i + c.len_utf8()].to_string();
        }
    }
    line.to_string()
}

/// At most `max` characters, with "…" appended when cut. Zero means no limit.
pub fn truncate(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}
