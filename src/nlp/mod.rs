use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::store::DocumentRecord;

mod openai;

pub use openai::{OpenAiConfig, OpenAiEngine};

/// Context ceiling shared by the completion models in use.
pub const MAX_CONTEXT_TOKENS: usize = 2049;
pub const SUMMARY_MAX_TOKENS: usize = 60;

/// Fixed stand-in summary for essays too long to send. Failing these would
/// permanently block their ingestion, so the pipeline records this instead.
pub const OVERLENGTH_SUMMARY: &str = "Surpassed the maximum word count permitted by the model.";

/// Language-model seam: summarization, corpus indexing (full replace), and
/// question answering against the indexed corpus.
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, PipelineError>;

    /// Replace the engine-side index with exactly these documents.
    async fn index_corpus(&self, documents: &[DocumentRecord]) -> Result<(), PipelineError>;

    async fn answer(&self, question: &str, user_id: Option<&str>)
        -> Result<String, PipelineError>;
}

/// Rough token estimate (4 characters per token) against the context budget
/// left after the requested summary length.
pub fn exceeds_context_budget(text: &str) -> bool {
    text.len() / 4 > MAX_CONTEXT_TOKENS - SUMMARY_MAX_TOKENS
}

/// Summarize, substituting [`OVERLENGTH_SUMMARY`] for over-budget text
/// without calling the engine.
pub async fn summarize_or_placeholder<E: AnswerEngine + ?Sized>(
    engine: &E,
    text: &str,
) -> Result<String, PipelineError> {
    if exceeds_context_budget(text) {
        return Ok(OVERLENGTH_SUMMARY.to_string());
    }
    engine.summarize(text).await
}

/// Scripted engine for tests: queued summaries/answers, recorded calls, and
/// optional injected failures.
#[derive(Default)]
pub struct MockEngine {
    summaries: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<String>>,
    summarize_calls: Mutex<Vec<String>>,
    answer_calls: Mutex<Vec<String>>,
    indexed: Mutex<Vec<Vec<DocumentRecord>>>,
    fail_index: Mutex<bool>,
    fail_answer: Mutex<bool>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_summary(&self, summary: &str) {
        self.summaries.lock().unwrap().push_back(summary.to_string());
    }

    pub fn push_answer(&self, answer: &str) {
        self.answers.lock().unwrap().push_back(answer.to_string());
    }

    pub fn fail_index(&self) {
        *self.fail_index.lock().unwrap() = true;
    }

    pub fn fail_answer(&self) {
        *self.fail_answer.lock().unwrap() = true;
    }

    pub fn summarize_calls(&self) -> Vec<String> {
        self.summarize_calls.lock().unwrap().clone()
    }

    pub fn answer_calls(&self) -> Vec<String> {
        self.answer_calls.lock().unwrap().clone()
    }

    /// Every corpus snapshot submitted for indexing, in order.
    pub fn indexed(&self) -> Vec<Vec<DocumentRecord>> {
        self.indexed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerEngine for MockEngine {
    async fn summarize(&self, text: &str) -> Result<String, PipelineError> {
        self.summarize_calls.lock().unwrap().push(text.to_string());
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::Summarize(anyhow::anyhow!("summary queue empty")))
    }

    async fn index_corpus(&self, documents: &[DocumentRecord]) -> Result<(), PipelineError> {
        if *self.fail_index.lock().unwrap() {
            return Err(PipelineError::Index(anyhow::anyhow!("index unavailable")));
        }
        self.indexed.lock().unwrap().push(documents.to_vec());
        Ok(())
    }

    async fn answer(
        &self,
        question: &str,
        _user_id: Option<&str>,
    ) -> Result<String, PipelineError> {
        self.answer_calls.lock().unwrap().push(question.to_string());
        if *self.fail_answer.lock().unwrap() {
            return Err(PipelineError::Answer(anyhow::anyhow!("engine unavailable")));
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::Answer(anyhow::anyhow!("answer queue empty")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn over_budget_text_gets_the_placeholder_without_a_call() {
        let engine = MockEngine::new();
        let text = "a".repeat((MAX_CONTEXT_TOKENS - SUMMARY_MAX_TOKENS + 1) * 4);
        let summary = summarize_or_placeholder(&engine, &text).await.unwrap();
        assert_eq!(summary, OVERLENGTH_SUMMARY);
        assert!(engine.summarize_calls().is_empty());
    }

    #[tokio::test]
    async fn within_budget_text_reaches_the_engine() {
        let engine = MockEngine::new();
        engine.push_summary("Short and sweet.");
        let summary = summarize_or_placeholder(&engine, "a short essay").await.unwrap();
        assert_eq!(summary, "Short and sweet.");
        assert_eq!(engine.summarize_calls(), vec!["a short essay".to_string()]);
    }

    #[test]
    fn budget_boundary_is_exclusive() {
        let at_limit = "a".repeat((MAX_CONTEXT_TOKENS - SUMMARY_MAX_TOKENS) * 4);
        assert!(!exceeds_context_budget(&at_limit));
        let over = "a".repeat((MAX_CONTEXT_TOKENS - SUMMARY_MAX_TOKENS) * 4 + 4);
        assert!(exceeds_context_budget(&over));
    }
}
