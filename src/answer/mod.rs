use anyhow::Result;
use clap::Args;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::nlp::{AnswerEngine, OpenAiConfig, OpenAiEngine};
use crate::store::{KnowledgeStore, PgStore};
use crate::telemetry::{self};
use crate::telemetry::ops::answer::Phase as AnswerPhase;
use crate::util::ensure_live;

/// One-shot question from the command line.
#[derive(Args)]
pub struct AskCmd {
    pub question: String,
    #[arg(long)]
    pub user_id: Option<String>,
}

pub async fn run(
    pool: &PgPool,
    config: &AppConfig,
    cancel: &CancellationToken,
    args: AskCmd,
) -> Result<()> {
    let log = telemetry::answer();
    let _g = log.root_span().entered();

    let store = PgStore::new(pool.clone());
    let engine = OpenAiEngine::new(OpenAiConfig::from_app(config))?;

    let answer = respond(
        &store,
        &engine,
        cancel,
        config.question_max_chars,
        &args.question,
        args.user_id.as_deref(),
    )
    .await?;

    log.info(format!("💬 {answer}"));
    if telemetry::config::json_mode() {
        log.result(&serde_json::json!({ "answer": answer }))?;
    }
    Ok(())
}

/// Answer one question: validate, record the question, ask the engine, and
/// record the answer. The question row is written before the engine call, so
/// an engine failure leaves a visible answerless record. The final answer
/// write is bookkeeping only — if it fails the computed answer is still
/// returned to the caller and the failure is logged.
pub async fn respond<S, E>(
    store: &S,
    engine: &E,
    cancel: &CancellationToken,
    max_chars: usize,
    question: &str,
    user_id: Option<&str>,
) -> Result<String, PipelineError>
where
    S: KnowledgeStore + ?Sized,
    E: AnswerEngine + ?Sized,
{
    let log = telemetry::answer();

    // rejected before anything is written
    let question = question.trim();
    if question.is_empty() {
        return Err(PipelineError::validation("question must not be empty"));
    }
    if question.chars().count() > max_chars {
        return Err(PipelineError::validation(format!(
            "question must be at most {max_chars} characters"
        )));
    }

    ensure_live(cancel)?;
    let id = Uuid::new_v4();
    store
        .put_question(id, question)
        .instrument(log.span_kv(&AnswerPhase::RecordQuestion, [("id", id.to_string())]))
        .await?;

    ensure_live(cancel)?;
    let answer = engine
        .answer(question, user_id)
        .instrument(log.span(&AnswerPhase::Engine))
        .await?;

    // returning the answer takes priority over this write
    if let Err(err) = store
        .put_answer(id, &answer)
        .instrument(log.span(&AnswerPhase::RecordAnswer))
        .await
    {
        log.warn(format!("answer computed but not recorded for {id}: {err}"));
    }

    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::MockEngine;
    use crate::store::MemoryStore;

    const MAX: usize = 200;

    #[tokio::test]
    async fn round_trip_records_question_and_answer() {
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.push_answer("Focus on your users.");
        let cancel = CancellationToken::new();

        let answer = respond(
            &store,
            &engine,
            &cancel,
            MAX,
            "What is the secret to success?",
            None,
        )
        .await
        .unwrap();

        assert_eq!(answer, "Focus on your users.");
        let questions = store.questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].0, "What is the secret to success?");
        assert_eq!(questions[0].1.as_deref(), Some("Focus on your users."));
    }

    #[tokio::test]
    async fn oversized_question_is_rejected_before_any_write() {
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();
        let question = "x".repeat(MAX + 1);

        let err = respond(&store, &engine, &cancel, MAX, &question, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(store.questions().is_empty());
        assert!(engine.answer_calls().is_empty());
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        let err = respond(&store, &engine, &cancel, MAX, "   ", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(store.questions().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_leaves_the_answerless_question_row() {
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.fail_answer();
        let cancel = CancellationToken::new();

        let err = respond(&store, &engine, &cancel, MAX, "Why?", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Answer(_)));

        let questions = store.questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0], ("Why?".to_string(), None));
    }

    #[tokio::test]
    async fn answer_is_returned_even_if_recording_it_fails() {
        let store = MemoryStore::new();
        store.fail_put_answer();
        let engine = MockEngine::new();
        engine.push_answer("Make something people want.");
        let cancel = CancellationToken::new();

        let answer = respond(&store, &engine, &cancel, MAX, "What should I build?", None)
            .await
            .unwrap();
        assert_eq!(answer, "Make something people want.");
    }

    #[tokio::test]
    async fn store_failure_aborts_before_the_engine_is_called() {
        let store = MemoryStore::new();
        store.fail_put_question();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        let err = respond(&store, &engine, &cancel, MAX, "Why?", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreWrite(_)));
        assert!(engine.answer_calls().is_empty());
    }
}
