use std::collections::HashSet;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::content::{ContentSource, RssContent};
use crate::error::PipelineError;
use crate::ident::content_id;
use crate::nlp::{summarize_or_placeholder, AnswerEngine, OpenAiConfig, OpenAiEngine};
use crate::reconcile;
use crate::store::{DocumentRecord, KnowledgeStore, PgStore, SummaryRecord};
use crate::telemetry::{self};
use crate::telemetry::ops::sync::Phase as SyncPhase;
use crate::util::ensure_live;

#[derive(Args)]
pub struct SyncCmd {
    /// Override the configured feed address.
    #[arg(long)]
    pub feed_url: Option<String>,
}

/// What one sync pass committed.
#[derive(Debug, Default, Serialize)]
pub struct SyncOutcome {
    pub ingested: Vec<String>,
    pub skipped_known: usize,
    pub skipped_excluded: usize,
}

pub async fn run(
    pool: &PgPool,
    config: &AppConfig,
    cancel: &CancellationToken,
    args: SyncCmd,
) -> Result<()> {
    let feed_url = args.feed_url.as_deref().unwrap_or(&config.feed_url);

    let log = telemetry::sync();
    let _g = log.root_span_kv([("feed_url", feed_url.to_string())]).entered();

    let content = RssContent::new();
    let store = PgStore::new(pool.clone());
    let engine = OpenAiEngine::new(OpenAiConfig::from_app(config))?;

    let outcome = run_sync(&content, &store, &engine, cancel, feed_url, &config.excluded_ids).await?;

    log.totals(outcome.ingested.len(), outcome.skipped_known, outcome.skipped_excluded);
    if telemetry::config::json_mode() {
        log.result(&outcome)?;
    }
    Ok(())
}

/// One ingestion pass: list the feed, diff against the known-id set, and
/// process every unseen item in feed order — fetch, summarize, append the
/// summary row, then reconcile the document into the corpus. Sequential by
/// design: the per-item engine calls are rate-sensitive and the corpus merge
/// assumes ordered writes. The first failure aborts the pass; items already
/// committed stay committed, and the known-id check makes the rerun pick up
/// exactly the remainder.
pub async fn run_sync<C, S, E>(
    content: &C,
    store: &S,
    engine: &E,
    cancel: &CancellationToken,
    feed_url: &str,
    excluded: &HashSet<String>,
) -> Result<SyncOutcome, PipelineError>
where
    C: ContentSource + ?Sized,
    S: KnowledgeStore + ?Sized,
    E: AnswerEngine + ?Sized,
{
    let log = telemetry::sync();

    ensure_live(cancel)?;
    let items = {
        let _s = log.span(&SyncPhase::FetchFeed).entered();
        content.list_items(feed_url).await?
    };

    ensure_live(cancel)?;
    let known = {
        let _s = log.span(&SyncPhase::KnownIds).entered();
        store.list_known_ids().await?
    };

    let mut outcome = SyncOutcome::default();
    for item in items {
        let id = content_id(&item.link);
        if excluded.contains(&id) {
            outcome.skipped_excluded += 1;
            continue;
        }
        if known.contains(&id) {
            outcome.skipped_known += 1;
            continue;
        }

        ensure_live(cancel)?;
        let text = {
            let _s = log.span_kv(&SyncPhase::FetchItem, [("url", item.link.clone())]).entered();
            content.fetch_text(&item.link).await?
        };

        ensure_live(cancel)?;
        let summary = {
            let _s = log.span_kv(&SyncPhase::Summarize, [("id", id.clone())]).entered();
            summarize_or_placeholder(engine, &text).await?
        };

        ensure_live(cancel)?;
        {
            let _s = log.span_kv(&SyncPhase::WriteSummary, [("id", id.clone())]).entered();
            store
                .append_summaries(&[SummaryRecord {
                    id: id.clone(),
                    url: item.link.clone(),
                    title: item.title.clone(),
                    summary,
                    ordinal: item.ordinal,
                }])
                .await?;
        }

        {
            let _s = log.span_kv(&SyncPhase::Reconcile, [("id", id.clone())]).entered();
            let document = DocumentRecord::new(id.clone(), format!("{} {}", item.title, text));
            reconcile::reconcile_document(store, engine, cancel, document).await?;
        }

        log.info_kv("➕ ingested", [("id", id.clone()), ("title", item.title.clone())]);
        outcome.ingested.push(id);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FeedItem, MockContent};
    use crate::nlp::{MockEngine, MAX_CONTEXT_TOKENS, OVERLENGTH_SUMMARY, SUMMARY_MAX_TOKENS};
    use crate::store::MemoryStore;

    fn item(link: &str, title: &str, ordinal: i32) -> FeedItem {
        FeedItem { link: link.to_string(), title: title.to_string(), ordinal }
    }

    fn no_exclusions() -> HashSet<String> {
        HashSet::new()
    }

    #[tokio::test]
    async fn ingests_unseen_items_in_feed_order() {
        let content = MockContent::new(vec![
            item("http://e.com/b.html", "B", 2),
            item("http://e.com/a.html", "A", 1),
        ]);
        content.set_text("http://e.com/b.html", "essay b");
        content.set_text("http://e.com/a.html", "essay a");
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.push_summary("About b.");
        engine.push_summary("About a.");
        let cancel = CancellationToken::new();

        let outcome = run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap();

        assert_eq!(outcome.ingested, vec!["b", "a"]);
        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "b");
        assert_eq!(summaries[0].summary, "About b.");
        assert_eq!(summaries[0].ordinal, 2);
        // each item was reconciled into the corpus with a title-prefixed body
        let docs = store.documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs.iter().find(|d| d.id == "a").unwrap().text, "A essay a");
        assert_eq!(store.blob("b.md").as_deref(), Some("B essay b"));
    }

    #[tokio::test]
    async fn second_run_with_no_new_content_is_a_no_op() {
        let content = MockContent::new(vec![item("http://e.com/a.html", "A", 1)]);
        content.set_text("http://e.com/a.html", "essay a");
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.push_summary("About a.");
        let cancel = CancellationToken::new();

        run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap();
        let first = store.summaries();

        let outcome = run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap();

        assert!(outcome.ingested.is_empty());
        assert_eq!(outcome.skipped_known, 1);
        assert_eq!(store.summaries(), first);
        // only the first run fetched the page or called the engine
        assert_eq!(content.fetched_links().len(), 1);
        assert_eq!(engine.summarize_calls().len(), 1);
    }

    #[tokio::test]
    async fn excluded_ids_are_never_ingested() {
        let content = MockContent::new(vec![
            item("http://e.com/1638975042.html", "Not an essay", 2),
            item("http://e.com/a.html", "A", 1),
        ]);
        content.set_text("http://e.com/a.html", "essay a");
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.push_summary("About a.");
        let cancel = CancellationToken::new();
        let excluded: HashSet<String> = ["1638975042".to_string()].into_iter().collect();

        let outcome = run_sync(&content, &store, &engine, &cancel, "http://feed", &excluded)
            .await
            .unwrap();

        assert_eq!(outcome.ingested, vec!["a"]);
        assert_eq!(outcome.skipped_excluded, 1);
        assert!(content.fetched_links().iter().all(|l| !l.contains("1638975042")));
    }

    #[tokio::test]
    async fn over_length_text_gets_the_placeholder_summary() {
        let content = MockContent::new(vec![item("http://e.com/long.html", "Long", 1)]);
        let text = "a".repeat((MAX_CONTEXT_TOKENS - SUMMARY_MAX_TOKENS + 1) * 4);
        content.set_text("http://e.com/long.html", &text);
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap();

        assert_eq!(store.summaries()[0].summary, OVERLENGTH_SUMMARY);
        assert!(engine.summarize_calls().is_empty());
    }

    #[tokio::test]
    async fn first_fetch_failure_aborts_and_keeps_earlier_commits() {
        let content = MockContent::new(vec![
            item("http://e.com/one.html", "One", 5),
            item("http://e.com/two.html", "Two", 4),
            item("http://e.com/three.html", "Three", 3),
            item("http://e.com/four.html", "Four", 2),
            item("http://e.com/five.html", "Five", 1),
        ]);
        content.set_text("http://e.com/one.html", "text one");
        content.set_text("http://e.com/two.html", "text two");
        content.fail_fetch("http://e.com/three.html", "timeout");
        content.set_text("http://e.com/four.html", "text four");
        content.set_text("http://e.com/five.html", "text five");
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        for s in ["One.", "Two.", "Three.", "Four.", "Five."] {
            engine.push_summary(s);
        }
        let cancel = CancellationToken::new();

        let err = run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));

        let ids: Vec<String> = store.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["one", "two"]);

        // a rerun against the still-broken source fails the same way
        let again = run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap_err();
        assert!(matches!(again, PipelineError::Fetch(_)));
        assert_eq!(store.summaries().len(), 2);

        // once the source recovers, the rerun processes exactly the remainder
        let content_ok = MockContent::new(vec![
            item("http://e.com/one.html", "One", 5),
            item("http://e.com/two.html", "Two", 4),
            item("http://e.com/three.html", "Three", 3),
            item("http://e.com/four.html", "Four", 2),
            item("http://e.com/five.html", "Five", 1),
        ]);
        content_ok.set_text("http://e.com/three.html", "text three");
        content_ok.set_text("http://e.com/four.html", "text four");
        content_ok.set_text("http://e.com/five.html", "text five");

        let outcome =
            run_sync(&content_ok, &store, &engine, &cancel, "http://feed", &no_exclusions())
                .await
                .unwrap();
        assert_eq!(outcome.ingested, vec!["three", "four", "five"]);
        assert_eq!(outcome.skipped_known, 2);
        // one and two were never refetched on the final pass
        assert_eq!(content_ok.fetched_links().len(), 3);
        assert_eq!(store.summaries().len(), 5);
    }

    #[tokio::test]
    async fn duplicate_feed_entries_do_not_duplicate_records() {
        // a stale feed can repeat an item; the known-id set only helps across
        // runs, so the second occurrence is caught by the store's append guard
        let content = MockContent::new(vec![
            item("http://e.com/a.html", "A", 2),
            item("http://e.com/a.html", "A", 1),
        ]);
        content.set_text("http://e.com/a.html", "essay a");
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        engine.push_summary("About a.");
        engine.push_summary("About a again.");
        let cancel = CancellationToken::new();

        run_sync(&content, &store, &engine, &cancel, "http://feed", &no_exclusions())
            .await
            .unwrap();

        assert_eq!(store.summaries().len(), 1);
        let docs = store.documents();
        assert_eq!(docs.iter().filter(|d| d.id == "a").count(), 1);
    }
}
