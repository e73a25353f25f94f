use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::content::{ContentSource, RssContent};
use crate::ident::content_id;
use crate::nlp::{summarize_or_placeholder, AnswerEngine, OpenAiConfig, OpenAiEngine};
use crate::store::{KnowledgeStore, PgStore, SummaryRecord};
use crate::telemetry::{self};
use crate::telemetry::ops::summaries::Phase as SummariesPhase;
use crate::util::ensure_live;

const SUMMARY_FILENAME: &str = "summary.json";
const SUMMARIES_FILENAME: &str = "summaries.json";

/// Staging tool for summary rows: `get` generates summaries into a local
/// JSON file for review, `set` batch-writes the reviewed file to the store.
#[derive(Args)]
pub struct SummariesCmd {
    #[command(subcommand)]
    pub cmd: SummariesSub,
}

#[derive(Subcommand)]
pub enum SummariesSub {
    /// Summarize one essay (requires --id) or the whole feed (--bulk).
    Get {
        #[arg(long, default_value_t = false)]
        bulk: bool,
        #[arg(long)]
        id: Option<String>,
    },
    /// Write the staged file's rows to the store.
    Set {
        #[arg(long, default_value_t = false)]
        bulk: bool,
    },
}

#[derive(Serialize, Deserialize)]
struct StagedSummaries {
    items: Vec<SummaryRecord>,
}

pub async fn run(
    pool: &PgPool,
    config: &AppConfig,
    cancel: &CancellationToken,
    args: SummariesCmd,
) -> Result<()> {
    let log = telemetry::summaries();
    let content = RssContent::new();
    let store = PgStore::new(pool.clone());
    let engine = OpenAiEngine::new(OpenAiConfig::from_app(config))?;

    match args.cmd {
        SummariesSub::Get { bulk, id } => {
            if !bulk && id.is_none() {
                bail!("--id is required for a single get");
            }
            let _g = log
                .root_span_kv([("action", "get".to_string()), ("bulk", bulk.to_string())])
                .entered();

            let records = stage(&content, &engine, config, cancel, id.as_deref(), &log).await?;
            if records.is_empty() {
                bail!("no matching feed items");
            }

            let filename = if bulk { SUMMARIES_FILENAME } else { SUMMARY_FILENAME };
            fs::write(filename, serde_json::to_vec(&StagedSummaries { items: records.clone() })?)
                .with_context(|| format!("write {filename}"))?;
            log.info(format!("📄 Staged {} summaries to {}", records.len(), filename));
            if telemetry::config::json_mode() {
                log.result(&serde_json::json!({ "staged": records.len(), "file": filename }))?;
            }
        }
        SummariesSub::Set { bulk } => {
            let _g = log
                .root_span_kv([("action", "set".to_string()), ("bulk", bulk.to_string())])
                .entered();
            let filename = if bulk { SUMMARIES_FILENAME } else { SUMMARY_FILENAME };
            let body =
                fs::read_to_string(filename).with_context(|| format!("read {filename}"))?;
            let staged: StagedSummaries =
                serde_json::from_str(&body).context("decode staged summaries")?;

            let _s = log.span(&SummariesPhase::StoreRows).entered();
            store.append_summaries(&staged.items).await?;
            log.info(format!("✅ Stored {} summary rows", staged.items.len()));
            if telemetry::config::json_mode() {
                log.result(&serde_json::json!({ "stored": staged.items.len() }))?;
            }
        }
    }

    Ok(())
}

/// Fetch and summarize feed items: all non-excluded items, or just the one
/// matching `only_id`.
async fn stage<C, E>(
    content: &C,
    engine: &E,
    config: &AppConfig,
    cancel: &CancellationToken,
    only_id: Option<&str>,
    log: &telemetry::ctx::LogCtx<telemetry::ops::summaries::Summaries>,
) -> Result<Vec<SummaryRecord>>
where
    C: ContentSource + ?Sized,
    E: AnswerEngine + ?Sized,
{
    ensure_live(cancel)?;
    let items = {
        let _s = log.span(&SummariesPhase::FetchFeed).entered();
        content.list_items(&config.feed_url).await?
    };

    let mut records = Vec::new();
    for item in items {
        let id = content_id(&item.link);
        if config.excluded_ids.contains(&id) {
            continue;
        }
        if let Some(only) = only_id {
            if id != only {
                continue;
            }
        }

        ensure_live(cancel)?;
        let text = {
            let _s = log.span_kv(&SummariesPhase::FetchItem, [("url", item.link.clone())]).entered();
            content.fetch_text(&item.link).await?
        };
        let summary = {
            let _s = log.span_kv(&SummariesPhase::Summarize, [("id", id.clone())]).entered();
            summarize_or_placeholder(engine, &text).await?
        };

        records.push(SummaryRecord {
            id,
            url: item.link,
            title: item.title,
            summary,
            ordinal: item.ordinal,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FeedItem, MockContent};
    use crate::nlp::MockEngine;
    use std::collections::HashSet;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            feed_url: "http://feed".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            openai_api_key: None,
            openai_base_url: "http://llm.internal/v1".to_string(),
            openai_summary_model: "summarizer-1".to_string(),
            openai_answer_model: "answerer-1".to_string(),
            question_max_chars: 200,
            excluded_ids: ["1638975042".to_string()].into_iter().collect::<HashSet<_>>(),
        }
    }

    #[tokio::test]
    async fn stage_single_only_touches_the_matching_item() {
        let content = MockContent::new(vec![
            FeedItem { link: "http://e.com/a.html".into(), title: "A".into(), ordinal: 2 },
            FeedItem { link: "http://e.com/b.html".into(), title: "B".into(), ordinal: 1 },
        ]);
        content.set_text("http://e.com/b.html", "essay b");
        let engine = MockEngine::new();
        engine.push_summary("About b.");
        let cancel = CancellationToken::new();
        let log = telemetry::summaries();

        let records = stage(&content, &engine, &test_config(), &cancel, Some("b"), &log)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "b");
        assert_eq!(records[0].summary, "About b.");
        assert_eq!(content.fetched_links(), vec!["http://e.com/b.html".to_string()]);
    }

    #[tokio::test]
    async fn stage_bulk_skips_excluded_ids() {
        let content = MockContent::new(vec![
            FeedItem { link: "http://e.com/1638975042.html".into(), title: "Skip".into(), ordinal: 2 },
            FeedItem { link: "http://e.com/a.html".into(), title: "A".into(), ordinal: 1 },
        ]);
        content.set_text("http://e.com/a.html", "essay a");
        let engine = MockEngine::new();
        engine.push_summary("About a.");
        let cancel = CancellationToken::new();
        let log = telemetry::summaries();

        let records = stage(&content, &engine, &test_config(), &cancel, None, &log)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "a");
    }
}
