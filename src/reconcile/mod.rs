use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::content::{ContentSource, RssContent};
use crate::ident::content_id;
use crate::nlp::{OpenAiConfig, OpenAiEngine};
use crate::store::{decode_documents, encode_documents, DocumentRecord, PgStore};
use crate::telemetry::{self};
use crate::telemetry::ops::documents::Phase as DocPhase;

mod logic;

pub use logic::{merge, reconcile_document, replace_all, BulkOptions};

const DOCUMENT_FILENAME: &str = "document.json";
const DOCUMENTS_FILENAME: &str = "documents.jsonl";

/// Staging tool for the corpus: `get` pulls essay text into a local file,
/// `set` pushes the staged file through the reconciler.
#[derive(Args)]
pub struct DocumentsCmd {
    #[command(subcommand)]
    pub cmd: DocumentsSub,
}

#[derive(Subcommand)]
pub enum DocumentsSub {
    /// Stage one essay (requires --id) or the whole feed (--bulk) locally.
    Get {
        #[arg(long, default_value_t = false)]
        bulk: bool,
        #[arg(long)]
        id: Option<String>,
    },
    /// Merge the staged single document, or replace the corpus from the
    /// staged bulk file.
    Set {
        #[arg(long, default_value_t = false)]
        bulk: bool,
        /// Bulk only: keep just the staged documents the live feed no longer
        /// carries before indexing.
        #[arg(long, default_value_t = false)]
        stale_only: bool,
    },
}

#[derive(Serialize)]
struct StageResult {
    staged: usize,
    file: &'static str,
}

#[derive(Serialize)]
struct SubmitResult {
    indexed: usize,
}

pub async fn run(
    pool: &PgPool,
    config: &AppConfig,
    cancel: &CancellationToken,
    args: DocumentsCmd,
) -> Result<()> {
    let log = telemetry::documents();
    let content = RssContent::new();
    let store = PgStore::new(pool.clone());
    let engine = OpenAiEngine::new(OpenAiConfig::from_app(config))?;

    match args.cmd {
        DocumentsSub::Get { bulk: false, id: None } => {
            bail!("--id is required for a single get")
        }
        DocumentsSub::Get { bulk: false, id: Some(id) } => {
            let _g = log.root_span_kv([("action", "get".to_string()), ("id", id.clone())]).entered();
            let document = stage_single(&content, config, &id, &log).await?;
            fs::write(DOCUMENT_FILENAME, serde_json::to_vec(&document)?)
                .with_context(|| format!("write {DOCUMENT_FILENAME}"))?;
            log.info(format!("📄 Staged {} to {}", id, DOCUMENT_FILENAME));
            if telemetry::config::json_mode() {
                log.result(&StageResult { staged: 1, file: DOCUMENT_FILENAME })?;
            }
        }
        DocumentsSub::Get { bulk: true, .. } => {
            let _g = log.root_span_kv([("action", "get-bulk".to_string())]).entered();
            let documents = stage_bulk(&content, config, &log).await?;
            fs::write(DOCUMENTS_FILENAME, encode_documents(&documents)?)
                .with_context(|| format!("write {DOCUMENTS_FILENAME}"))?;
            log.info(format!("📄 Staged {} documents to {}", documents.len(), DOCUMENTS_FILENAME));
            if telemetry::config::json_mode() {
                log.result(&StageResult { staged: documents.len(), file: DOCUMENTS_FILENAME })?;
            }
        }
        DocumentsSub::Set { bulk: false, stale_only } => {
            if stale_only {
                bail!("--stale-only only applies to --bulk");
            }
            let _g = log.root_span_kv([("action", "set".to_string())]).entered();
            let body = fs::read_to_string(DOCUMENT_FILENAME)
                .with_context(|| format!("read {DOCUMENT_FILENAME}"))?;
            let document: DocumentRecord =
                serde_json::from_str(&body).context("decode staged document")?;
            let id = document.id.clone();
            let _s = log.span(&DocPhase::Reconcile).entered();
            reconcile_document(&store, &engine, cancel, document).await?;
            log.info(format!("✅ Reconciled {}", id));
            if telemetry::config::json_mode() {
                log.result(&SubmitResult { indexed: 1 })?;
            }
        }
        DocumentsSub::Set { bulk: true, stale_only } => {
            let _g = log
                .root_span_kv([
                    ("action", "set-bulk".to_string()),
                    ("stale_only", stale_only.to_string()),
                ])
                .entered();
            let body = fs::read_to_string(DOCUMENTS_FILENAME)
                .with_context(|| format!("read {DOCUMENTS_FILENAME}"))?;
            let staged = decode_documents(&body).context("decode staged documents")?;
            let _s = log.span(&DocPhase::Replace).entered();
            let kept = replace_all(
                &content,
                &store,
                &engine,
                cancel,
                &config.feed_url,
                staged,
                BulkOptions { stale_only },
            )
            .await?;
            log.info(format!("✅ Replaced corpus with {} documents", kept.len()));
            if telemetry::config::json_mode() {
                log.result(&SubmitResult { indexed: kept.len() })?;
            }
        }
    }

    Ok(())
}

async fn stage_single<C: ContentSource>(
    content: &C,
    config: &AppConfig,
    id: &str,
    log: &telemetry::ctx::LogCtx<telemetry::ops::documents::Documents>,
) -> Result<DocumentRecord> {
    let items = {
        let _s = log.span(&DocPhase::FetchFeed).entered();
        content.list_items(&config.feed_url).await?
    };
    let Some(item) = items.iter().find(|item| content_id(&item.link) == id) else {
        bail!("no feed item with id {id}");
    };

    let _s = log.span_kv(&DocPhase::FetchItem, [("url", item.link.clone())]).entered();
    let text = content.fetch_text(&item.link).await?;
    Ok(DocumentRecord::new(id, format!("{} {}", item.title, text)))
}

async fn stage_bulk<C: ContentSource>(
    content: &C,
    config: &AppConfig,
    log: &telemetry::ctx::LogCtx<telemetry::ops::documents::Documents>,
) -> Result<Vec<DocumentRecord>> {
    let items = {
        let _s = log.span(&DocPhase::FetchFeed).entered();
        content.list_items(&config.feed_url).await?
    };

    let mut documents = Vec::new();
    for item in items {
        let id = content_id(&item.link);
        if config.excluded_ids.contains(&id) {
            continue;
        }
        let _s = log.span_kv(&DocPhase::FetchItem, [("url", item.link.clone())]).entered();
        let text = content.fetch_text(&item.link).await?;
        documents.push(DocumentRecord::new(id, format!("{} {}", item.title, text)));
    }
    Ok(documents)
}
