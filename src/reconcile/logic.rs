use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::content::ContentSource;
use crate::error::PipelineError;
use crate::ident::content_id;
use crate::nlp::AnswerEngine;
use crate::store::{DocumentRecord, KnowledgeStore};
use crate::util::ensure_live;

/// Policy switches for [`replace_all`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BulkOptions {
    /// Keep only documents whose id is absent from the live feed — the
    /// staged batch then covers manually maintained or withdrawn essays
    /// without clobbering entries the next sync will rebuild.
    pub stale_only: bool,
}

/// New-document-first merge. The result holds at most one record per id:
/// any existing record sharing the new document's id is dropped.
pub fn merge(new_document: DocumentRecord, existing: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut merged = Vec::with_capacity(existing.len() + 1);
    let id = new_document.id.clone();
    merged.push(new_document);
    merged.extend(existing.into_iter().filter(|doc| doc.id != id));
    merged
}

/// Merge one new or re-ingested document into the authoritative corpus:
/// read the current collection, merge, back up the raw text, resubmit the
/// whole corpus to the engine (its index is replace-only), then overwrite
/// the corpus of record. No rollback on partial failure — the read in step
/// one makes a rerun converge.
pub async fn reconcile_document<S, E>(
    store: &S,
    engine: &E,
    cancel: &CancellationToken,
    new_document: DocumentRecord,
) -> Result<(), PipelineError>
where
    S: KnowledgeStore + ?Sized,
    E: AnswerEngine + ?Sized,
{
    ensure_live(cancel)?;
    let existing = store.get_documents().await?;

    let id = new_document.id.clone();
    let text = new_document.text.clone();
    let merged = merge(new_document, existing);

    ensure_live(cancel)?;
    store.put_text_blob(&id, &text).await?;

    ensure_live(cancel)?;
    engine.index_corpus(&merged).await?;

    ensure_live(cancel)?;
    store.put_documents(&merged).await?;
    Ok(())
}

/// Replace the entire corpus with a staged batch. With `stale_only` set the
/// batch is first cross-referenced against the live feed and narrowed to
/// documents the feed no longer carries. Returns the documents actually
/// submitted.
pub async fn replace_all<C, S, E>(
    content: &C,
    store: &S,
    engine: &E,
    cancel: &CancellationToken,
    feed_url: &str,
    documents: Vec<DocumentRecord>,
    options: BulkOptions,
) -> Result<Vec<DocumentRecord>, PipelineError>
where
    C: ContentSource + ?Sized,
    S: KnowledgeStore + ?Sized,
    E: AnswerEngine + ?Sized,
{
    let documents = if options.stale_only {
        ensure_live(cancel)?;
        let live: HashSet<String> = content
            .list_items(feed_url)
            .await?
            .iter()
            .map(|item| content_id(&item.link))
            .collect();
        documents
            .into_iter()
            .filter(|doc| !live.contains(&doc.id))
            .collect()
    } else {
        documents
    };

    ensure_live(cancel)?;
    engine.index_corpus(&documents).await?;

    ensure_live(cancel)?;
    store.put_documents(&documents).await?;
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FeedItem, MockContent};
    use crate::nlp::MockEngine;
    use crate::store::MemoryStore;

    fn doc(id: &str, text: &str) -> DocumentRecord {
        DocumentRecord::new(id, text)
    }

    #[test]
    fn merge_replaces_same_id_and_leads_with_the_new_document() {
        let existing = vec![doc("a", "old"), doc("b", "keep")];
        let merged = merge(doc("a", "new"), existing);
        assert_eq!(merged, vec![doc("a", "new"), doc("b", "keep")]);
    }

    #[test]
    fn merge_never_produces_duplicate_ids() {
        let existing = vec![doc("a", "old"), doc("a", "older"), doc("b", "keep")];
        let merged = merge(doc("a", "new"), existing);
        let ids: Vec<&str> = merged.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn reconcile_backs_up_indexes_and_overwrites() {
        let store = MemoryStore::with_documents(vec![doc("a", "old"), doc("b", "keep")]);
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        reconcile_document(&store, &engine, &cancel, doc("a", "new"))
            .await
            .unwrap();

        assert_eq!(store.blob("a.md").as_deref(), Some("new"));
        assert_eq!(store.documents(), vec![doc("a", "new"), doc("b", "keep")]);
        // the engine saw the full merged corpus, not just the new document
        assert_eq!(engine.indexed(), vec![vec![doc("a", "new"), doc("b", "keep")]]);
    }

    #[tokio::test]
    async fn reconcile_index_failure_leaves_corpus_of_record_untouched() {
        let store = MemoryStore::with_documents(vec![doc("b", "keep")]);
        let engine = MockEngine::new();
        engine.fail_index();
        let cancel = CancellationToken::new();

        let err = reconcile_document(&store, &engine, &cancel, doc("a", "new"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Index(_)));
        // blob write happened before the failure; corpus overwrite did not
        assert!(store.blob("a.md").is_some());
        assert_eq!(store.documents(), vec![doc("b", "keep")]);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let store = MemoryStore::with_documents(vec![doc("b", "keep")]);
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        reconcile_document(&store, &engine, &cancel, doc("a", "new")).await.unwrap();
        reconcile_document(&store, &engine, &cancel, doc("a", "new")).await.unwrap();

        assert_eq!(store.documents(), vec![doc("a", "new"), doc("b", "keep")]);
    }

    #[tokio::test]
    async fn replace_all_overwrites_everything_by_default() {
        let content = MockContent::new(Vec::new());
        let store = MemoryStore::with_documents(vec![doc("old", "gone")]);
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        let kept = replace_all(
            &content,
            &store,
            &engine,
            &cancel,
            "http://feed",
            vec![doc("a", "one"), doc("b", "two")],
            BulkOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(kept.len(), 2);
        assert_eq!(store.documents(), kept);
    }

    #[tokio::test]
    async fn replace_all_stale_only_drops_live_feed_ids() {
        let content = MockContent::new(vec![FeedItem {
            link: "http://e.com/a.html".to_string(),
            title: "A".to_string(),
            ordinal: 1,
        }]);
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();

        let kept = replace_all(
            &content,
            &store,
            &engine,
            &cancel,
            "http://feed",
            vec![doc("a", "still in feed"), doc("manual", "hand-maintained")],
            BulkOptions { stale_only: true },
        )
        .await
        .unwrap();

        assert_eq!(kept, vec![doc("manual", "hand-maintained")]);
        assert_eq!(store.documents(), kept);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_any_write() {
        let store = MemoryStore::new();
        let engine = MockEngine::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reconcile_document(&store, &engine, &cancel, doc("a", "new"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(store.blob("a.md").is_none());
        assert!(engine.indexed().is_empty());
    }
}
