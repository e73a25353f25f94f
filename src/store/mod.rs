use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Row-store batch limit carried over from the original table store.
pub const SUMMARY_BATCH_SIZE: usize = 25;

/// Blob key of the corpus of record.
pub const CORPUS_BLOB_KEY: &str = "documents.jsonl";

/// One row per processed feed item. Created once on first ingestion and
/// treated as immutable history afterward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub ordinal: i32,
}

/// The unit indexed for question answering. Serialized with the corpus file's
/// field names: the id travels as `metadata`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "metadata")]
    pub id: String,
    pub text: String,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// Durable persistence seam: structured summary/question rows plus keyed text
/// blobs (raw essay backups and the corpus of record).
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Ids of every summary row already present ("known ids").
    async fn list_known_ids(&self) -> Result<HashSet<String>, PipelineError>;

    /// Insert summary rows, chunked to [`SUMMARY_BATCH_SIZE`] per write.
    async fn append_summaries(&self, records: &[SummaryRecord]) -> Result<(), PipelineError>;

    async fn get_summaries(&self) -> Result<Vec<SummaryRecord>, PipelineError>;

    /// Write the raw text backup for one essay. Overwrites on re-ingestion;
    /// never read back by the pipeline itself.
    async fn put_text_blob(&self, id: &str, text: &str) -> Result<(), PipelineError>;

    /// Current corpus of record; an absent corpus reads as empty.
    async fn get_documents(&self) -> Result<Vec<DocumentRecord>, PipelineError>;

    /// Full replacement of the corpus of record.
    async fn put_documents(&self, all: &[DocumentRecord]) -> Result<(), PipelineError>;

    async fn put_question(&self, id: Uuid, question: &str) -> Result<(), PipelineError>;

    /// Attach an answer to an existing question row.
    async fn put_answer(&self, id: Uuid, answer: &str) -> Result<(), PipelineError>;
}

/// Store-write batches of at most [`SUMMARY_BATCH_SIZE`] records each.
pub fn summary_batches(records: &[SummaryRecord]) -> impl Iterator<Item = &[SummaryRecord]> {
    records.chunks(SUMMARY_BATCH_SIZE)
}

/// Encode documents as the corpus JSONL blob.
pub fn encode_documents(documents: &[DocumentRecord]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for document in documents {
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Decode a corpus JSONL blob, skipping blank lines.
pub fn decode_documents(body: &str) -> Result<Vec<DocumentRecord>, serde_json::Error> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_encode_with_metadata_field() {
        let docs = vec![DocumentRecord::new("avg", "Beating the averages.")];
        let body = encode_documents(&docs).unwrap();
        assert_eq!(body, "{\"metadata\":\"avg\",\"text\":\"Beating the averages.\"}\n");
    }

    #[test]
    fn decode_skips_blank_lines() {
        let body = "{\"metadata\":\"a\",\"text\":\"one\"}\n\n{\"metadata\":\"b\",\"text\":\"two\"}\n";
        let docs = decode_documents(body).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id, "b");
    }

    #[test]
    fn summary_batches_split_at_the_batch_limit() {
        let records: Vec<SummaryRecord> = (0..SUMMARY_BATCH_SIZE + 3)
            .map(|i| SummaryRecord {
                id: format!("id{i}"),
                url: format!("http://e.com/{i}.html"),
                title: format!("Essay {i}"),
                summary: "A summary.".to_string(),
                ordinal: i as i32,
            })
            .collect();
        let batches: Vec<&[SummaryRecord]> = summary_batches(&records).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), SUMMARY_BATCH_SIZE);
        assert_eq!(batches[1].len(), 3);
    }

    #[test]
    fn encode_decode_preserves_order() {
        let docs = vec![
            DocumentRecord::new("b", "second"),
            DocumentRecord::new("a", "first"),
        ];
        let decoded = decode_documents(&encode_documents(&docs).unwrap()).unwrap();
        assert_eq!(decoded, docs);
    }
}
