use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::PipelineError;

use super::{
    decode_documents, encode_documents, summary_batches, DocumentRecord, KnowledgeStore,
    SummaryRecord, CORPUS_BLOB_KEY,
};

/// Production Knowledge Store over Postgres (schema `essay`).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn put_blob(&self, key: &str, body: &str) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO essay.blob (key, body, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET body = EXCLUDED.body, updated_at = now()",
        )
        .bind(key)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::StoreWrite(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for PgStore {
    async fn list_known_ids(&self) -> Result<HashSet<String>, PipelineError> {
        let rows = sqlx::query("SELECT id FROM essay.summary")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreRead(e.into()))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| PipelineError::StoreRead(e.into()))
    }

    async fn append_summaries(&self, records: &[SummaryRecord]) -> Result<(), PipelineError> {
        for chunk in summary_batches(records) {
            let mut builder =
                QueryBuilder::new("INSERT INTO essay.summary (id, url, title, summary, ordinal) ");
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.id)
                    .push_bind(&record.url)
                    .push_bind(&record.title)
                    .push_bind(&record.summary)
                    .push_bind(record.ordinal);
            });
            // append semantics: these ids were absent, a replay must not duplicate
            builder.push(" ON CONFLICT (id) DO NOTHING");
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| PipelineError::StoreWrite(e.into()))?;
        }
        Ok(())
    }

    async fn get_summaries(&self) -> Result<Vec<SummaryRecord>, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, url, title, summary, ordinal FROM essay.summary ORDER BY ordinal DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::StoreRead(e.into()))?;

        rows.iter()
            .map(|row| {
                Ok(SummaryRecord {
                    id: row.try_get("id")?,
                    url: row.try_get("url")?,
                    title: row.try_get("title")?,
                    summary: row.try_get("summary")?,
                    ordinal: row.try_get("ordinal")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| PipelineError::StoreRead(e.into()))
    }

    async fn put_text_blob(&self, id: &str, text: &str) -> Result<(), PipelineError> {
        self.put_blob(&format!("{id}.md"), text).await
    }

    async fn get_documents(&self) -> Result<Vec<DocumentRecord>, PipelineError> {
        let row = sqlx::query("SELECT body FROM essay.blob WHERE key = $1")
            .bind(CORPUS_BLOB_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreRead(e.into()))?;

        let Some(row) = row else { return Ok(Vec::new()) };
        let body: String = row
            .try_get("body")
            .map_err(|e| PipelineError::StoreRead(e.into()))?;
        decode_documents(&body).map_err(|e| PipelineError::StoreRead(e.into()))
    }

    async fn put_documents(&self, all: &[DocumentRecord]) -> Result<(), PipelineError> {
        let body = encode_documents(all).map_err(|e| PipelineError::StoreWrite(e.into()))?;
        self.put_blob(CORPUS_BLOB_KEY, &body).await
    }

    async fn put_question(&self, id: Uuid, question: &str) -> Result<(), PipelineError> {
        sqlx::query("INSERT INTO essay.question (id, question, asked_at) VALUES ($1, $2, now())")
            .bind(id)
            .bind(question)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreWrite(e.into()))?;
        Ok(())
    }

    async fn put_answer(&self, id: Uuid, answer: &str) -> Result<(), PipelineError> {
        let result = sqlx::query("UPDATE essay.question SET answer = $2 WHERE id = $1")
            .bind(id)
            .bind(answer)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreWrite(e.into()))?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::StoreWrite(anyhow::anyhow!(
                "no question row with id {id}"
            )));
        }
        Ok(())
    }
}
