use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PipelineError;

use super::{DocumentRecord, KnowledgeStore, SummaryRecord};

#[derive(Default)]
struct Inner {
    summaries: Vec<SummaryRecord>,
    blobs: HashMap<String, String>,
    documents: Vec<DocumentRecord>,
    questions: HashMap<Uuid, (String, Option<String>)>,
    fail_put_answer: bool,
    fail_put_question: bool,
}

/// In-memory Knowledge Store substitute for tests. Writes are recorded so
/// assertions can inspect exactly what the pipeline committed.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summaries(records: Vec<SummaryRecord>) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().summaries = records;
        store
    }

    pub fn with_documents(documents: Vec<DocumentRecord>) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().documents = documents;
        store
    }

    pub fn fail_put_answer(&self) {
        self.inner.lock().unwrap().fail_put_answer = true;
    }

    pub fn fail_put_question(&self) {
        self.inner.lock().unwrap().fail_put_question = true;
    }

    pub fn summaries(&self) -> Vec<SummaryRecord> {
        self.inner.lock().unwrap().summaries.clone()
    }

    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.inner.lock().unwrap().documents.clone()
    }

    pub fn blob(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().blobs.get(key).cloned()
    }

    pub fn questions(&self) -> Vec<(String, Option<String>)> {
        self.inner.lock().unwrap().questions.values().cloned().collect()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn list_known_ids(&self) -> Result<HashSet<String>, PipelineError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.summaries.iter().map(|s| s.id.clone()).collect())
    }

    async fn append_summaries(&self, records: &[SummaryRecord]) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        for record in records {
            if !inner.summaries.iter().any(|s| s.id == record.id) {
                inner.summaries.push(record.clone());
            }
        }
        Ok(())
    }

    async fn get_summaries(&self) -> Result<Vec<SummaryRecord>, PipelineError> {
        Ok(self.inner.lock().unwrap().summaries.clone())
    }

    async fn put_text_blob(&self, id: &str, text: &str) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.blobs.insert(format!("{id}.md"), text.to_string());
        Ok(())
    }

    async fn get_documents(&self) -> Result<Vec<DocumentRecord>, PipelineError> {
        Ok(self.inner.lock().unwrap().documents.clone())
    }

    async fn put_documents(&self, all: &[DocumentRecord]) -> Result<(), PipelineError> {
        self.inner.lock().unwrap().documents = all.to_vec();
        Ok(())
    }

    async fn put_question(&self, id: Uuid, question: &str) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_put_question {
            return Err(PipelineError::StoreWrite(anyhow::anyhow!("question table down")));
        }
        inner.questions.insert(id, (question.to_string(), None));
        Ok(())
    }

    async fn put_answer(&self, id: Uuid, answer: &str) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_put_answer {
            return Err(PipelineError::StoreWrite(anyhow::anyhow!("question table down")));
        }
        match inner.questions.get_mut(&id) {
            Some(entry) => {
                entry.1 = Some(answer.to_string());
                Ok(())
            }
            None => Err(PipelineError::StoreWrite(anyhow::anyhow!(
                "no question row with id {id}"
            ))),
        }
    }
}
