use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use super::types::{DocumentFile, ExtractionResult, ProcessingStatus};

/// Document records keyed by conversation.
///
/// Context assembly only reads through this; the document service writes the
/// extraction once it succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self, conversation_id: &str) -> anyhow::Result<Vec<DocumentFile>>;
    async fn insert_document(
        &self,
        conversation_id: &str,
        document: DocumentFile,
    ) -> anyhow::Result<()>;
    async fn save_extraction(
        &self,
        conversation_id: &str,
        document_id: &str,
        result: &ExtractionResult,
    ) -> anyhow::Result<()>;
    async fn mark_failed(
        &self,
        conversation_id: &str,
        document_id: &str,
        error: &str,
    ) -> anyhow::Result<()>;
    async fn clear_conversation(&self, conversation_id: &str) -> anyhow::Result<usize>;
}

pub type SharedDocumentStore = Arc<dyn DocumentStore>;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    records: Mutex<HashMap<String, Vec<DocumentFile>>>,
}

impl InMemoryDocumentStore {
    pub fn shared() -> SharedDocumentStore {
        Arc::new(Self::default())
    }

    fn update<F>(&self, conversation_id: &str, document_id: &str, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut DocumentFile),
    {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        let document = records
            .get_mut(conversation_id)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == document_id))
            .ok_or_else(|| anyhow!("document {document_id} not found in {conversation_id}"))?;
        apply(document);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list_documents(&self, conversation_id: &str) -> anyhow::Result<Vec<DocumentFile>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        Ok(records.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn insert_document(
        &self,
        conversation_id: &str,
        document: DocumentFile,
    ) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        let docs = records.entry(conversation_id.to_string()).or_default();
        // A reload replaces the previous record wholesale.
        docs.retain(|existing| existing.id != document.id);
        docs.push(document);
        Ok(())
    }

    async fn save_extraction(
        &self,
        conversation_id: &str,
        document_id: &str,
        result: &ExtractionResult,
    ) -> anyhow::Result<()> {
        self.update(conversation_id, document_id, |doc| {
            *doc = doc.clone().with_extraction(result);
        })
    }

    async fn mark_failed(
        &self,
        conversation_id: &str,
        document_id: &str,
        error: &str,
    ) -> anyhow::Result<()> {
        self.update(conversation_id, document_id, |doc| {
            doc.processing_status = ProcessingStatus::Failed;
            doc.metadata.error = Some(error.to_string());
        })
    }

    async fn clear_conversation(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        Ok(records
            .remove(conversation_id)
            .map(|docs| docs.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::PageContent;

    #[tokio::test]
    async fn extraction_is_written_once_per_document() {
        let store = InMemoryDocumentStore::default();
        store
            .insert_document("conv", DocumentFile::new("d1", "a.pdf", "application/pdf"))
            .await
            .expect("insert");

        let result = ExtractionResult {
            merged_content: "[Page 1]\nuno dos".to_string(),
            pages: vec![PageContent::new(1, "uno dos")],
            page_count: 1,
        };
        store
            .save_extraction("conv", "d1", &result)
            .await
            .expect("save");

        let docs = store.list_documents("conv").await.expect("list");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].processing_status, ProcessingStatus::Completed);
        assert_eq!(docs[0].metadata.word_count, 2);
    }

    #[tokio::test]
    async fn unknown_document_is_an_error() {
        let store = InMemoryDocumentStore::default();
        let err = store
            .mark_failed("conv", "missing", "boom")
            .await
            .expect_err("missing doc");
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn reinserting_replaces_record() {
        let store = InMemoryDocumentStore::default();
        store
            .insert_document("conv", DocumentFile::new("d1", "old.pdf", "application/pdf"))
            .await
            .expect("insert");
        store
            .insert_document("conv", DocumentFile::new("d1", "new.pdf", "application/pdf"))
            .await
            .expect("reinsert");

        let docs = store.list_documents("conv").await.expect("list");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "new.pdf");
        assert_eq!(store.clear_conversation("conv").await.expect("clear"), 1);
    }
}
