use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::cache::{PageCache, PageCacheKey, SharedPageCache};
use super::extract::{extract, mime_from_path, ExtractionReport};
use super::store::SharedDocumentStore;
use super::types::{DocumentFile, ProcessingStatus};
use crate::citations::{assemble_for_conversation, AssembledContext, ContextOptions};
use crate::config::AppConfig;
use crate::error::ExtractionError;

pub type SharedDocumentService = Arc<DocumentService>;

/// Outcome of attaching one file to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIngest {
    pub document_id: String,
    pub filename: String,
    pub report: ExtractionReport,
}

/// Ties extraction, the page cache and the document store together.
pub struct DocumentService {
    store: SharedDocumentStore,
    cache: SharedPageCache,
    config: AppConfig,
}

impl DocumentService {
    pub fn new(store: SharedDocumentStore, config: AppConfig) -> Self {
        let cache = Arc::new(PageCache::new(config.cache_ttl(), config.cache_capacity));
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &SharedPageCache {
        &self.cache
    }

    pub fn store(&self) -> &SharedDocumentStore {
        &self.store
    }

    /// Extract `bytes` and persist the pages for `conversation_id`.
    ///
    /// Extraction failures are reported in the returned [`ExtractionReport`];
    /// they never surface as an `Err`.
    #[instrument(skip_all, fields(conversation_id = %conversation_id, filename = %filename))]
    pub async fn ingest(
        &self,
        conversation_id: &str,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> DocumentIngest {
        let key = PageCacheKey::for_bytes(conversation_id, &bytes);
        let document_id = key.document_hash.chars().take(16).collect::<String>();

        let mut record = DocumentFile::new(&document_id, filename, mime_type);
        record.processing_status = ProcessingStatus::Processing;
        if let Err(err) = self.store.insert_document(conversation_id, record).await {
            warn!(?err, "Failed to register document record");
        }

        let max_text_length = self.config.max_text_length;
        let mime = mime_type.to_string();
        let outcome = self
            .cache
            .get_or_extract(key, extract(bytes, &mime, max_text_length))
            .await
            .map(|shared| (*shared).clone());

        debug!(stats = ?self.cache.stats(), "Page cache state");

        match &outcome {
            Ok(result) => {
                info!(
                    pages = result.pages.len(),
                    page_count = result.page_count,
                    "Document extracted"
                );
                if let Err(err) = self
                    .store
                    .save_extraction(conversation_id, &document_id, result)
                    .await
                {
                    warn!(?err, "Failed to persist extracted pages");
                }
            }
            Err(err) => {
                warn!(%err, "Document extraction failed");
                if let Err(store_err) = self
                    .store
                    .mark_failed(conversation_id, &document_id, &err.to_string())
                    .await
                {
                    warn!(?store_err, "Failed to record extraction failure");
                }
            }
        }

        DocumentIngest {
            document_id,
            filename: filename.to_string(),
            report: ExtractionReport::from(&outcome),
        }
    }

    pub async fn ingest_file(&self, conversation_id: &str, path: &Path) -> DocumentIngest {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_from_path(path);

        match tokio::fs::read(path).await {
            Ok(bytes) => self.ingest(conversation_id, &filename, mime_type, bytes).await,
            Err(err) => {
                warn!(path = %path.display(), %err, "Failed to read document");
                let outcome = Err(ExtractionError::from(err));
                DocumentIngest {
                    document_id: String::new(),
                    filename,
                    report: ExtractionReport::from(&outcome),
                }
            }
        }
    }

    pub async fn context_for(&self, conversation_id: &str, query: &str) -> AssembledContext {
        let options = ContextOptions::from_config(&self.config);
        assemble_for_conversation(self.store.as_ref(), conversation_id, query, &options).await
    }

    pub async fn has_documents(&self, conversation_id: &str) -> bool {
        match self.store.list_documents(conversation_id).await {
            Ok(docs) => docs
                .iter()
                .any(|doc| doc.processing_status == ProcessingStatus::Completed),
            Err(err) => {
                warn!(?err, "Failed to list documents; assuming none loaded");
                false
            }
        }
    }

    /// Forget every document of a conversation (reload, deletion or archive).
    pub async fn clear(&self, conversation_id: &str) -> anyhow::Result<usize> {
        self.cache.invalidate_conversation(conversation_id);
        self.store.clear_conversation(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::store::InMemoryDocumentStore;

    fn service() -> DocumentService {
        DocumentService::new(InMemoryDocumentStore::shared(), AppConfig::default())
    }

    #[tokio::test]
    async fn ingest_then_context_cites_the_page() {
        let service = service();
        let ingest = service
            .ingest(
                "conv-1",
                "plazos.txt",
                "text/plain",
                b"El plazo de entrega vence el 1 de marzo.".to_vec(),
            )
            .await;
        assert!(ingest.report.success);
        assert!(service.has_documents("conv-1").await);

        let ctx = service.context_for("conv-1", "plazo de entrega").await;
        assert!(ctx.has_context);
        assert_eq!(ctx.citations.len(), 1);
        assert_eq!(ctx.citations[0].page_number, Some(1));
    }

    #[tokio::test]
    async fn reuploading_same_bytes_hits_the_cache() {
        let service = service();
        let bytes = b"Acta de la reunion de enero.".to_vec();
        let first = service
            .ingest("conv-1", "acta.txt", "text/plain", bytes.clone())
            .await;
        let second = service
            .ingest("conv-1", "acta.txt", "text/plain", bytes)
            .await;

        assert_eq!(first.document_id, second.document_id);
        let stats = service.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn unsupported_upload_is_recorded_as_failed() {
        let service = service();
        let ingest = service
            .ingest("conv-1", "foto.png", "image/png", vec![1, 2, 3])
            .await;
        assert!(!ingest.report.success);
        assert!(!service.has_documents("conv-1").await);

        let docs = service.store().list_documents("conv-1").await.expect("list");
        assert_eq!(docs[0].processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn clearing_drops_documents_and_cache() {
        let service = service();
        service
            .ingest("conv-1", "a.txt", "text/plain", b"contenido".to_vec())
            .await;
        assert_eq!(service.clear("conv-1").await.expect("clear"), 1);
        assert!(!service.has_documents("conv-1").await);

        let ctx = service.context_for("conv-1", "contenido").await;
        assert!(!ctx.has_context);
    }

    #[tokio::test]
    async fn missing_file_reports_io_failure() {
        let service = service();
        let path = std::env::temp_dir().join("folio-cortex-no-such-upload.pdf");
        let ingest = service.ingest_file("conv-1", &path).await;
        assert!(!ingest.report.success);
        assert!(ingest
            .report
            .error
            .as_deref()
            .is_some_and(|msg| msg.starts_with("failed to read document")));
    }
}
