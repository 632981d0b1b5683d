pub mod cache;
pub mod extract;
pub mod service;
pub mod store;
pub mod types;

pub use cache::{PageCache, PageCacheKey, SharedPageCache};
pub use extract::{extract, extract_file, mime_from_path, ExtractionReport};
pub use service::{DocumentIngest, DocumentService, SharedDocumentService};
pub use store::{DocumentStore, InMemoryDocumentStore, SharedDocumentStore};
pub use types::{
    count_words, DocumentFile, DocumentMetadata, ExtractionResult, PageContent, ProcessingStatus,
};
