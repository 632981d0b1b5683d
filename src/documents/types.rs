use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physical page of an extracted document.
///
/// Pages are immutable: the word count is derived when the page is built
/// (and again when it is deserialized), so it can never drift from `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredPage")]
pub struct PageContent {
    page_number: u32,
    content: String,
    word_count: usize,
}

impl PageContent {
    pub fn new(page_number: u32, content: impl Into<String>) -> Self {
        let content = content.into().trim().to_string();
        let word_count = count_words(&content);
        Self {
            page_number,
            content,
            word_count,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPage {
    page_number: u32,
    content: String,
}

impl From<StoredPage> for PageContent {
    fn from(stored: StoredPage) -> Self {
        PageContent::new(stored.page_number, stored.content)
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Output of processing a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub merged_content: String,
    pub pages: Vec<PageContent>,
    pub page_count: u32,
}

impl ExtractionResult {
    pub fn word_count(&self) -> usize {
        self.pages.iter().map(PageContent::word_count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A document attached to a conversation, as the persistence layer stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub extracted_content: Option<String>,
    #[serde(default)]
    pub pages: Option<Vec<PageContent>>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentFile {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            extracted_content: None,
            pages: None,
            metadata: DocumentMetadata::default(),
            processing_status: ProcessingStatus::Pending,
            uploaded_at: Utc::now(),
        }
    }

    /// Attach a successful extraction, marking the record completed.
    pub fn with_extraction(mut self, result: &ExtractionResult) -> Self {
        self.extracted_content = Some(result.merged_content.clone());
        self.pages = Some(result.pages.clone());
        self.metadata.word_count = result.word_count();
        self.metadata.page_count = result.page_count;
        self.metadata.error = None;
        self.processing_status = ProcessingStatus::Completed;
        self
    }

    pub fn has_text(&self) -> bool {
        self.pages.as_ref().is_some_and(|pages| !pages.is_empty())
            || self
                .extracted_content
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_repeated_whitespace() {
        let page = PageContent::new(1, "  alpha   beta\n\tgamma  ");
        assert_eq!(page.content(), "alpha   beta\n\tgamma");
        assert_eq!(page.word_count(), 3);
    }

    #[test]
    fn deserialized_pages_recompute_word_count() {
        let raw = r#"{"pageNumber":4,"content":"one two three","wordCount":99}"#;
        let page: PageContent = serde_json::from_str(raw).expect("page json");
        assert_eq!(page.page_number(), 4);
        assert_eq!(page.word_count(), 3);

        let json = serde_json::to_value(&page).expect("serialize page");
        assert_eq!(json["wordCount"], 3);
        assert_eq!(json["pageNumber"], 4);
    }

    #[test]
    fn completed_record_carries_counts() {
        let result = ExtractionResult {
            merged_content: "[Page 1]\nhola mundo".to_string(),
            pages: vec![PageContent::new(1, "hola mundo")],
            page_count: 2,
        };
        let doc = DocumentFile::new("d1", "a.pdf", "application/pdf").with_extraction(&result);
        assert_eq!(doc.processing_status, ProcessingStatus::Completed);
        assert_eq!(doc.metadata.word_count, 2);
        assert_eq!(doc.metadata.page_count, 2);
        assert!(doc.has_text());
    }
}
