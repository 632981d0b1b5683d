use std::path::Path;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::types::{ExtractionResult, PageContent};
use crate::error::{ExtractionError, ExtractionOutcome};

/// The source formats extraction understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    const TEXT_APPLICATION_TYPES: &'static [&'static str] = &[
        "application/json",
        "application/xml",
        "application/javascript",
        "application/typescript",
        "application/x-javascript",
        "application/x-typescript",
        "application/x-yaml",
        "application/yaml",
        "application/toml",
        "application/x-sh",
        "application/sql",
        "application/x-python",
        "application/x-rust",
        "application/csv",
    ];

    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/pdf" {
            return Some(Self::Pdf);
        }

        if essence.starts_with("text/") || Self::TEXT_APPLICATION_TYPES.contains(&essence.as_str())
        {
            return Some(Self::PlainText);
        }

        None
    }
}

/// Best-effort MIME guess from a file extension, for callers that only have a path.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/x-yaml",
        "toml" => "application/toml",
        "js" | "mjs" | "cjs" => "application/javascript",
        "ts" | "tsx" => "application/typescript",
        "txt" | "log" | "rs" | "py" | "go" | "java" | "c" | "h" | "cpp" | "hpp" | "rb" | "sh"
        | "sql" | "css" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Convert a raw buffer into page-addressable text.
///
/// PDF decoding runs on a blocking worker so concurrent conversation turns are
/// not stalled. Failures come back as [`ExtractionError`]; nothing panics past
/// this boundary.
#[instrument(skip(buffer), fields(bytes = buffer.len()))]
pub async fn extract(
    buffer: Vec<u8>,
    mime_type: &str,
    max_text_length: usize,
) -> ExtractionOutcome<ExtractionResult> {
    let kind = DocumentKind::from_mime(mime_type)
        .ok_or_else(|| ExtractionError::UnsupportedType(mime_type.to_string()))?;

    match kind {
        DocumentKind::PlainText => extract_plain_text(&buffer, max_text_length),
        DocumentKind::Pdf => {
            let (raw_pages, page_count) =
                tokio::task::spawn_blocking(move || decode_pdf_pages(&buffer))
                    .await
                    .map_err(|err| {
                        ExtractionError::Malformed(format!("PDF decoding task failed: {err}"))
                    })??;
            debug!(page_count, "PDF decoded");
            build_from_pages(raw_pages, page_count, max_text_length)
        }
    }
}

pub async fn extract_file(
    path: &Path,
    mime_type: &str,
    max_text_length: usize,
) -> ExtractionOutcome<ExtractionResult> {
    // Reject before touching the filesystem.
    DocumentKind::from_mime(mime_type)
        .ok_or_else(|| ExtractionError::UnsupportedType(mime_type.to_string()))?;

    let buffer = tokio::fs::read(path).await?;
    extract(buffer, mime_type, max_text_length).await
}

/// Non-paginated sources become a single page numbered 1.
pub fn extract_plain_text(
    buffer: &[u8],
    max_text_length: usize,
) -> ExtractionOutcome<ExtractionResult> {
    let decoded = String::from_utf8_lossy(buffer);
    let content = truncate_chars(decoded.trim(), max_text_length).trim_end();

    if content.is_empty() {
        return Err(ExtractionError::NoExtractableText);
    }

    Ok(ExtractionResult {
        merged_content: content.to_string(),
        pages: vec![PageContent::new(1, content)],
        page_count: 1,
    })
}

/// Assemble an [`ExtractionResult`] from per-page raw text.
///
/// Pages without text are dropped; `page_count` still reports the physical
/// page total. The merged text is hard-cut at `max_text_length` characters.
pub fn build_from_pages(
    raw_pages: Vec<(u32, String)>,
    page_count: u32,
    max_text_length: usize,
) -> ExtractionOutcome<ExtractionResult> {
    let mut pages: Vec<PageContent> = raw_pages
        .into_iter()
        .filter(|(number, _)| *number >= 1)
        .map(|(number, text)| PageContent::new(number, text))
        .filter(|page| !page.content().is_empty())
        .collect();
    pages.sort_by_key(PageContent::page_number);
    pages.dedup_by_key(|page| page.page_number());

    if pages.is_empty() {
        return Err(ExtractionError::NoExtractableText);
    }

    let merged = pages
        .iter()
        .map(|page| format!("[Page {}]\n{}", page.page_number(), page.content()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let merged_len = merged.chars().count();
    let merged_content = if merged_len > max_text_length {
        warn!(
            merged_len,
            max_text_length, "Merged document text exceeds budget; truncating"
        );
        truncate_chars(&merged, max_text_length).to_string()
    } else {
        merged
    };

    Ok(ExtractionResult {
        merged_content,
        pages,
        page_count,
    })
}

fn decode_pdf_pages(buffer: &[u8]) -> ExtractionOutcome<(Vec<(u32, String)>, u32)> {
    let doc =
        Document::load_mem(buffer).map_err(|err| ExtractionError::Malformed(err.to_string()))?;

    if doc.is_encrypted() {
        return Err(ExtractionError::Malformed(
            "PDF is encrypted and cannot be read".to_string(),
        ));
    }

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let page_count = u32::try_from(page_numbers.len()).unwrap_or(u32::MAX);

    let mut raw_pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) => raw_pages.push((number, text)),
            Err(err) => {
                debug!(page = number, %err, "Page text could not be decoded; skipping");
            }
        }
    }

    Ok((raw_pages, page_count))
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Structured outcome handed to UI and persistence callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub page_count: u32,
    pub pages: Vec<PageContent>,
}

impl From<&ExtractionOutcome<ExtractionResult>> for ExtractionReport {
    fn from(outcome: &ExtractionOutcome<ExtractionResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                success: true,
                error: None,
                page_count: result.page_count,
                pages: result.pages.clone(),
            },
            Err(err) => Self {
                success: false,
                error: Some(err.to_string()),
                page_count: 0,
                pages: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Minimal PDF with one page per entry; empty strings become blank pages.
    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in texts {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let page_total = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_total,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("save pdf");
        buffer
    }

    #[tokio::test]
    async fn pdf_blank_middle_page_is_skipped() {
        let bytes = pdf_with_pages(&["Introduction to the budget", "", "Appendix with totals"]);
        let result = extract(bytes, "application/pdf", 50_000)
            .await
            .expect("pdf extraction");

        let numbers: Vec<u32> = result.pages.iter().map(|p| p.page_number()).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(result.page_count, 3);
        assert!(result.pages[0].content().contains("Introduction to the budget"));
        assert!(result.pages[1].content().contains("Appendix with totals"));
        assert!(result.merged_content.starts_with("[Page 1]\n"));
        assert!(result.merged_content.contains("\n\n[Page 3]\n"));
    }

    #[tokio::test]
    async fn pdf_without_text_is_recoverable_failure() {
        let bytes = pdf_with_pages(&["", ""]);
        let err = extract(bytes, "application/pdf", 50_000)
            .await
            .expect_err("no text");
        assert_eq!(err, ExtractionError::NoExtractableText);
    }

    #[test]
    fn blank_pages_are_dropped_but_counted() {
        let raw = vec![
            (1, "Introduction to the budget".to_string()),
            (2, "   \n  ".to_string()),
            (3, "Appendix with totals".to_string()),
        ];

        let result = build_from_pages(raw, 3, 50_000).expect("extraction");
        assert_eq!(result.pages.len(), 2);
        assert_eq!(result.pages[0].page_number(), 1);
        assert_eq!(result.pages[1].page_number(), 3);
        assert_eq!(result.page_count, 3);
        assert_eq!(
            result.merged_content,
            "[Page 1]\nIntroduction to the budget\n\n[Page 3]\nAppendix with totals"
        );
    }

    #[test]
    fn page_numbers_are_strictly_increasing() {
        let raw = vec![
            (3, "three".to_string()),
            (1, "one".to_string()),
            (3, "three again".to_string()),
            (2, "two".to_string()),
        ];

        let result = build_from_pages(raw, 3, 50_000).expect("extraction");
        let numbers: Vec<u32> = result.pages.iter().map(|p| p.page_number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn all_blank_pages_is_recoverable_failure() {
        let raw = vec![(1, String::new()), (2, "  ".to_string())];
        let err = build_from_pages(raw, 2, 50_000).expect_err("no text");
        assert_eq!(err, ExtractionError::NoExtractableText);
    }

    #[test]
    fn merged_content_is_hard_cut_at_budget() {
        let raw = vec![(1, "a".repeat(80)), (2, "b".repeat(80))];
        let result = build_from_pages(raw, 2, 100).expect("extraction");
        assert_eq!(result.merged_content.chars().count(), 100);
        // Pages keep their full text even when the merged view is cut.
        assert_eq!(result.pages[1].char_len(), 80);
    }

    #[test]
    fn merged_content_under_budget_is_untouched() {
        let raw = vec![(1, "short page".to_string())];
        let result = build_from_pages(raw, 1, 100).expect("extraction");
        assert!(result.merged_content.chars().count() < 100);
        assert!(result.merged_content.ends_with("short page"));
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        assert_eq!(truncate_chars("página", 3), "pág");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn plain_text_becomes_single_page() {
        let result = extract_plain_text(b"\n  fn main() {}\n  ", 50_000).expect("text");
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].page_number(), 1);
        assert_eq!(result.pages[0].content(), "fn main() {}");
        assert_eq!(result.pages[0].word_count(), 3);
        assert_eq!(result.merged_content, "fn main() {}");
    }

    #[test]
    fn plain_text_respects_length_cap() {
        let body = "palabra ".repeat(100);
        let result = extract_plain_text(body.as_bytes(), 50).expect("text");
        assert!(result.merged_content.chars().count() <= 50);
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected_without_decoding() {
        let err = extract(vec![0xFF, 0xD8], "image/jpeg", 50_000)
            .await
            .expect_err("unsupported");
        assert_eq!(err, ExtractionError::UnsupportedType("image/jpeg".to_string()));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_malformed() {
        let err = extract(b"definitely not a pdf".to_vec(), "application/pdf", 50_000)
            .await
            .expect_err("corrupt pdf");
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_failure() {
        let path = std::env::temp_dir().join("folio-cortex-missing-file.txt");
        let err = extract_file(&path, "text/plain", 50_000)
            .await
            .expect_err("missing file");
        assert!(matches!(err, ExtractionError::Io(_)));
    }

    #[test]
    fn mime_detection_covers_text_and_pdf() {
        assert_eq!(
            DocumentKind::from_mime("application/pdf"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_mime("text/plain; charset=utf-8"),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(
            DocumentKind::from_mime("application/json"),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(DocumentKind::from_mime("image/png"), None);
        assert_eq!(mime_from_path(Path::new("report.PDF")), "application/pdf");
        assert_eq!(mime_from_path(Path::new("notes.md")), "text/markdown");
    }

    #[test]
    fn report_reflects_failure() {
        let outcome: ExtractionOutcome<ExtractionResult> = Err(ExtractionError::NoExtractableText);
        let report = ExtractionReport::from(&outcome);
        assert!(!report.success);
        assert_eq!(
            report.error.as_deref(),
            Some("no extractable text found in document")
        );
    }
}
