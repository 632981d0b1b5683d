use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::format::{build_citation_marker, format_citation, CitationStyle};
use super::search::{scan_text, search, ELLIPSIS};
use crate::config::AppConfig;
use crate::documents::extract::truncate_chars;
use crate::documents::{DocumentFile, DocumentStore, ProcessingStatus};

const SUMMARY_CHARS: usize = 500;
const PREVIEW_CHARS: usize = 3000;

const CITATION_FOOTER: &str = "=== INSTRUCCIONES DE CITACIÓN (OBLIGATORIAS) ===\n\
- Toda afirmación basada en los documentos DEBE llevar su número de cita entre corchetes, por ejemplo [1] o [2], y ese número debe coincidir exactamente con el fragmento numerado de arriba.\n\
- Si el contexto no tiene fragmentos numerados, menciona el nombre del documento del que sale cada dato.\n\
- No cites números que no aparezcan arriba y no atribuyas a un documento nada que no esté literalmente en él.\n\
- Si la respuesta no está en los documentos, dilo claramente (\"No encontré esa información en los documentos\"). NUNCA inventes contenido, cifras ni citas.\n";

static BRACKET_NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,4})\]").expect("numeral regex is valid"));

/// One numbered excerpt handed to the model, with the marker the UI will render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationWithPosition {
    pub citation_id: u32,
    pub filename: String,
    pub page_number: Option<u32>,
    pub text: String,
    pub start_index: usize,
    pub end_index: usize,
    pub marker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledContext {
    pub has_context: bool,
    pub context_text: String,
    pub citations: Vec<CitationWithPosition>,
}

impl AssembledContext {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub max_length: usize,
    pub max_results_per_document: usize,
    pub style: CitationStyle,
}

impl ContextOptions {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            max_results_per_document: AppConfig::DEFAULT_MAX_RESULTS_PER_DOCUMENT,
            style: CitationStyle::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_length: config.context_max_length,
            max_results_per_document: config.max_results_per_document,
            style: CitationStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextMode {
    Search,
    Summary,
}

/// Build the document context block prepended to a model call.
pub fn assemble_context(
    documents: &[DocumentFile],
    query: &str,
    max_length: usize,
) -> AssembledContext {
    assemble_context_with(documents, query, &ContextOptions::new(max_length))
}

pub fn assemble_context_with(
    documents: &[DocumentFile],
    query: &str,
    options: &ContextOptions,
) -> AssembledContext {
    let mut ordered: Vec<&DocumentFile> = documents
        .iter()
        .filter(|doc| doc.processing_status != ProcessingStatus::Failed && doc.has_text())
        .collect();
    if ordered.is_empty() {
        return AssembledContext::empty();
    }
    ordered.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

    if !query.trim().is_empty() {
        if let Some(found) = search_mode(&ordered, query, options) {
            return found;
        }
        debug!("No excerpts matched; falling back to document summaries");
    }

    summary_mode(&ordered, options)
}

/// Load the conversation's documents and assemble their context.
///
/// Storage failures degrade to an empty context instead of failing the turn.
#[instrument(skip_all, fields(conversation_id = %conversation_id))]
pub async fn assemble_for_conversation(
    store: &dyn DocumentStore,
    conversation_id: &str,
    query: &str,
    options: &ContextOptions,
) -> AssembledContext {
    match store.list_documents(conversation_id).await {
        Ok(documents) => assemble_context_with(&documents, query, options),
        Err(err) => {
            warn!(?err, "Failed to list conversation documents; continuing without context");
            AssembledContext::empty()
        }
    }
}

fn search_mode(
    documents: &[&DocumentFile],
    query: &str,
    options: &ContextOptions,
) -> Option<AssembledContext> {
    let header = render_header(documents, ContextMode::Search);
    let budget = body_budget(&header, options.max_length)?;

    let mut body = String::new();
    let mut body_len = 0usize;
    let mut citations: Vec<CitationWithPosition> = Vec::new();
    let mut next_id: u32 = 1;

    'documents: for doc in documents {
        for excerpt in document_excerpts(doc, query, options.max_results_per_document) {
            let citation = format_citation(&doc.filename, excerpt.page_number, options.style);
            let block = format!(
                "[{next_id}] {citation}:\n>>> \"{}\"\n\n",
                excerpt.text
            );
            let block_len = block.chars().count();
            if body_len + block_len > budget {
                debug!(next_id, "Context budget reached; dropping remaining excerpts");
                break 'documents;
            }

            body.push_str(&block);
            body_len += block_len;
            citations.push(CitationWithPosition {
                citation_id: next_id,
                filename: doc.filename.clone(),
                page_number: excerpt.page_number,
                marker: build_citation_marker(
                    next_id,
                    &doc.filename,
                    excerpt.page_number,
                    &excerpt.text,
                ),
                text: excerpt.text,
                start_index: excerpt.start_index,
                end_index: excerpt.end_index,
            });
            next_id += 1;
        }
    }

    if citations.is_empty() {
        return None;
    }

    Some(AssembledContext {
        has_context: true,
        context_text: format!("{header}{body}{CITATION_FOOTER}"),
        citations,
    })
}

fn summary_mode(documents: &[&DocumentFile], options: &ContextOptions) -> AssembledContext {
    let header = render_header(documents, ContextMode::Summary);
    let Some(budget) = body_budget(&header, options.max_length) else {
        return AssembledContext::empty();
    };

    let mut body = String::new();
    let mut body_len = 0usize;

    for doc in documents {
        let block = render_summary_block(doc);
        let block_len = block.chars().count();
        if body_len + block_len > budget {
            break;
        }
        body.push_str(&block);
        body_len += block_len;
    }

    if body.is_empty() {
        return AssembledContext::empty();
    }

    AssembledContext {
        has_context: true,
        context_text: format!("{header}{body}{CITATION_FOOTER}"),
        citations: Vec::new(),
    }
}

struct PendingExcerpt {
    page_number: Option<u32>,
    text: String,
    start_index: usize,
    end_index: usize,
}

fn document_excerpts(doc: &DocumentFile, query: &str, limit: usize) -> Vec<PendingExcerpt> {
    match doc.pages.as_deref() {
        Some(pages) if !pages.is_empty() => search(query, pages, limit)
            .into_iter()
            .map(|chunk| PendingExcerpt {
                page_number: Some(chunk.page_number),
                text: chunk.text,
                start_index: chunk.start_index,
                end_index: chunk.end_index,
            })
            .collect(),
        _ => doc
            .extracted_content
            .as_deref()
            .and_then(|content| scan_text(query, content))
            .map(|found| PendingExcerpt {
                page_number: None,
                text: found.text,
                start_index: found.start_index,
                end_index: found.end_index,
            })
            .into_iter()
            .collect(),
    }
}

fn render_header(documents: &[&DocumentFile], mode: ContextMode) -> String {
    let names = documents
        .iter()
        .map(|doc| doc.filename.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let kind = match mode {
        ContextMode::Search => "los fragmentos relevantes para la consulta",
        ContextMode::Summary => "los resúmenes",
    };

    format!(
        "=== DOCUMENTOS ADJUNTOS ===\nDocumentos disponibles: {names}\nA continuación se incluyen {kind} de los documentos cargados por el usuario.\n\n"
    )
}

fn render_summary_block(doc: &DocumentFile) -> String {
    let page_count = match doc.metadata.page_count {
        0 => doc
            .pages
            .as_ref()
            .map(|pages| pages.len() as u32)
            .unwrap_or(1),
        count => count,
    };
    let word_count = match doc.metadata.word_count {
        0 => doc
            .pages
            .as_ref()
            .map(|pages| pages.iter().map(|page| page.word_count()).sum())
            .unwrap_or_else(|| {
                doc.extracted_content
                    .as_deref()
                    .map(crate::documents::count_words)
                    .unwrap_or(0)
            }),
        count => count,
    };

    let mut block = format!(
        "📄 {} ({page_count} páginas, {word_count} palabras)\n",
        doc.filename
    );

    match doc.metadata.summary.as_deref().map(str::trim) {
        Some(summary) if !summary.is_empty() => {
            block.push_str("Resumen: ");
            block.push_str(&clip(summary, SUMMARY_CHARS));
        }
        _ => {
            block.push_str("Contenido (vista previa):\n");
            block.push_str(&clip(&document_text(doc), PREVIEW_CHARS));
        }
    }
    block.push_str("\n\n");
    block
}

fn document_text(doc: &DocumentFile) -> Cow<'_, str> {
    if let Some(content) = doc.extracted_content.as_deref() {
        if !content.trim().is_empty() {
            return Cow::Borrowed(content.trim());
        }
    }

    Cow::Owned(
        doc.pages
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|page| page.content())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// At most `max_chars` characters, ellipsis included.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.chars().count());
    format!("{}{ELLIPSIS}", truncate_chars(text, keep).trim_end())
}

fn body_budget(header: &str, max_length: usize) -> Option<usize> {
    let fixed = header.chars().count() + CITATION_FOOTER.chars().count();
    max_length.checked_sub(fixed).filter(|budget| *budget > 0)
}

/// Replace the model's bracket numerals (`[1]`, `[2]`, …) with the markers
/// issued for this response. Numerals without a matching citation are kept.
pub fn link_citations(output: &str, citations: &[CitationWithPosition]) -> String {
    if citations.is_empty() {
        return output.to_string();
    }

    BRACKET_NUMERAL_RE
        .replace_all(output, |caps: &Captures<'_>| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(|id| citations.iter().find(|c| c.citation_id == id))
                .map(|citation| citation.marker.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
