//! Human-readable citations and the machine-parseable marker protocol.
//!
//! Markers are consumed by the UI renderer and must stay bit-exact:
//! `[[cite:<id>|<filename>|<page-or-empty>|<escaped-text>]]` and
//! `[[cell:<ref>]]` / `[[cell:<ref>|<value>]]`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PIPE: char = '|';
const PIPE_ESCAPED: char = '¦';
const CLOSE: char = ']';
const CLOSE_ESCAPED: char = '⟧';

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[\[(?:cite:(\d+)\|([^|\]]*)\|(\d*)\|([^|\]]*)|cell:([^|\]]+)(?:\|([^|\]]*))?)\]\]",
    )
    .expect("marker regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStyle {
    /// `(basename, p. N)`
    Inline,
    /// `[N]`
    Footnote,
    /// `[basename, página N]`
    #[default]
    Bracket,
}

/// Filename without its trailing extension.
pub fn basename(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(['/', '\\']) => stem,
        _ => filename,
    }
}

pub fn format_citation(filename: &str, page_number: Option<u32>, style: CitationStyle) -> String {
    let name = basename(filename);
    match (style, page_number) {
        (CitationStyle::Inline, Some(page)) => format!("({name}, p. {page})"),
        (CitationStyle::Inline, None) => format!("({name})"),
        (CitationStyle::Footnote, Some(page)) => format!("[{page}]"),
        (CitationStyle::Bracket, Some(page)) => format!("[{name}, página {page}]"),
        (CitationStyle::Footnote | CitationStyle::Bracket, None) => format!("[{name}]"),
    }
}

pub fn escape_marker_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            PIPE => PIPE_ESCAPED,
            CLOSE => CLOSE_ESCAPED,
            other => other,
        })
        .collect()
}

pub fn unescape_marker_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            PIPE_ESCAPED => PIPE,
            CLOSE_ESCAPED => CLOSE,
            other => other,
        })
        .collect()
}

pub fn build_citation_marker(
    id: u32,
    filename: &str,
    page_number: Option<u32>,
    text: &str,
) -> String {
    let page = page_number.map(|page| page.to_string()).unwrap_or_default();
    format!(
        "[[cite:{id}|{}|{page}|{}]]",
        escape_marker_text(filename),
        escape_marker_text(text)
    )
}

pub fn build_cell_marker(reference: &str, value: Option<&str>) -> String {
    let reference = escape_marker_text(reference.trim());
    match value {
        Some(value) => format!("[[cell:{reference}|{}]]", escape_marker_text(value)),
        None => format!("[[cell:{reference}]]"),
    }
}

/// A marker recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationMarker {
    Cell {
        reference: String,
        value: Option<String>,
    },
    Page {
        id: u32,
        filename: String,
        page: Option<u32>,
        text: String,
    },
}

impl fmt::Display for CitationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CitationMarker::Cell { reference, value } => {
                write!(f, "{}", build_cell_marker(reference, value.as_deref()))
            }
            CitationMarker::Page {
                id,
                filename,
                page,
                text,
            } => write!(f, "{}", build_citation_marker(*id, filename, *page, text)),
        }
    }
}

/// Every well-formed marker in `output`, in order of appearance.
pub fn parse_markers(output: &str) -> Vec<CitationMarker> {
    MARKER_RE
        .captures_iter(output)
        .filter_map(|caps| {
            if let Some(reference) = caps.get(5) {
                return Some(CitationMarker::Cell {
                    reference: unescape_marker_text(reference.as_str()),
                    value: caps.get(6).map(|m| unescape_marker_text(m.as_str())),
                });
            }

            let id = caps.get(1)?.as_str().parse().ok()?;
            let page = caps
                .get(3)
                .map(|m| m.as_str())
                .filter(|raw| !raw.is_empty())
                .and_then(|raw| raw.parse().ok());

            Some(CitationMarker::Page {
                id,
                filename: unescape_marker_text(caps.get(2)?.as_str()),
                page,
                text: unescape_marker_text(caps.get(4)?.as_str()),
            })
        })
        .collect()
}
