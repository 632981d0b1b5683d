use serde::{Deserialize, Serialize};

use crate::documents::PageContent;

const CONTEXT_BEFORE: usize = 50;
const CONTEXT_AFTER: usize = 50;
const FALLBACK_CONTEXT_AFTER: usize = 80;
const MIN_FALLBACK_WORD_CHARS: usize = 4;
const FALLBACK_MIN_QUERY_WORDS: usize = 3;

pub const ELLIPSIS: &str = "...";

/// One page-attributed match returned by [`search`].
///
/// `start_index`/`end_index` are character offsets of the match inside the
/// page's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitedChunk {
    pub text: String,
    pub page_number: u32,
    pub start_index: usize,
    pub end_index: usize,
}

/// A match inside a flat, non-paginated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    pub start_index: usize,
    pub end_index: usize,
}

/// Literal, case-insensitive substring search over pages.
///
/// Results are ordered by page and then by position, capped at `max_results`.
/// When the exact phrase is absent and the query has more than two words, each
/// word of four or more characters is searched individually instead.
pub fn search(query: &str, pages: &[PageContent], max_results: usize) -> Vec<CitedChunk> {
    let needle = fold_chars(query.trim());
    if needle.is_empty() || max_results == 0 {
        return Vec::new();
    }

    let exact = search_phrase(&needle, pages, max_results);
    if !exact.is_empty() || query.split_whitespace().count() < FALLBACK_MIN_QUERY_WORDS {
        return exact;
    }

    let words = fallback_words(query);
    if words.is_empty() {
        return exact;
    }

    search_words(&words, pages, max_results)
}

/// Best-effort single match in flat text: the phrase first, then the first
/// long-enough query word that occurs.
pub fn scan_text(query: &str, text: &str) -> Option<Excerpt> {
    let needle = fold_chars(query.trim());
    if needle.is_empty() {
        return None;
    }

    let original: Vec<char> = text.chars().collect();
    let folded: Vec<char> = original.iter().copied().map(fold).collect();

    if let Some(start) = find_all(&folded, &needle).first().copied() {
        return Some(excerpt(
            &original,
            start,
            start + needle.len(),
            CONTEXT_BEFORE,
            CONTEXT_AFTER,
        ));
    }

    fallback_words(query).into_iter().find_map(|word| {
        find_all(&folded, &word).first().map(|&start| {
            excerpt(
                &original,
                start,
                start + word.len(),
                CONTEXT_BEFORE,
                FALLBACK_CONTEXT_AFTER,
            )
        })
    })
}

fn search_phrase(needle: &[char], pages: &[PageContent], max_results: usize) -> Vec<CitedChunk> {
    let mut results = Vec::new();

    for page in pages {
        let original: Vec<char> = page.content().chars().collect();
        let folded: Vec<char> = original.iter().copied().map(fold).collect();

        for start in find_all(&folded, needle) {
            let found = excerpt(
                &original,
                start,
                start + needle.len(),
                CONTEXT_BEFORE,
                CONTEXT_AFTER,
            );
            results.push(found.into_chunk(page.page_number()));
            if results.len() >= max_results {
                return results;
            }
        }
    }

    results
}

fn search_words(words: &[Vec<char>], pages: &[PageContent], max_results: usize) -> Vec<CitedChunk> {
    let mut results = Vec::new();

    for page in pages {
        let original: Vec<char> = page.content().chars().collect();
        let folded: Vec<char> = original.iter().copied().map(fold).collect();

        let mut hits: Vec<(usize, usize)> = words
            .iter()
            .flat_map(|word| {
                find_all(&folded, word)
                    .into_iter()
                    .map(move |start| (start, word.len()))
            })
            .collect();
        // Position order, not query-word order: results stay sorted by page
        // then offset in both search modes.
        hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        hits.dedup_by_key(|hit| hit.0);

        for (start, len) in hits {
            let found = excerpt(
                &original,
                start,
                start + len,
                CONTEXT_BEFORE,
                FALLBACK_CONTEXT_AFTER,
            );
            results.push(found.into_chunk(page.page_number()));
            if results.len() >= max_results {
                return results;
            }
        }
    }

    results
}

fn fallback_words(query: &str) -> Vec<Vec<char>> {
    let mut words: Vec<Vec<char>> = Vec::new();
    for raw in query.split_whitespace() {
        let word = fold_chars(raw.trim_matches(|c: char| !c.is_alphanumeric()));
        if word.len() >= MIN_FALLBACK_WORD_CHARS && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

/// Start offsets of every occurrence; scanning resumes one char after each hit.
fn find_all(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    (0..=haystack.len() - needle.len())
        .filter(|&start| haystack[start..start + needle.len()] == *needle)
        .collect()
}

fn excerpt(original: &[char], start: usize, end: usize, before: usize, after: usize) -> Excerpt {
    let window_start = start.saturating_sub(before);
    let window_end = end.saturating_add(after).min(original.len());

    let body: String = original[window_start..window_end].iter().collect();
    let mut text = String::with_capacity(body.len() + ELLIPSIS.len() * 2);
    if window_start > 0 {
        text.push_str(ELLIPSIS);
    }
    text.push_str(body.trim());
    if window_end < original.len() {
        text.push_str(ELLIPSIS);
    }

    Excerpt {
        text,
        start_index: start,
        end_index: end,
    }
}

impl Excerpt {
    fn into_chunk(self, page_number: u32) -> CitedChunk {
        CitedChunk {
            text: self.text,
            page_number,
            start_index: self.start_index,
            end_index: self.end_index,
        }
    }
}

// One char in, one char out, so folded offsets line up with the original text.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn fold_chars(text: &str) -> Vec<char> {
    text.chars().map(fold).collect()
}
