use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Specialists a message can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Pdf,
    Spreadsheet,
    Docs,
    Chart,
    Research,
    Direct,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Pdf => "pdf",
            AgentKind::Spreadsheet => "spreadsheet",
            AgentKind::Docs => "docs",
            AgentKind::Chart => "chart",
            AgentKind::Research => "research",
            AgentKind::Direct => "direct",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the router knows about the conversation when a message arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub has_document_loaded: bool,
    pub has_active_artifact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSelection {
    pub agent: AgentKind,
    /// For logs only; nothing downstream branches on it.
    pub reason: String,
}

impl AgentSelection {
    fn new(agent: AgentKind, reason: impl Into<String>) -> Self {
        Self {
            agent,
            reason: reason.into(),
        }
    }

    fn direct_default() -> Self {
        Self::new(
            AgentKind::Direct,
            "No specialist rule matched; answering directly",
        )
    }
}

/// Pick the specialist for `message`.
///
/// Evaluation order: the PDF table (only with a document loaded), explicit
/// `@agent` tokens, the open-question heuristic (again only with a document
/// loaded), then spreadsheet, docs, chart and research tables. Falls back to
/// [`AgentKind::Direct`].
pub fn route(message: &str, state: SessionState) -> AgentSelection {
    let normalized = message.to_lowercase();

    // A loaded document outranks every other signal, explicit tokens included.
    if state.has_document_loaded {
        if let Some(selection) = PDF_RULE.evaluate(message, &normalized) {
            return selection;
        }
    }

    if let Some(selection) = explicit_specialist(&normalized, state) {
        return selection;
    }

    if state.has_document_loaded {
        let other_keyword = OTHER_RULES
            .iter()
            .any(|rule| rule.matching_keyword(&normalized).is_some());
        if message.trim_end().ends_with('?') && !other_keyword {
            return AgentSelection::new(
                AgentKind::Pdf,
                "Open question while a document is loaded; assuming it is about the document",
            );
        }
    }

    OTHER_RULES
        .iter()
        .find_map(|rule| rule.evaluate(message, &normalized))
        .unwrap_or_else(AgentSelection::direct_default)
}

fn explicit_specialist(normalized: &str, state: SessionState) -> Option<AgentSelection> {
    // "@excel hazme una tabla" or "@pdf ..." pins the specialist.
    const TOKENS: &[(&str, AgentKind)] = &[
        ("@pdf", AgentKind::Pdf),
        ("@excel", AgentKind::Spreadsheet),
        ("@sheets", AgentKind::Spreadsheet),
        ("@docs", AgentKind::Docs),
        ("@word", AgentKind::Docs),
        ("@chart", AgentKind::Chart),
        ("@research", AgentKind::Research),
        ("@direct", AgentKind::Direct),
    ];

    TOKENS
        .iter()
        .filter(|(token, _)| contains_keyword(normalized, token))
        .find(|(_, agent)| *agent != AgentKind::Pdf || state.has_document_loaded)
        .map(|(token, agent)| {
            AgentSelection::new(*agent, format!("User explicitly requested {token}"))
        })
}

#[derive(Debug)]
struct AgentRule {
    agent: AgentKind,
    patterns: &'static [&'static str],
    keywords: &'static [&'static str],
    rationale: &'static str,
}

impl AgentRule {
    const fn new(
        agent: AgentKind,
        patterns: &'static [&'static str],
        keywords: &'static [&'static str],
        rationale: &'static str,
    ) -> Self {
        Self {
            agent,
            patterns,
            keywords,
            rationale,
        }
    }

    fn evaluate(&self, raw: &str, normalized: &str) -> Option<AgentSelection> {
        if let Some(pattern) = self.matching_pattern(raw) {
            return Some(AgentSelection::new(
                self.agent,
                format!("{} (pattern /{}/)", self.rationale, pattern),
            ));
        }

        self.matching_keyword(normalized).map(|keyword| {
            AgentSelection::new(
                self.agent,
                format!("{} (matched '{}')", self.rationale, keyword),
            )
        })
    }

    fn matching_pattern(&self, raw: &str) -> Option<&'static str> {
        COMPILED_PATTERNS
            .get(&self.agent)?
            .iter()
            .find(|(_, regex)| regex.is_match(raw))
            .map(|(source, _)| *source)
    }

    fn matching_keyword(&self, normalized: &str) -> Option<&'static str> {
        self.keywords
            .iter()
            .copied()
            .find(|keyword| contains_keyword(normalized, keyword))
    }
}

/// Substring match that only accepts hits on word boundaries.
fn contains_keyword(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, matched)| {
        let before_ok = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = text[start + matched.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

static COMPILED_PATTERNS: LazyLock<HashMap<AgentKind, Vec<(&'static str, Regex)>>> =
    LazyLock::new(|| {
        std::iter::once(&PDF_RULE)
            .chain(OTHER_RULES.iter())
            .map(|rule| {
                let compiled = rule
                    .patterns
                    .iter()
                    .map(|source| {
                        let regex = Regex::new(source).expect("routing pattern is valid");
                        (*source, regex)
                    })
                    .collect();
                (rule.agent, compiled)
            })
            .collect()
    });

const PDF_RULE: AgentRule = AgentRule::new(
    AgentKind::Pdf,
    &[
        r"(?i)\bqu[eé]\s+dice\s+(el|la|este|esta|ese|esa)\b",
        r"(?i)\b(seg[uú]n|de acuerdo (con|a))\s+(el|la|este|esta)\s+(documento|pdf|archivo|texto|informe|contrato)\b",
        r"(?i)\b(p[aá]gina|page|p\.)\s*\d+\b",
        r"(?i)\bwhat does (the|this) (document|pdf|file|paper|report) say\b",
        r"(?i)\b(in|from|according to) (the|this) (document|pdf|file|paper)\b",
        r"(?i)\b(resume|res[uú]meme|resumir|summari[sz]e)\b.*\b(documento|pdf|archivo|document|file)\b",
    ],
    &[
        "pdf",
        "el documento",
        "este documento",
        "del documento",
        "en el documento",
        "el archivo",
        "el contrato",
        "the document",
        "this document",
        "the file",
        "the paper",
        "qué dice",
        "que dice",
        "cita",
        "citas",
        "fuente",
        "resumen",
        "resume",
        "summarize",
        "summary",
        "capítulo",
        "chapter",
        "página",
        "pagina",
    ],
    "Request refers to the loaded document",
);

const OTHER_RULES: &[AgentRule] = &[
    AgentRule::new(
        AgentKind::Spreadsheet,
        &[
            r"(?i)\bhojas?\s+de\s+c[aá]lculo\b",
            r"\b[A-Z]{1,3}[0-9]{1,5}:[A-Z]{1,3}[0-9]{1,5}\b",
            r"(?i)\b(celda|cell)\s+[A-Z]{1,3}[0-9]{1,5}\b",
            r"(?i)=\s*(SUM|SUMA|AVERAGE|PROMEDIO|VLOOKUP|BUSCARV|COUNTIF|CONTAR\.SI|IF|SI)\s*\(",
        ],
        &[
            "excel",
            "spreadsheet",
            "hoja de cálculo",
            "hoja de calculo",
            "libro de excel",
            "workbook",
            "worksheet",
            "xlsx",
            "csv",
            "celda",
            "celdas",
            "columna",
            "columnas",
            "fila",
            "filas",
            "cell",
            "cells",
            "column",
            "columns",
            "row",
            "rows",
            "fórmula",
            "formula",
            "tabla dinámica",
            "pivot",
        ],
        "Request targets spreadsheet data",
    ),
    AgentRule::new(
        AgentKind::Docs,
        &[
            r"(?i)\b(redacta|escribe|write|draft)\s+(un|una|a|an)\s+(carta|informe|ensayo|art[ií]culo|documento|memo|propuesta|letter|report|essay|article|document|proposal)\b",
            r"(?i)\b(documento|document)\s+(de\s+)?word\b",
            r"(?i)\b(crea|genera|create|generate)\s+(un|a)\s+(documento|document)\b",
        ],
        &[
            "redacta",
            "redactar",
            "carta",
            "ensayo",
            "memo",
            "propuesta",
            "docx",
            "word",
            "informe",
            "draft",
            "letter",
            "essay",
            "proposal",
        ],
        "Request asks for document writing",
    ),
    AgentRule::new(
        AgentKind::Chart,
        &[
            r"(?i)\b(gr[aá]fic[oa]s?|chart|plot|graph)\b",
            r"(?i)\b(diagrama|histograma)\s+de\b",
        ],
        &[
            "gráfico",
            "grafico",
            "gráfica",
            "grafica",
            "chart",
            "plot",
            "histograma",
            "histogram",
            "visualiza",
            "visualize",
            "visualización",
        ],
        "Request asks for a chart or visualization",
    ),
    AgentRule::new(
        AgentKind::Research,
        &[
            r"(?i)\b(investiga|research|look up)\b",
            r"(?i)\bbusca\s+(informaci[oó]n|en internet|en la web)\b",
        ],
        &[
            "investiga",
            "investigación",
            "investigacion",
            "research",
            "estado del arte",
            "fuentes académicas",
            "search the web",
            "noticias",
            "latest news",
        ],
        "Request asks for external research",
    ),
];
