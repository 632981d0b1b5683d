use thiserror::Error;

/// Recoverable failures surfaced at the extraction boundary.
///
/// Callers treat every variant as "no document context available" rather than
/// a system fault. The type is `Clone` so that waiters coalesced on the same
/// in-flight extraction can all receive the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The MIME type is not one we know how to read; extraction was not attempted.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    /// The document could not be decoded (corrupt or malformed file).
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document decoded but no page yielded any text (e.g. a scanned PDF).
    #[error("no extractable text found in document")]
    NoExtractableText,

    /// Reading the source failed.
    #[error("failed to read document: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type ExtractionOutcome<T> = Result<T, ExtractionError>;
