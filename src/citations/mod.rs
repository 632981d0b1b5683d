pub mod context;
pub mod format;
pub mod search;

pub use context::{
    assemble_context, assemble_context_with, assemble_for_conversation, link_citations,
    AssembledContext, CitationWithPosition, ContextOptions,
};
pub use format::{
    build_cell_marker, build_citation_marker, format_citation, parse_markers, CitationMarker,
    CitationStyle,
};
pub use search::{search, CitedChunk};
