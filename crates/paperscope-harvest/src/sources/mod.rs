//! External bibliographic sources used for cross-source resolution, abstract
//! lookups and journal discovery.

pub mod arxiv;
pub mod crossref;
pub mod openalex;
pub mod semantic_scholar;

pub use arxiv::ArxivSearch;
pub use crossref::CrossrefLookup;
pub use openalex::{OpenAlexCollector, OpenAlexLookup, reconstruct_abstract};
pub use semantic_scholar::SemanticScholar;

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value.map(clean_text).filter(|v| !v.is_empty())
}
