use async_trait::async_trait;
use paperscope_core::{PartialRecord, RawCandidate};

use crate::error::Result;
use crate::http::{FetchRequest, FetchedPage, ResilientFetcher};

/// Venue-specific knowledge: how to list a venue's papers and how to read a
/// paper's detail page. Everything else (storage, retries, resolution,
/// generic extraction) is shared.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Tag stored in each record's `provenance` field, e.g. `"cvpr24"`.
    fn provenance(&self) -> &str;

    async fn discover(&self, fetcher: &ResilientFetcher) -> Result<Vec<RawCandidate>>;

    /// Request for the candidate's detail page, or `None` when there is none.
    fn detail_request(&self, candidate: &RawCandidate) -> Option<FetchRequest> {
        candidate
            .detail_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(FetchRequest::page)
    }

    /// Venue-specific fields from the detail page. The shared extraction
    /// chains run afterwards for anything still missing.
    fn extract(&self, _candidate: &RawCandidate, _page: &FetchedPage) -> PartialRecord {
        PartialRecord::default()
    }
}
