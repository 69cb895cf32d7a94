//! Venue harvesting: resilient fetching, cross-source resolution and field extraction.

pub mod collector;
pub mod config;
pub mod error;
pub mod extraction;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod resolver;
pub mod sources;
pub mod timing;

pub use collector::Collector;
pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
pub use extraction::{
    AbstractLookup, Document, Extracted, ExtractionChain, ExtractionStrategy, FallbackChain,
};
pub use http::{
    FetchRequest, FetchedPage, RawResponse, RequestKind, ReqwestTransport, ResilientFetcher,
    RetryPolicy, Transport,
};
pub use logging::init_tracing;
pub use pipeline::{IngestPipeline, IngestReport, ItemFailure, Stage};
pub use resolver::{CandidateSearch, Match, MatchResult, Resolver, SourceCandidate};
