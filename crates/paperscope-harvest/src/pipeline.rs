use std::fmt;
use std::sync::Arc;

use paperscope_core::{PartialRecord, RawCandidate, Record, RecordStore};

use crate::collector::Collector;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::extraction::{Document, ExtractionChain, FallbackChain, extract_doi};
use crate::http::{FetchedPage, ResilientFetcher};
use crate::resolver::{CandidateSearch, MatchResult, Resolver};
use crate::sources::{ArxivSearch, CrossrefLookup, OpenAlexLookup, SemanticScholar};

/// Where in a candidate's processing a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discover,
    DetailPage,
    Resolve,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::DetailPage => "detail_page",
            Self::Resolve => "resolve",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub identity: String,
    pub stage: Stage,
    pub message: String,
}

impl ItemFailure {
    fn new(identity: &str, stage: Stage, error: &HarvestError) -> Self {
        tracing::warn!(%identity, %stage, %error, "item failed");
        Self {
            identity: identity.to_string(),
            stage,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub discovered: usize,
    /// Already complete in the store; not touched.
    pub skipped: usize,
    pub saved_complete: usize,
    pub saved_partial: usize,
    /// Candidates whose fields came from a cross-source match.
    pub resolved: usize,
    pub failures: Vec<ItemFailure>,
}

impl IngestReport {
    pub fn saved(&self) -> usize {
        self.saved_complete + self.saved_partial
    }
}

/// Drives one collector's candidates through detail-page extraction,
/// cross-source resolution and DOI fallbacks into a [`RecordStore`].
///
/// Candidates are processed strictly one after another. Every upsert is
/// flushed to disk before the next candidate starts, so an interrupted run
/// loses at most the item in flight.
pub struct IngestPipeline {
    store: RecordStore,
    fetcher: Arc<ResilientFetcher>,
    abstract_chain: ExtractionChain,
    pdf_chain: ExtractionChain,
    resolver: Resolver,
    search: Option<Arc<dyn CandidateSearch>>,
    fallbacks: FallbackChain,
}

impl IngestPipeline {
    /// Default extraction chains, default resolver, no search source and no
    /// fallbacks.
    pub fn new(store: RecordStore, fetcher: Arc<ResilientFetcher>) -> Self {
        Self {
            store,
            fetcher,
            abstract_chain: ExtractionChain::abstract_text(),
            pdf_chain: ExtractionChain::pdf_link(),
            resolver: Resolver::default(),
            search: None,
            fallbacks: FallbackChain::new(0),
        }
    }

    /// Store for `(venue, year)` under the configured data directory, arXiv as
    /// the resolution source, Crossref, Semantic Scholar then OpenAlex as
    /// abstract fallbacks.
    pub fn from_config(config: &HarvestConfig, venue: &str, year: i32) -> Result<Self> {
        config.validate()?;
        let store = RecordStore::open(config.store.dataset_path(venue, year))?;
        let fetcher = Arc::new(ResilientFetcher::new(
            &config.fetch,
            config.sources.polite_email.as_deref(),
        )?);

        let search = ArxivSearch::from_config(Arc::clone(&fetcher), &config.sources);
        let fallbacks = FallbackChain::from_config(&config.extraction)
            .with(Arc::new(CrossrefLookup::from_config(
                Arc::clone(&fetcher),
                &config.sources,
            )))
            .with(Arc::new(SemanticScholar::from_config(
                Arc::clone(&fetcher),
                &config.sources,
            )))
            .with(Arc::new(OpenAlexLookup::from_config(
                Arc::clone(&fetcher),
                &config.sources,
            )));

        Ok(Self::new(store, fetcher)
            .with_resolver(Resolver::from_config(&config.resolver))
            .with_search(Arc::new(search))
            .with_fallbacks(fallbacks))
    }

    pub fn with_search(mut self, search: Arc<dyn CandidateSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: FallbackChain) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_abstract_chain(mut self, chain: ExtractionChain) -> Self {
        self.abstract_chain = chain;
        self
    }

    pub fn with_pdf_chain(mut self, chain: ExtractionChain) -> Self {
        self.pdf_chain = chain;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn into_store(self) -> RecordStore {
        self.store
    }

    /// Run `collector` once. Discovery failures and store write failures end
    /// the run with an error; anything else is recorded per item.
    pub async fn run(&mut self, collector: &dyn Collector) -> Result<IngestReport> {
        let provenance = collector.provenance().to_string();
        let candidates = collector.discover(&self.fetcher).await?;

        let mut report = IngestReport {
            discovered: candidates.len(),
            ..Default::default()
        };
        tracing::info!(
            %provenance,
            discovered = report.discovered,
            stored = self.store.len(),
            "ingest started"
        );

        for (position, candidate) in candidates.iter().enumerate() {
            if !candidate.has_identity() {
                let error = HarvestError::MissingIdentity(position);
                report.failures.push(ItemFailure::new(
                    &format!("#{position}"),
                    Stage::Discover,
                    &error,
                ));
                continue;
            }

            let identity = candidate.identity_key();
            if self.store.is_complete(&identity) {
                report.skipped += 1;
                continue;
            }

            let Some(record) = self.enrich(collector, candidate, &mut report).await else {
                continue;
            };

            let complete = record.is_complete();
            self.store.upsert(record)?;
            if complete {
                report.saved_complete += 1;
            } else {
                report.saved_partial += 1;
            }
            tracing::debug!(%identity, complete, "saved");
        }

        tracing::info!(
            %provenance,
            skipped = report.skipped,
            complete = report.saved_complete,
            partial = report.saved_partial,
            failed = report.failures.len(),
            "ingest finished"
        );
        Ok(report)
    }

    /// Build the best record available for `candidate`. `None` means the item
    /// is skipped this run.
    async fn enrich(
        &self,
        collector: &dyn Collector,
        candidate: &RawCandidate,
        report: &mut IngestReport,
    ) -> Option<Record> {
        let identity = candidate.identity_key();
        let seed = candidate.to_record(Some(collector.provenance()));
        let mut record = match self.store.get(&identity) {
            Some(existing) => {
                let mut record = existing.clone();
                record.merge(PartialRecord::from(seed));
                record
            }
            None => seed,
        };

        let mut doi = candidate.doi.clone();

        if let Some(request) = collector.detail_request(candidate) {
            let page = match self.fetcher.fetch(&request).await {
                Ok(page) => page,
                Err(e) => {
                    report
                        .failures
                        .push(ItemFailure::new(&identity, Stage::DetailPage, &e));
                    return None;
                }
            };
            record.merge(collector.extract(candidate, &page));
            self.apply_chains(&mut record, &page);
            if doi.is_none() {
                doi = extract_doi(&page.url);
            }
        }

        if !record.is_complete()
            && let Some(search) = &self.search
        {
            match self
                .resolver
                .resolve(search.as_ref(), &record.title, &record.authors)
                .await
            {
                Ok(MatchResult::Matched(m)) => {
                    let changed = record.merge(m.candidate.to_partial());
                    tracing::debug!(%identity, source = search.name(), ?changed, "merged match");
                    report.resolved += 1;
                    if doi.is_none() {
                        doi = m.candidate.doi.clone();
                    }
                }
                Ok(MatchResult::NoMatch) => {}
                Err(e) => report
                    .failures
                    .push(ItemFailure::new(&identity, Stage::Resolve, &e)),
            }
        }

        if !record.has_abstract()
            && !self.fallbacks.is_empty()
            && let Some(doi) = doi.or_else(|| record.primary_link.as_deref().and_then(extract_doi))
            && let Some(found) = self.fallbacks.lookup(&doi).await
        {
            tracing::debug!(%identity, source = %found.strategy, "abstract from fallback");
            record.merge(PartialRecord {
                abstract_text: Some(found.value),
                ..Default::default()
            });
        }

        Some(record)
    }

    fn apply_chains(&self, record: &mut Record, page: &FetchedPage) {
        if record.has_abstract() && record.pdf_link.is_some() {
            return;
        }
        let doc = Document::from_page(page);
        let mut found = PartialRecord::default();
        if !record.has_abstract() {
            found.abstract_text = self.abstract_chain.extract(&doc).map(|e| e.value);
        }
        if record.pdf_link.is_none() {
            found.pdf_link = self.pdf_chain.extract(&doc).map(|e| e.value);
        }
        if record.primary_link.is_none() {
            found.primary_link = Some(page.url.clone());
        }
        record.merge(found);
    }
}
