use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use paperscope_core::RawCandidate;
use serde_json::{Map, Value};

use super::{clean_optional, clean_text};
use crate::collector::Collector;
use crate::config::SourcesConfig;
use crate::error::{HarvestError, Result};
use crate::extraction::AbstractLookup;
use crate::http::{FetchRequest, ResilientFetcher};

const BASE_URL: &str = "https://api.openalex.org";
const ID_PREFIX: &str = "https://openalex.org/";
const DOI_PREFIX: &str = "https://doi.org/";
const PER_PAGE: usize = 200;
const WORK_FIELDS: &str = "id,title,type,doi,publication_date,primary_location,authorships";

/// Lists a journal's works from the OpenAlex `/works` endpoint, filtered by
/// source id and publication date range and walked with cursor pagination.
/// Only works typed `article` become candidates.
///
/// Journal landing pages are not fetched unless enabled with
/// [`OpenAlexCollector::with_landing_pages`]; abstracts normally come from the
/// DOI fallbacks, [`OpenAlexLookup`] among them.
pub struct OpenAlexCollector {
    base_url: String,
    provenance: String,
    source_id: String,
    from_date: NaiveDate,
    to_date: NaiveDate,
    mailto: Option<String>,
    per_page: usize,
    max_pages: Option<usize>,
    landing_pages: bool,
}

impl OpenAlexCollector {
    pub fn new(
        provenance: impl Into<String>,
        source_id: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            provenance: provenance.into(),
            source_id: strip_id_prefix(source_id),
            from_date,
            to_date,
            mailto: None,
            per_page: PER_PAGE,
            max_pages: None,
            landing_pages: false,
        }
    }

    /// Works published in calendar year `year`.
    pub fn for_year(provenance: impl Into<String>, source_id: &str, year: i32) -> Result<Self> {
        let (Some(from), Some(to)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Err(HarvestError::Config(format!("year {year} is out of range")));
        };
        Ok(Self::new(provenance, source_id, from, to))
    }

    /// Collector for a journal named in `sources.journals`, tagged with the
    /// journal name.
    pub fn from_config(sources: &SourcesConfig, journal: &str, year: i32) -> Result<Self> {
        let source_id = sources.journals.get(journal).ok_or_else(|| {
            HarvestError::Config(format!("no OpenAlex source id configured for journal {journal}"))
        })?;
        let collector =
            Self::for_year(journal, source_id, year)?.with_mailto(sources.polite_email.clone());
        Ok(match sources.openalex_base_url.as_deref() {
            Some(url) => collector.with_base_url(url),
            None => collector,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, PER_PAGE);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_landing_pages(mut self, enabled: bool) -> Self {
        self.landing_pages = enabled;
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    fn filter(&self) -> String {
        format!(
            "primary_location.source.id:{},from_publication_date:{},to_publication_date:{}",
            self.source_id,
            self.from_date.format("%Y-%m-%d"),
            self.to_date.format("%Y-%m-%d"),
        )
    }

    fn page_request(&self, cursor: &str) -> FetchRequest {
        let request = FetchRequest::api(format!("{}/works", self.base_url))
            .query("filter", self.filter())
            .query("per_page", self.per_page.to_string())
            .query("cursor", cursor)
            .query("select", WORK_FIELDS);
        match &self.mailto {
            Some(mailto) => request.query("mailto", mailto.clone()),
            None => request,
        }
    }
}

#[async_trait]
impl Collector for OpenAlexCollector {
    fn provenance(&self) -> &str {
        &self.provenance
    }

    /// A failure on the first page fails discovery. A failure on a later page
    /// ends pagination and keeps what was collected.
    async fn discover(&self, fetcher: &ResilientFetcher) -> Result<Vec<RawCandidate>> {
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = "*".to_string();
        let mut pages = 0;
        let mut skipped = 0;

        loop {
            let body: Value = match fetcher.fetch_json(&self.page_request(&cursor)).await {
                Ok(body) => body,
                Err(e) if pages > 0 && !e.is_fatal() => {
                    tracing::warn!(
                        source_id = %self.source_id,
                        pages,
                        error = %e,
                        "pagination stopped early"
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            pages += 1;

            let results = body.get("results").and_then(Value::as_array).ok_or_else(|| {
                HarvestError::ApiError(
                    "openalex".to_string(),
                    "works response without results array".to_string(),
                )
            })?;

            for work in results {
                match candidate_from_work(work) {
                    Some(candidate) => {
                        if seen.insert(candidate.identity_key()) {
                            candidates.push(candidate);
                        }
                    }
                    None => skipped += 1,
                }
            }

            let next = body
                .pointer("/meta/next_cursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty());
            match next {
                Some(next) if !results.is_empty() && next != cursor => cursor = next.to_string(),
                _ => break,
            }
            if self.max_pages.is_some_and(|max| pages >= max) {
                break;
            }
        }

        tracing::info!(
            source_id = %self.source_id,
            pages,
            works = candidates.len(),
            skipped,
            "openalex discovery finished"
        );
        Ok(candidates)
    }

    fn detail_request(&self, candidate: &RawCandidate) -> Option<FetchRequest> {
        if !self.landing_pages {
            return None;
        }
        candidate
            .detail_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(FetchRequest::page)
    }
}

/// Candidate for one `/works` result, `None` for works without an id or
/// title and for anything that is not an article.
fn candidate_from_work(work: &Value) -> Option<RawCandidate> {
    let id = clean_optional(work.get("id").and_then(Value::as_str))?;
    if work.get("type").and_then(Value::as_str) != Some("article") {
        tracing::debug!(%id, kind = ?work.get("type"), "skipping non-article work");
        return None;
    }
    let title = clean_optional(work.get("title").and_then(Value::as_str))?;

    let authors: Vec<String> = work
        .get("authorships")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| {
                    clean_optional(a.pointer("/author/display_name").and_then(Value::as_str))
                })
                .collect()
        })
        .unwrap_or_default();

    let doi_url = clean_optional(work.get("doi").and_then(Value::as_str));
    let landing = clean_optional(
        work.pointer("/primary_location/landing_page_url")
            .and_then(Value::as_str),
    );
    let pdf = clean_optional(work.pointer("/primary_location/pdf_url").and_then(Value::as_str));

    let mut candidate = RawCandidate::new(title, authors.join(", ")).with_native_id(id);
    if let Some(url) = doi_url.clone().or(landing) {
        candidate = candidate.with_detail_url(url);
    }
    if let Some(doi) = doi_url.as_deref().map(strip_doi_prefix) {
        candidate = candidate.with_doi(doi);
    }
    if let Some(pdf) = pdf {
        candidate = candidate.with_pdf_url(pdf);
    }
    Some(candidate)
}

/// Abstracts rebuilt from OpenAlex's `abstract_inverted_index`.
pub struct OpenAlexLookup {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexLookup {
    pub fn new(fetcher: Arc<ResilientFetcher>, mailto: Option<String>) -> Self {
        Self::with_base_url(fetcher, BASE_URL, mailto)
    }

    pub fn with_base_url(
        fetcher: Arc<ResilientFetcher>,
        base_url: impl Into<String>,
        mailto: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn from_config(fetcher: Arc<ResilientFetcher>, sources: &SourcesConfig) -> Self {
        Self::with_base_url(
            fetcher,
            sources.openalex_base_url.as_deref().unwrap_or(BASE_URL),
            sources.polite_email.clone(),
        )
    }
}

#[async_trait]
impl AbstractLookup for OpenAlexLookup {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn lookup_abstract(&self, doi: &str) -> Result<Option<String>> {
        let mut request = FetchRequest::api(format!(
            "{}/works/doi:{}",
            self.base_url,
            strip_doi_prefix(doi.trim())
        ))
        .query("select", "id,abstract_inverted_index");
        if let Some(mailto) = &self.mailto {
            request = request.query("mailto", mailto.clone());
        }

        let body: Value = match self.fetcher.fetch_json(&request).await {
            Ok(body) => body,
            Err(HarvestError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(body
            .get("abstract_inverted_index")
            .and_then(Value::as_object)
            .and_then(reconstruct_abstract))
    }
}

/// Rebuild plain text from an inverted index (`word -> [positions]`) by
/// ordering every occurrence by position. Non-integer positions are ignored;
/// `None` when no word survives.
pub fn reconstruct_abstract(index: &Map<String, Value>) -> Option<String> {
    let mut positioned: Vec<(u64, &str)> = index
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable();

    let text = clean_text(
        &positioned
            .iter()
            .map(|(_, word)| *word)
            .collect::<Vec<_>>()
            .join(" "),
    );
    (!text.is_empty()).then_some(text)
}

fn strip_id_prefix(id: &str) -> String {
    let id = id.trim();
    id.strip_prefix(ID_PREFIX).unwrap_or(id).to_string()
}

fn strip_doi_prefix(doi: &str) -> String {
    doi.strip_prefix(DOI_PREFIX).unwrap_or(doi).to_string()
}
