//! Cross-source record linkage: match a record found on one venue against the
//! ranked results of another source's title search.
//!
//! Two hard gates decide a match. The normalized titles must reach the
//! similarity threshold, and the two sides must share at least one surname.
//! The first candidate in the source's own rank order that passes both wins.

use std::collections::BTreeSet;

use async_trait::async_trait;
use paperscope_core::PartialRecord;
use paperscope_core::models::surname_set;

use crate::config::ResolverConfig;
use crate::error::Result;

/// A search hit from an external bibliographic source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCandidate {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub primary_link: Option<String>,
    pub pdf_link: Option<String>,
    pub doi: Option<String>,
}

impl SourceCandidate {
    pub fn new<I, S>(title: impl Into<String>, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            authors: authors.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_primary_link(mut self, url: impl Into<String>) -> Self {
        self.primary_link = Some(url.into());
        self
    }

    pub fn with_pdf_link(mut self, url: impl Into<String>) -> Self {
        self.pdf_link = Some(url.into());
        self
    }

    /// Fields this hit can contribute to a record. Title and authors stay with
    /// the originating venue.
    pub fn to_partial(&self) -> PartialRecord {
        PartialRecord {
            abstract_text: self.abstract_text.clone(),
            primary_link: self.primary_link.clone(),
            pdf_link: self.pdf_link.clone(),
            ..Default::default()
        }
    }
}

/// Title search against an external source, results in the source's rank order.
#[async_trait]
pub trait CandidateSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, normalized_title: &str, limit: usize) -> Result<Vec<SourceCandidate>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub candidate: SourceCandidate,
    pub title_similarity: f64,
    pub shared_surnames: BTreeSet<String>,
    /// Zero-based position in the source's result list.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(Match),
    NoMatch,
}

impl MatchResult {
    pub fn into_match(self) -> Option<Match> {
        match self {
            Self::Matched(m) => Some(m),
            Self::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolver {
    title_threshold: f64,
    max_candidates: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl Resolver {
    pub fn new(title_threshold: f64, max_candidates: usize) -> Self {
        Self {
            title_threshold,
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.title_threshold, config.max_candidates)
    }

    pub fn title_threshold(&self) -> f64 {
        self.title_threshold
    }

    /// Search `source` by normalized title and pick a match.
    pub async fn resolve(
        &self,
        source: &dyn CandidateSearch,
        title: &str,
        authors: &[String],
    ) -> Result<MatchResult> {
        let query = normalize_title(title);
        if query.is_empty() {
            return Ok(MatchResult::NoMatch);
        }

        let candidates = source.search(&query, self.max_candidates).await?;
        let result = self.select(title, authors, &candidates);

        match &result {
            MatchResult::Matched(m) => tracing::debug!(
                source = source.name(),
                %title,
                similarity = m.title_similarity,
                rank = m.rank,
                "resolved"
            ),
            MatchResult::NoMatch => tracing::debug!(
                source = source.name(),
                %title,
                candidates = candidates.len(),
                "no match"
            ),
        }
        Ok(result)
    }

    /// Apply both gates to `candidates` in order.
    pub fn select(
        &self,
        title: &str,
        authors: &[String],
        candidates: &[SourceCandidate],
    ) -> MatchResult {
        let wanted_title = normalize_title(title);
        let wanted_surnames = surname_set(authors);
        if wanted_title.is_empty() || wanted_surnames.is_empty() {
            return MatchResult::NoMatch;
        }

        for (rank, candidate) in candidates.iter().take(self.max_candidates).enumerate() {
            let similarity = title_similarity(&wanted_title, &normalize_title(&candidate.title));
            if similarity < self.title_threshold {
                continue;
            }

            let shared: BTreeSet<String> = surname_set(&candidate.authors)
                .intersection(&wanted_surnames)
                .cloned()
                .collect();
            if shared.is_empty() {
                continue;
            }

            return MatchResult::Matched(Match {
                candidate: candidate.clone(),
                title_similarity: similarity,
                shared_surnames: shared,
                rank,
            });
        }
        MatchResult::NoMatch
    }
}

/// Lower-case, drop anything that is not alphanumeric or whitespace, collapse
/// whitespace. Punctuation inside a word disappears, so `"U-Net"` and `"UNet"`
/// normalize to the same token.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Edit-distance ratio in [0, 1] over already-normalized titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}
