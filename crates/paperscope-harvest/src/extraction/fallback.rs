use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::Extracted;
use crate::config::ExtractionConfig;
use crate::error::Result;

static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(10\.\d{4,9}/[-._;()/:A-Z0-9]+)").expect("valid regex"));

/// Abstract lookup against an external API, keyed by DOI.
#[async_trait]
pub trait AbstractLookup: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup_abstract(&self, doi: &str) -> Result<Option<String>>;
}

/// External lookups tried in order once every page strategy came up empty.
///
/// Results shorter than the minimum length are discarded as boilerplate. Lookup
/// errors are logged and the next lookup is tried.
pub struct FallbackChain {
    lookups: Vec<Arc<dyn AbstractLookup>>,
    min_len: usize,
}

impl FallbackChain {
    pub fn new(min_len: usize) -> Self {
        Self {
            lookups: Vec::new(),
            min_len,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.min_fallback_abstract_len)
    }

    pub fn with(mut self, lookup: Arc<dyn AbstractLookup>) -> Self {
        self.lookups.push(lookup);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    pub async fn lookup(&self, doi: &str) -> Option<Extracted> {
        for lookup in &self.lookups {
            match lookup.lookup_abstract(doi).await {
                Ok(Some(text)) => {
                    let text = text.trim();
                    let len = text.chars().count();
                    if len < self.min_len {
                        tracing::debug!(
                            source = lookup.name(),
                            %doi,
                            len,
                            min = self.min_len,
                            "abstract too short"
                        );
                        continue;
                    }
                    return Some(Extracted {
                        value: text.to_string(),
                        strategy: lookup.name().to_string(),
                    });
                }
                Ok(None) => {
                    tracing::debug!(source = lookup.name(), %doi, "no abstract");
                }
                Err(e) => {
                    tracing::warn!(source = lookup.name(), %doi, error = %e, "abstract lookup failed");
                }
            }
        }
        None
    }
}

/// First DOI found in a URL or free text, with trailing punctuation dropped.
pub fn extract_doi(text: &str) -> Option<String> {
    let raw = DOI_RE.captures(text)?.get(1)?.as_str();
    let doi = raw.trim_end_matches(['.', ',', ';', ')']);
    if doi.is_empty() { None } else { Some(doi.to_string()) }
}
