use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::SourcesConfig;
use crate::error::{HarvestError, Result};
use crate::extraction::AbstractLookup;
use crate::extraction::strategies::{html_to_text, strip_abstract_label};
use crate::http::{FetchRequest, ResilientFetcher};

const BASE_URL: &str = "https://api.crossref.org";

static JATS_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?jats:[^>]*>").expect("valid regex"));

/// Abstracts from Crossref work metadata. Crossref serves them as JATS XML
/// fragments; the tags are stripped.
pub struct CrossrefLookup {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefLookup {
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
            sources.crossref_base_url.as_deref().unwrap_or(BASE_URL),
            sources.polite_email.clone(),
        )
    }
}

#[async_trait]
impl AbstractLookup for CrossrefLookup {
    fn name(&self) -> &'static str {
        "crossref"
    }

    async fn lookup_abstract(&self, doi: &str) -> Result<Option<String>> {
        let mut request = FetchRequest::api(format!("{}/works/{}", self.base_url, doi.trim()));
        if let Some(mailto) = &self.mailto {
            request = request.query("mailto", mailto.clone());
        }

        let body: Value = match self.fetcher.fetch_json(&request).await {
            Ok(body) => body,
            Err(HarvestError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if body.get("status").and_then(Value::as_str) != Some("ok") {
            return Err(HarvestError::ApiError(
                "crossref".to_string(),
                format!("unexpected status for {doi}"),
            ));
        }

        Ok(body
            .pointer("/message/abstract")
            .and_then(Value::as_str)
            .map(strip_jats)
            .filter(|text| !text.is_empty()))
    }
}

pub fn strip_jats(raw: &str) -> String {
    let without_tags = JATS_TAG.replace_all(raw, " ");
    strip_abstract_label(&html_to_text(&without_tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_fetcher;
    use mockito::{Matcher, Server};

    #[test]
    fn test_strip_jats() {
        let raw = "<jats:title>Abstract</jats:title><jats:p>Deeper neural networks\n are <jats:italic>harder</jats:italic> to train.</jats:p>";
        assert_eq!(strip_jats(raw), "Deeper neural networks are harder to train.");
    }

    #[tokio::test]
    async fn test_lookup_abstract() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/works/10.1038/nature14539")
            .match_query(Matcher::UrlEncoded("mailto".into(), "me@example.org".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status": "ok", "message": {
                    "DOI": "10.1038/nature14539",
                    "abstract": "<jats:p>Deep learning allows computational models.</jats:p>"
                }}"#,
            )
            .create_async()
            .await;

        let lookup = CrossrefLookup::with_base_url(
            test_fetcher(),
            server.url(),
            Some("me@example.org".into()),
        );
        let text = lookup.lookup_abstract("10.1038/nature14539").await.unwrap();

        m.assert_async().await;
        assert_eq!(text.as_deref(), Some("Deep learning allows computational models."));
    }

    #[tokio::test]
    async fn test_missing_work_and_missing_abstract() {
        let mut server = Server::new_async().await;
        let _gone = server
            .mock("GET", "/works/10.1000/missing")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;
        let _bare = server
            .mock("GET", "/works/10.1000/bare")
            .with_status(200)
            .with_body(r#"{"status": "ok", "message": {"DOI": "10.1000/bare"}}"#)
            .create_async()
            .await;

        let lookup = CrossrefLookup::with_base_url(test_fetcher(), server.url(), None);
        assert!(lookup.lookup_abstract("10.1000/missing").await.unwrap().is_none());
        assert!(lookup.lookup_abstract("10.1000/bare").await.unwrap().is_none());
    }
}
