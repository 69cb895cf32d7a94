use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::clean_optional;
use crate::config::SourcesConfig;
use crate::error::{HarvestError, Result};
use crate::extraction::AbstractLookup;
use crate::http::{FetchRequest, ResilientFetcher};
use crate::resolver::{CandidateSearch, SourceCandidate};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const SEARCH_FIELDS: &str = "title,authors,abstract,url,openAccessPdf,externalIds";
const LOOKUP_FIELDS: &str = "title,abstract,authors";
const API_KEY_HEADER: &str = "x-api-key";

/// Semantic Scholar Graph API: title search for the resolver and abstract
/// lookup by DOI.
pub struct SemanticScholar {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholar {
    pub fn new(fetcher: Arc<ResilientFetcher>, api_key: Option<String>) -> Self {
        Self::with_base_url(fetcher, BASE_URL, api_key)
    }

    pub fn with_base_url(
        fetcher: Arc<ResilientFetcher>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_config(fetcher: Arc<ResilientFetcher>, sources: &SourcesConfig) -> Self {
        Self::with_base_url(
            fetcher,
            sources.semantic_scholar_base_url.as_deref().unwrap_or(BASE_URL),
            sources.semantic_scholar_api_key.clone(),
        )
    }

    fn request(&self, url: String) -> FetchRequest {
        let request = FetchRequest::api(url);
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.clone()),
            None => request,
        }
    }
}

#[async_trait]
impl CandidateSearch for SemanticScholar {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    async fn search(&self, normalized_title: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let request = self
            .request(format!("{}/paper/search", self.base_url))
            .query("query", normalized_title)
            .query("limit", limit.to_string())
            .query("fields", SEARCH_FIELDS);
        let body: Value = self.fetcher.fetch_json(&request).await?;

        let data = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                HarvestError::ApiError(
                    "semantic_scholar".to_string(),
                    "search response without data array".to_string(),
                )
            })?;
        Ok(data
            .iter()
            .filter_map(candidate_from_json)
            .collect())
    }
}

#[async_trait]
impl AbstractLookup for SemanticScholar {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    async fn lookup_abstract(&self, doi: &str) -> Result<Option<String>> {
        let request = self
            .request(format!("{}/paper/DOI:{}", self.base_url, doi.trim()))
            .query("fields", LOOKUP_FIELDS);
        match self.fetcher.fetch_json::<Value>(&request).await {
            Ok(body) => Ok(clean_optional(body.get("abstract").and_then(Value::as_str))),
            Err(HarvestError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn candidate_from_json(v: &Value) -> Option<SourceCandidate> {
    let title = clean_optional(v.get("title").and_then(Value::as_str))?;
    let authors = v
        .get("authors")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| clean_optional(a.get("name").and_then(Value::as_str)))
                .collect()
        })
        .unwrap_or_default();

    Some(SourceCandidate {
        title,
        authors,
        abstract_text: clean_optional(v.get("abstract").and_then(Value::as_str)),
        primary_link: clean_optional(v.get("url").and_then(Value::as_str)),
        pdf_link: clean_optional(v.pointer("/openAccessPdf/url").and_then(Value::as_str)),
        doi: clean_optional(v.pointer("/externalIds/DOI").and_then(Value::as_str)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_fetcher;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_candidate_from_json() {
        let value = json!({
            "paperId": "2c03df8b",
            "title": "Deep Residual Learning for Image Recognition",
            "authors": [{"authorId": "39353098", "name": "Kaiming He"}, {"name": ""}],
            "abstract": null,
            "url": "https://www.semanticscholar.org/paper/2c03df8b",
            "openAccessPdf": {"url": "https://arxiv.org/pdf/1512.03385", "status": "GREEN"}
        });
        let c = candidate_from_json(&value).unwrap();
        assert_eq!(c.authors, vec!["Kaiming He"]);
        assert!(c.abstract_text.is_none());
        assert_eq!(c.pdf_link.as_deref(), Some("https://arxiv.org/pdf/1512.03385"));

        assert!(candidate_from_json(&json!({"title": "  "})).is_none());
    }

    #[tokio::test]
    async fn test_search_with_api_key() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/paper/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "deep residual learning".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
                Matcher::UrlEncoded("fields".into(), SEARCH_FIELDS.into()),
            ]))
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "total": 1,
                    "data": [{
                        "title": "Deep Residual Learning for Image Recognition",
                        "authors": [{"name": "Kaiming He"}, {"name": "Xiangyu Zhang"}],
                        "abstract": "Deeper neural networks are more difficult to train.",
                        "url": "https://www.semanticscholar.org/paper/2c03df8b",
                        "externalIds": {"DOI": "10.1109/CVPR.2016.90", "ArXiv": "1512.03385"}
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let s2 = SemanticScholar::with_base_url(test_fetcher(), server.url(), Some("secret".into()));
        let hits = s2.search("deep residual learning", 5).await.unwrap();

        m.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].authors, vec!["Kaiming He", "Xiangyu Zhang"]);
        assert_eq!(hits[0].doi.as_deref(), Some("10.1109/CVPR.2016.90"));
    }

    #[tokio::test]
    async fn test_lookup_abstract_by_doi() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/paper/DOI:10.1109/CVPR.2016.90")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"paperId": "x", "abstract": "  Residual   nets. "}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/paper/DOI:10.1000/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": "Paper not found"}"#)
            .create_async()
            .await;

        let s2 = SemanticScholar::with_base_url(test_fetcher(), server.url(), None);
        assert_eq!(
            s2.lookup_abstract("10.1109/CVPR.2016.90").await.unwrap().as_deref(),
            Some("Residual nets.")
        );
        assert!(s2.lookup_abstract("10.1000/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_rejects_malformed_payload() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/paper/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"message": "rate limited"}"#)
            .create_async()
            .await;

        let s2 = SemanticScholar::with_base_url(test_fetcher(), server.url(), None);
        assert!(matches!(
            s2.search("anything", 5).await,
            Err(HarvestError::ApiError(_, _))
        ));
    }
}
