use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{clean_optional, clean_text};
use crate::config::SourcesConfig;
use crate::error::{HarvestError, Result};
use crate::http::{FetchRequest, ResilientFetcher};
use crate::resolver::{CandidateSearch, SourceCandidate};

const BASE_URL: &str = "http://export.arxiv.org/api/query";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@type")]
    link_type: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Title search over the arXiv Atom API.
pub struct ArxivSearch {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
}

impl ArxivSearch {
    pub fn new(fetcher: Arc<ResilientFetcher>) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<ResilientFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(fetcher: Arc<ResilientFetcher>, sources: &SourcesConfig) -> Self {
        match &sources.arxiv_base_url {
            Some(url) => Self::with_base_url(fetcher, url.clone()),
            None => Self::new(fetcher),
        }
    }
}

#[async_trait]
impl CandidateSearch for ArxivSearch {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn search(&self, normalized_title: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
        let request = FetchRequest::api(&self.base_url)
            .query("search_query", format!("ti:{normalized_title}"))
            .query("start", "0")
            .query("max_results", limit.to_string());
        let page = self.fetcher.fetch(&request).await?;
        parse_atom_response(&page.body)
    }
}

pub fn parse_atom_response(xml: &str) -> Result<Vec<SourceCandidate>> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| HarvestError::Parse(format!("invalid atom xml: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .map(parse_entry)
        .filter(|c| !c.title.is_empty())
        .collect())
}

fn parse_entry(entry: AtomEntry) -> SourceCandidate {
    let pdf_link = entry
        .links
        .iter()
        .find(|link| {
            link.title.as_deref() == Some("pdf")
                || link.link_type.as_deref() == Some("application/pdf")
        })
        .and_then(|link| link.href.as_deref())
        .map(normalize_arxiv_url);

    let abs_link = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("alternate"))
        .and_then(|link| link.href.as_deref())
        .or(Some(entry.id.as_str()))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(normalize_arxiv_url);

    SourceCandidate {
        title: clean_text(&entry.title),
        authors: entry
            .authors
            .iter()
            .map(|a| clean_text(&a.name))
            .filter(|n| !n.is_empty())
            .collect(),
        abstract_text: clean_optional(Some(&entry.summary)),
        primary_link: abs_link,
        pdf_link,
        doi: None,
    }
}

fn normalize_arxiv_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://arxiv.org/") {
        return format!("https://arxiv.org/{rest}");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_fetcher;
    use mockito::{Matcher, Server};

    const RESNET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=ti:deep residual learning</title>
  <entry>
    <id>http://arxiv.org/abs/1512.03385v1</id>
    <title>Deep Residual Learning for Image
      Recognition</title>
    <summary>
      Deeper neural networks are more difficult to train.
    </summary>
    <author><name>Kaiming He</name></author>
    <author><name>Xiangyu Zhang</name></author>
    <link href="http://arxiv.org/abs/1512.03385v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1512.03385v1" rel="related" type="application/pdf"/>
  </entry>
</feed>
"#;

    #[test]
    fn test_parse_atom() {
        let hits = parse_atom_response(RESNET_XML).unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.title, "Deep Residual Learning for Image Recognition");
        assert_eq!(hit.authors, vec!["Kaiming He", "Xiangyu Zhang"]);
        assert_eq!(
            hit.abstract_text.as_deref(),
            Some("Deeper neural networks are more difficult to train.")
        );
        assert_eq!(hit.primary_link.as_deref(), Some("https://arxiv.org/abs/1512.03385v1"));
        assert_eq!(hit.pdf_link.as_deref(), Some("https://arxiv.org/pdf/1512.03385v1"));
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_atom_response(xml).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_sends_title_query() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "search_query".into(),
                    "ti:deep residual learning".into(),
                ),
                Matcher::UrlEncoded("max_results".into(), "5".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(RESNET_XML)
            .create_async()
            .await;

        let search =
            ArxivSearch::with_base_url(test_fetcher(), format!("{}/api/query", server.url()));
        let hits = search.search("deep residual learning", 5).await.unwrap();

        m.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].authors.len(), 2);
    }
}
