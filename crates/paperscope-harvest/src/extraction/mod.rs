//! Ordered, short-circuiting field extraction from HTML pages.
//!
//! A page may expose the same field through several inconsistent encodings.
//! An [`ExtractionChain`] tries its strategies in priority order and returns
//! the first non-empty value together with the name of the strategy that
//! produced it. A strategy that finds nothing, or trips over malformed markup,
//! simply yields `None` and the chain moves on.

pub mod fallback;
pub mod strategies;

use scraper::Html;

use crate::http::FetchedPage;

pub use fallback::{AbstractLookup, FallbackChain, extract_doi};
pub use strategies::{
    FnStrategy, JsonLdStrategy, LabeledParagraphStrategy, LinkStrategy, MetaTagStrategy,
    SelectorSweepStrategy,
};

/// A parsed page plus the URL relative links resolve against.
pub struct Document {
    pub url: String,
    pub html: Html,
}

impl Document {
    pub fn parse(url: impl Into<String>, body: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(body),
        }
    }

    pub fn from_page(page: &FetchedPage) -> Self {
        Self::parse(page.url.clone(), &page.body)
    }
}

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, doc: &Document) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub value: String,
    pub strategy: String,
}

#[derive(Default)]
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.push(strategy);
    }

    /// Structured metadata first, then meta tags, then DOM sweeps.
    pub fn abstract_text() -> Self {
        Self::new()
            .with(JsonLdStrategy)
            .with(MetaTagStrategy::abstract_tags())
            .with(SelectorSweepStrategy::abstract_blocks())
            .with(LabeledParagraphStrategy::default())
    }

    pub fn pdf_link() -> Self {
        Self::new()
            .with(MetaTagStrategy::pdf_url())
            .with(LinkStrategy::pdf())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn extract(&self, doc: &Document) -> Option<Extracted> {
        for strategy in &self.strategies {
            let Some(value) = strategy.extract(doc) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            tracing::debug!(url = %doc.url, strategy = strategy.name(), "extracted");
            return Some(Extracted {
                value: value.to_string(),
                strategy: strategy.name().to_string(),
            });
        }
        None
    }

    pub fn extract_page(&self, page: &FetchedPage) -> Option<Extracted> {
        self.extract(&Document::from_page(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: &str = r#"
        <html><head>
          <script type="application/ld+json">
            {"@type": "ScholarlyArticle", "description": "Structured abstract from JSON-LD."}
          </script>
        </head><body>
          <div id="abstract-section">Abstract: Visible abstract from the page body.</div>
        </body></html>
    "#;

    #[test]
    fn test_structured_metadata_beats_dom_sweep() {
        let doc = Document::parse("https://venue.org/p/1", BOTH);

        let sweep_only = ExtractionChain::new().with(SelectorSweepStrategy::abstract_blocks());
        assert_eq!(
            sweep_only.extract(&doc).unwrap().value,
            "Visible abstract from the page body."
        );

        let found = ExtractionChain::abstract_text().extract(&doc).unwrap();
        assert_eq!(found.value, "Structured abstract from JSON-LD.");
        assert_eq!(found.strategy, "json_ld");
    }

    #[test]
    fn test_chain_falls_through_empty_strategies() {
        let doc = Document::parse(
            "https://venue.org/p/2",
            r#"<html><head><meta name="description" content="   "></head>
               <body><p><b>Abstract:</b> We study robots.</p></body></html>"#,
        );
        let found = ExtractionChain::abstract_text().extract(&doc).unwrap();
        assert_eq!(found.value, "We study robots.");
        assert_eq!(found.strategy, "labeled_paragraph");
    }

    #[test]
    fn test_nothing_found() {
        let doc = Document::parse("https://venue.org", "<html><body><p>Hello</p></body></html>");
        assert!(ExtractionChain::abstract_text().extract(&doc).is_none());
        assert!(ExtractionChain::new().extract(&doc).is_none());
    }

    #[test]
    fn test_custom_strategy_order() {
        let doc = Document::parse("https://venue.org", "<html><body></body></html>");
        let chain = ExtractionChain::new()
            .with(FnStrategy::new("none", |_| None))
            .with(FnStrategy::new("venue", |d| Some(format!("from {}", d.url))));
        assert_eq!(chain.names(), vec!["none", "venue"]);
        let found = chain.extract(&doc).unwrap();
        assert_eq!(found.value, "from https://venue.org");
        assert_eq!(found.strategy, "venue");
    }

    #[test]
    fn test_pdf_link_preset() {
        let doc = Document::parse(
            "https://openaccess.thecvf.com/content/paper.html",
            r#"<html><body><a href="../papers/He_Deep.pdf">pdf</a></body></html>"#,
        );
        let found = ExtractionChain::pdf_link().extract(&doc).unwrap();
        assert_eq!(found.value, "https://openaccess.thecvf.com/papers/He_Deep.pdf");
        assert_eq!(found.strategy, "pdf_anchor");
    }
}
