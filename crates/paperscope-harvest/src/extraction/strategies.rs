use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::{Document, ExtractionStrategy};

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").expect("valid selector"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));
static BOLD: Lazy<Selector> = Lazy::new(|| Selector::parse("b, strong").expect("valid selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

static ABSTRACT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^abstract\b\s*[:.\-]?\s*").expect("valid regex"));

// ─── JSON-LD ──────────────────────────────────────────────────────────────────

/// `description` (or `abstract`) from embedded JSON-LD, searching
/// `mainEntity`, `@graph` and top-level arrays. Markup inside the value is
/// reduced to text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdStrategy;

impl ExtractionStrategy for JsonLdStrategy {
    fn name(&self) -> &str {
        "json_ld"
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        doc.html
            .select(&JSON_LD)
            .filter_map(|script| {
                let raw = script.text().collect::<String>();
                serde_json::from_str::<Value>(raw.trim()).ok()
            })
            .find_map(|value| description_from(&value))
            .map(|text| html_to_text(&text))
            .filter(|text| !text.is_empty())
    }
}

fn description_from(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(description_from),
        Value::Object(map) => {
            for key in ["description", "abstract"] {
                if let Some(Value::String(s)) = map.get(key)
                    && !s.trim().is_empty()
                {
                    return Some(s.clone());
                }
            }
            ["mainEntity", "@graph"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(description_from)
        }
        _ => None,
    }
}

// ─── Meta tags ────────────────────────────────────────────────────────────────

/// First `<meta name|property=KEY content=…>` for the configured keys, tried in
/// key order. Keys compare case-insensitively.
#[derive(Debug, Clone)]
pub struct MetaTagStrategy {
    name: String,
    keys: Vec<String>,
    resolve_urls: bool,
}

impl MetaTagStrategy {
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            resolve_urls: false,
        }
    }

    pub fn abstract_tags() -> Self {
        Self::new(
            "meta",
            ["citation_abstract", "dc.description", "description", "og:description"],
        )
    }

    pub fn pdf_url() -> Self {
        Self::new("citation_pdf_url", ["citation_pdf_url"]).resolving_urls()
    }

    /// Treat values as links and resolve them against the page URL.
    pub fn resolving_urls(mut self) -> Self {
        self.resolve_urls = true;
        self
    }
}

impl ExtractionStrategy for MetaTagStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        for key in &self.keys {
            let found = doc.html.select(&META).find_map(|meta| {
                let el = meta.value();
                let matches = [el.attr("name"), el.attr("property")]
                    .into_iter()
                    .flatten()
                    .any(|attr| attr.trim().eq_ignore_ascii_case(key));
                if !matches {
                    return None;
                }
                let content = normalize_whitespace(el.attr("content")?);
                if content.is_empty() {
                    return None;
                }
                if self.resolve_urls {
                    resolve_url(&doc.url, &content)
                } else {
                    Some(html_to_text(&content))
                }
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

// ─── DOM sweep ────────────────────────────────────────────────────────────────

/// Text of the first element matched by a list of CSS selectors, tried in list
/// order. A leading "Abstract" label is dropped.
#[derive(Debug, Clone)]
pub struct SelectorSweepStrategy {
    name: String,
    selectors: Vec<String>,
}

impl SelectorSweepStrategy {
    pub fn new<I, S>(name: impl Into<String>, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn abstract_blocks() -> Self {
        Self::new(
            "selector_sweep",
            [
                "#Abs1-content",
                ".Abstracts",
                ".abstr",
                "div[id*='abstract']",
                "section.abstract",
                "blockquote.abstract",
                "div.abstract",
            ],
        )
    }
}

impl ExtractionStrategy for SelectorSweepStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        for raw in &self.selectors {
            let selector = match Selector::parse(raw) {
                Ok(selector) => selector,
                Err(e) => {
                    tracing::debug!(selector = %raw, error = %e, "skipping invalid selector");
                    continue;
                }
            };
            let found = doc
                .html
                .select(&selector)
                .map(|el| strip_abstract_label(&element_text(&el)))
                .find(|text| !text.is_empty());
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

// ─── Labeled paragraph ────────────────────────────────────────────────────────

/// `<p><b>Abstract:</b> text…</p>`: the paragraph whose bold lead-in carries
/// the label, minus the label itself.
#[derive(Debug, Clone)]
pub struct LabeledParagraphStrategy {
    label: String,
}

impl Default for LabeledParagraphStrategy {
    fn default() -> Self {
        Self::new("Abstract")
    }
}

impl LabeledParagraphStrategy {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into().to_lowercase(),
        }
    }
}

impl ExtractionStrategy for LabeledParagraphStrategy {
    fn name(&self) -> &str {
        "labeled_paragraph"
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        for p in doc.html.select(&PARAGRAPH) {
            let Some(bold) = p.select(&BOLD).next() else {
                continue;
            };
            let label_text = element_text(&bold);
            if !label_text.to_lowercase().contains(&self.label) {
                continue;
            }
            let full = element_text(&p);
            let rest = full
                .strip_prefix(label_text.as_str())
                .unwrap_or(&full)
                .trim_start()
                .trim_start_matches(':')
                .trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
        None
    }
}

// ─── Anchors ──────────────────────────────────────────────────────────────────

/// What a link predicate gets to look at.
#[derive(Debug, Clone)]
pub struct LinkInfo<'a> {
    pub href: &'a str,
    pub text: String,
    pub title: Option<&'a str>,
    pub mime: Option<&'a str>,
}

type LinkPredicate = Box<dyn Fn(&LinkInfo<'_>) -> bool + Send + Sync>;

/// First anchor accepted by a predicate, resolved against the page URL.
pub struct LinkStrategy {
    name: String,
    scope: Option<String>,
    predicate: LinkPredicate,
}

impl LinkStrategy {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&LinkInfo<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: None,
            predicate: Box::new(predicate),
        }
    }

    /// Anchors pointing at a PDF: `.pdf` paths, `title="pdf"`, or a PDF
    /// content type.
    pub fn pdf() -> Self {
        Self::new("pdf_anchor", |link| {
            let path = link.href.split(['?', '#']).next().unwrap_or_default();
            path.to_ascii_lowercase().ends_with(".pdf")
                || link.title.is_some_and(|t| t.trim().eq_ignore_ascii_case("pdf"))
                || link
                    .mime
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case("application/pdf"))
        })
    }

    /// Only consider anchors matched by this CSS selector.
    pub fn within(mut self, selector: impl Into<String>) -> Self {
        self.scope = Some(selector.into());
        self
    }

    fn accept(&self, anchor: ElementRef<'_>, base: &str) -> Option<String> {
        let el = anchor.value();
        let link = LinkInfo {
            href: el.attr("href")?,
            text: element_text(&anchor),
            title: el.attr("title"),
            mime: el.attr("type"),
        };
        if (self.predicate)(&link) {
            resolve_url(base, link.href)
        } else {
            None
        }
    }
}

impl ExtractionStrategy for LinkStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        match &self.scope {
            Some(raw) => {
                let scope = Selector::parse(raw).ok()?;
                doc.html
                    .select(&scope)
                    .find_map(|el| self.accept(el, &doc.url))
            }
            None => doc
                .html
                .select(&ANCHOR)
                .find_map(|el| self.accept(el, &doc.url)),
        }
    }
}

// ─── Closures ─────────────────────────────────────────────────────────────────

type ExtractFn = Box<dyn Fn(&Document) -> Option<String> + Send + Sync>;

/// Venue-specific extraction written as a closure.
pub struct FnStrategy {
    name: String,
    f: ExtractFn,
}

impl FnStrategy {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Document) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl ExtractionStrategy for FnStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, doc: &Document) -> Option<String> {
        (self.f)(doc)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of a string that may contain markup.
pub(crate) fn html_to_text(input: &str) -> String {
    if !input.contains('<') {
        return normalize_whitespace(input);
    }
    let fragment = Html::parse_fragment(input);
    normalize_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn strip_abstract_label(text: &str) -> String {
    ABSTRACT_LABEL.replace(text, "").trim().to_string()
}

/// Absolute URL for `href` relative to `base`. Script and fragment-only links
/// yield `None`.
pub(crate) fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(|u| u.to_string()),
        Err(_) => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
