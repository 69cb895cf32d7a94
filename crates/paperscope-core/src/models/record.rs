use serde::{Deserialize, Serialize};

use crate::models::authors::{split_author_string, unique_authors};

/// One bibliographic record as persisted in a dataset file.
///
/// Optional fields serialize as `null` rather than being skipped, so every entry
/// of the dataset carries the same set of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identity: String,
    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub primary_link: Option<String>,

    #[serde(default)]
    pub pdf_link: Option<String>,

    #[serde(default)]
    pub supplemental_link: Option<String>,

    #[serde(default)]
    pub provenance: Option<String>,
}

impl Record {
    pub fn new(identity: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_authors(authors);
        self
    }

    /// Replace the author list, collapsing duplicates in first-seen order.
    pub fn set_authors<I, S>(&mut self, authors: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authors = unique_authors(authors);
    }

    /// Replace the author list from a joined author string.
    pub fn set_author_string(&mut self, raw: &str) {
        self.authors = unique_authors(split_author_string(raw));
    }

    /// Authors joined the way listing pages print them.
    pub fn author_string(&self) -> String {
        self.authors.join(", ")
    }

    pub fn has_abstract(&self) -> bool {
        is_present(&self.abstract_text)
    }

    pub fn has_link(&self) -> bool {
        is_present(&self.primary_link) || is_present(&self.pdf_link)
    }

    /// A record is complete once it has an abstract and at least one of the
    /// primary or PDF links. Incomplete records are re-processed on later runs.
    pub fn is_complete(&self) -> bool {
        self.has_abstract() && self.has_link()
    }

    /// Fill fields that are still missing from `partial`. Present values are
    /// never overwritten; authors are unioned keeping first-seen order.
    ///
    /// Returns the names of the fields that changed.
    pub fn merge(&mut self, partial: PartialRecord) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if self.title.trim().is_empty()
            && let Some(title) = partial.title.filter(|t| !t.trim().is_empty())
        {
            self.title = title.trim().to_string();
            changed.push("title");
        }

        if !partial.authors.is_empty() {
            let before = self.authors.len();
            let merged = unique_authors(self.authors.iter().chain(partial.authors.iter()));
            if merged.len() != before {
                self.authors = merged;
                changed.push("authors");
            }
        }

        fill(&mut self.abstract_text, partial.abstract_text, "abstract_text", &mut changed);
        fill(&mut self.primary_link, partial.primary_link, "primary_link", &mut changed);
        fill(&mut self.pdf_link, partial.pdf_link, "pdf_link", &mut changed);
        fill(
            &mut self.supplemental_link,
            partial.supplemental_link,
            "supplemental_link",
            &mut changed,
        );
        fill(&mut self.provenance, partial.provenance, "provenance", &mut changed);

        changed
    }
}

/// Fields produced by one enrichment stage (a detail page, a resolved match, an
/// external lookup). Everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub primary_link: Option<String>,
    pub pdf_link: Option<String>,
    pub supplemental_link: Option<String>,
    pub provenance: Option<String>,
}

impl PartialRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_empty()
            && self.abstract_text.is_none()
            && self.primary_link.is_none()
            && self.pdf_link.is_none()
            && self.supplemental_link.is_none()
            && self.provenance.is_none()
    }
}

impl From<Record> for PartialRecord {
    fn from(record: Record) -> Self {
        Self {
            title: Some(record.title),
            authors: record.authors,
            abstract_text: record.abstract_text,
            primary_link: record.primary_link,
            pdf_link: record.pdf_link,
            supplemental_link: record.supplemental_link,
            provenance: record.provenance,
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn fill(
    slot: &mut Option<String>,
    incoming: Option<String>,
    field: &'static str,
    changed: &mut Vec<&'static str>,
) {
    if is_present(slot) {
        return;
    }
    if let Some(value) = incoming.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        *slot = Some(value);
        changed.push(field);
    }
}
