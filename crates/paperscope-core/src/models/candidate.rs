use serde::{Deserialize, Serialize};

use crate::models::authors::split_author_string;
use crate::models::record::Record;

/// An entry discovered on a listing page or API, before any enrichment.
/// Never persisted directly; it seeds a [`Record`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    /// Author string exactly as the listing printed it.
    pub authors: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplemental_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

impl RawCandidate {
    pub fn new(title: impl Into<String>, authors: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: authors.into(),
            ..Default::default()
        }
    }

    pub fn with_native_id(mut self, id: impl Into<String>) -> Self {
        self.native_id = Some(id.into());
        self
    }

    pub fn with_detail_url(mut self, url: impl Into<String>) -> Self {
        self.detail_url = Some(url.into());
        self
    }

    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    /// Store key for this candidate: the source-native id when the venue has
    /// one, else the canonical detail URL, else the title.
    pub fn identity_key(&self) -> String {
        [self.native_id.as_deref(), self.detail_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.title.trim().to_string())
    }

    /// `false` when the candidate has no id, no detail URL and a blank title,
    /// i.e. nothing that could key it in a store.
    pub fn has_identity(&self) -> bool {
        !self.identity_key().is_empty()
    }

    pub fn author_names(&self) -> Vec<String> {
        split_author_string(&self.authors)
    }

    /// Seed record carrying everything the listing already provided.
    pub fn to_record(&self, provenance: Option<&str>) -> Record {
        let mut record = Record::new(self.identity_key(), self.title.trim());
        record.set_authors(self.author_names());
        record.primary_link = self.detail_url.clone();
        record.pdf_link = self.pdf_url.clone();
        record.supplemental_link = self.supplemental_url.clone();
        record.provenance = provenance.map(ToOwned::to_owned);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_precedence() {
        let c = RawCandidate::new("Some Title", "A");
        assert_eq!(c.identity_key(), "Some Title");

        let c = c.with_detail_url("https://venue.org/p/1");
        assert_eq!(c.identity_key(), "https://venue.org/p/1");

        let c = c.with_native_id("1234");
        assert_eq!(c.identity_key(), "1234");
    }

    #[test]
    fn test_blank_native_id_falls_through() {
        let c = RawCandidate::new("Title", "A").with_native_id("  ");
        assert_eq!(c.identity_key(), "Title");
    }

    #[test]
    fn test_has_identity() {
        assert!(RawCandidate::new("Title", "").has_identity());
        assert!(RawCandidate::new("  ", "").with_native_id("P-7").has_identity());

        let blank = RawCandidate::new(" \t", "A")
            .with_native_id(" ")
            .with_detail_url("");
        assert!(!blank.has_identity());
        assert!(!RawCandidate::new("", "").has_identity());
    }

    #[test]
    fn test_to_record() {
        let c = RawCandidate::new("  Deep Residual Learning ", "He, Zhang")
            .with_native_id("P-1")
            .with_pdf_url("https://venue.org/p1.pdf");
        let record = c.to_record(Some("cvpr"));
        assert_eq!(record.identity, "P-1");
        assert_eq!(record.title, "Deep Residual Learning");
        assert_eq!(record.authors, vec!["He", "Zhang"]);
        assert_eq!(record.pdf_link.as_deref(), Some("https://venue.org/p1.pdf"));
        assert_eq!(record.provenance.as_deref(), Some("cvpr"));
        assert!(!record.is_complete());
    }
}
