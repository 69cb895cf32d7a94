use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use paperscope_core::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Upper bound for `fetch.max_backoff_secs`: one day.
pub const MAX_BACKOFF_CAP_SECS: u64 = 86_400;

/// Everything a harvesting run is parameterized by, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub resolver: ResolverConfig,
    pub extraction: ExtractionConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff_secs: u64,
    pub retry_statuses: Vec<u16>,
    pub timeout_secs: u64,
    /// Pause after every external-API call, successful or not.
    pub courtesy_delay_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub title_threshold: f64,
    pub max_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Abstracts from external lookups shorter than this are treated as boilerplate.
    pub min_fallback_abstract_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub polite_email: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
    pub arxiv_base_url: Option<String>,
    pub semantic_scholar_base_url: Option<String>,
    pub crossref_base_url: Option<String>,
    pub openalex_base_url: Option<String>,
    /// Journal name to OpenAlex source id, e.g. `"prx-quantum" = "S4210195673"`.
    pub journals: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 1.5,
            max_backoff_secs: 120,
            retry_statuses: vec![500, 502, 503, 504],
            timeout_secs: 20,
            courtesy_delay_ms: 3000,
            user_agent: "paperscope/0.1".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.8,
            max_candidates: 5,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_fallback_abstract_len: 200,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    /// User agent with the polite-pool contact appended when one is configured.
    pub fn user_agent_with_contact(&self, polite_email: Option<&str>) -> String {
        match polite_email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => format!("{} (mailto:{email})", self.user_agent),
            None => self.user_agent.clone(),
        }
    }
}

impl HarvestConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HarvestError::Config(format!("{}: {e}", parent.display())))?;
        }
        let toml_str =
            toml::to_string_pretty(self).map_err(|e| HarvestError::Config(e.to_string()))?;
        std::fs::write(path, toml_str)
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.resolver.title_threshold) {
            return Err(HarvestError::Config(format!(
                "resolver.title_threshold must be within [0, 1], got {}",
                self.resolver.title_threshold
            )));
        }
        if self.resolver.max_candidates == 0 {
            return Err(HarvestError::Config(
                "resolver.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.fetch.backoff_factor < 0.0 || !self.fetch.backoff_factor.is_finite() {
            return Err(HarvestError::Config(format!(
                "fetch.backoff_factor must be a non-negative number, got {}",
                self.fetch.backoff_factor
            )));
        }
        if self.fetch.max_backoff_secs > MAX_BACKOFF_CAP_SECS {
            return Err(HarvestError::Config(format!(
                "fetch.max_backoff_secs must be at most {MAX_BACKOFF_CAP_SECS}, got {}",
                self.fetch.max_backoff_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.backoff_factor, 1.5);
        assert_eq!(config.fetch.retry_statuses, vec![500, 502, 503, 504]);
        assert_eq!(config.resolver.title_threshold, 0.8);
        assert_eq!(config.resolver.max_candidates, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
            [fetch]
            max_retries = 5

            [sources]
            semantic_scholar_api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.backoff_factor, 1.5);
        assert_eq!(config.sources.semantic_scholar_api_key.as_deref(), Some("secret"));
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn test_roundtrip_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("harvest.toml");
        assert_eq!(HarvestConfig::load_from(&path).unwrap(), HarvestConfig::default());

        let mut config = HarvestConfig::default();
        config.store = StoreConfig::new(dir.path().join("dataset"));
        config.sources.polite_email = Some("me@example.org".to_string());
        config.save_to(&path).unwrap();
        assert_eq!(HarvestConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[resolver]\ntitle_threshold = 1.5\n").unwrap();
        assert!(matches!(
            HarvestConfig::load_from(&path),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_oversized_backoff_cap_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[fetch]\nmax_backoff_secs = 100000\n").unwrap();
        assert!(matches!(
            HarvestConfig::load_from(&path),
            Err(HarvestError::Config(_))
        ));

        let mut config = HarvestConfig::default();
        config.fetch.max_backoff_secs = MAX_BACKOFF_CAP_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_journal_table() {
        let config: HarvestConfig = toml::from_str(
            r#"
            [sources.journals]
            "prx-quantum" = "S4210195673"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.sources.journals.get("prx-quantum").map(String::as_str),
            Some("S4210195673")
        );
    }

    #[test]
    fn test_user_agent_with_contact() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.user_agent_with_contact(None), "paperscope/0.1");
        assert_eq!(
            fetch.user_agent_with_contact(Some("me@example.org")),
            "paperscope/0.1 (mailto:me@example.org)"
        );
    }
}
