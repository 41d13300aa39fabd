//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXCONTACTS_CONFIG` (environment variable)
//! 2. `~/.config/mboxcontacts/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxcontacts\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Domain sets are passed explicitly into the classifier and aggregator;
//! nothing here is global.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ContactError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Internal, target and personal domain sets.
    pub domains: DomainConfig,
    /// Contact aggregation tuning.
    pub aggregation: AggregationConfig,
    /// Organization naming.
    pub organizations: OrganizationConfig,
    /// Post-aggregation cleaning rules.
    pub filter: FilterConfig,
    /// LLM enrichment endpoint.
    pub enrichment: EnrichmentConfig,
    /// Export defaults.
    pub export: ExportConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Default output directory for extracted files.
    pub output_dir: PathBuf,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Domain sets used by the address classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Our own domains. Matched exactly or as a parent of a subdomain.
    pub internal: Vec<String>,
    /// Ordered suffix patterns for target categories (e.g. `.gov.au`).
    pub target_patterns: Vec<String>,
    /// Webmail domains whose users have no organization of their own.
    pub personal: Vec<String>,
}

/// Contact aggregation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Maximum number of sample subjects and content samples per contact.
    pub sample_cap: usize,
    /// Length in characters of the excerpt stored in each interaction record.
    pub snippet_chars: usize,
    /// Length in characters of each content sample.
    pub sample_chars: usize,
    /// Bodies are cut to this many characters before any analysis.
    pub max_body_chars: usize,
    /// Gmail labels that mark a message as sent.
    pub sent_labels: Vec<String>,
}

/// Organization naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    /// Domain label → organization name, consulted by the domain fallback.
    pub aliases: BTreeMap<String, String>,
}

/// Post-aggregation cleaning rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Substrings or regular expressions that mark bounce/automated addresses.
    pub automated_patterns: Vec<String>,
    /// Subjects (lowercase substrings) that only occur in internal team mail.
    pub internal_subjects: Vec<String>,
}

/// LLM enrichment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Which API dialect to speak.
    pub provider: EnrichmentProvider,
    /// Base URL (without `/chat/completions` or `/messages`). Provider default when unset.
    pub endpoint: Option<String>,
    /// Model identifier sent with each request. Provider default when unset.
    pub model: Option<String>,
    /// Environment variable holding the API key. Provider default when unset.
    pub api_key_env: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Only enrich the first N contacts.
    pub max_contacts: Option<usize>,
}

/// Supported enrichment APIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentProvider {
    /// OpenAI chat completions and compatible servers (OpenRouter, Ollama, vLLM).
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl EnrichmentProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::str::FromStr for EnrichmentProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!(
                "unknown enrichment provider '{other}' (expected openai or anthropic)"
            )),
        }
    }
}

impl EnrichmentConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(match self.provider {
            EnrichmentProvider::OpenAi => "https://api.openai.com/v1",
            EnrichmentProvider::Anthropic => "https://api.anthropic.com/v1",
        })
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.provider {
            EnrichmentProvider::OpenAi => "gpt-4o-mini",
            EnrichmentProvider::Anthropic => "claude-3-5-haiku-20241022",
        })
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(match self.provider {
            EnrichmentProvider::OpenAi => "OPENAI_API_KEY",
            EnrichmentProvider::Anthropic => "ANTHROPIC_API_KEY",
        })
    }
}

/// Export defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// CSV field separator character.
    pub csv_separator: char,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            output_dir: PathBuf::from("output"),
            log_level: "warn".to_string(),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            internal: Vec::new(),
            target_patterns: [".gov.au", ".org.au", ".edu.au", ".asn.au", ".id.au"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            personal: [
                "gmail.com",
                "googlemail.com",
                "hotmail.com",
                "outlook.com",
                "live.com",
                "yahoo.com",
                "icloud.com",
                "me.com",
                "protonmail.com",
                "bigpond.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            sample_cap: 5,
            snippet_chars: 300,
            sample_chars: 500,
            max_body_chars: 5000,
            sent_labels: vec!["Sent".to_string()],
        }
    }
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        let aliases = [
            ("treasury", "Department of Treasury"),
            ("finance", "Department of Finance"),
            ("agriculture", "Department of Agriculture"),
            ("industry", "Department of Industry"),
            ("health", "Department of Health"),
            ("education", "Department of Education"),
            ("environment", "Department of Environment"),
            ("defence", "Department of Defence"),
            ("dfat", "Department of Foreign Affairs and Trade"),
            ("austrade", "Australian Trade and Investment Commission"),
            (
                "csiro",
                "Commonwealth Scientific and Industrial Research Organisation",
            ),
            ("abs", "Australian Bureau of Statistics"),
            ("rba", "Reserve Bank of Australia"),
            ("accc", "Australian Competition and Consumer Commission"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { aliases }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            automated_patterns: [
                "bounces",
                "noreply",
                "no-reply",
                "notifications",
                "mailer-daemon",
                "postmaster",
                "do-not-reply",
                "donotreply",
                "auto-reply",
                "autoreply",
                "system@",
                "automated@",
                "alert@",
                "alerts@",
                "digest@",
                "newsletter@",
                "updates@",
                "tickets@",
                "marketing@",
                "promo@",
                "campaigns@",
                "surveys@",
                "feedback@",
                "reports@",
                "service@",
                r"^prvs=.*@",
                r"^msprvs\d+=",
                r"[a-z0-9\-]{30,}@",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            internal_subjects: Vec::new(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: EnrichmentProvider::OpenAi,
            endpoint: None,
            model: None,
            api_key_env: None,
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 60,
            max_contacts: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { csv_separator: ',' }
    }
}

// ── Validation ──────────────────────────────────────────────────

impl Config {
    /// Check the settings the aggregation core depends on.
    ///
    /// Called once at startup; any error here is fatal for the run.
    pub fn validate(&self) -> Result<()> {
        if self.domains.internal.is_empty() {
            return Err(ContactError::Config(
                "no internal domains configured (domains.internal)".into(),
            ));
        }
        if self.domains.target_patterns.is_empty() {
            return Err(ContactError::Config(
                "no target domain patterns configured (domains.target_patterns)".into(),
            ));
        }
        for domain in &self.domains.internal {
            check_domain_token("domains.internal", domain)?;
        }
        for pattern in &self.domains.target_patterns {
            check_domain_token("domains.target_patterns", pattern)?;
        }
        if self.aggregation.sample_cap == 0 {
            return Err(ContactError::Config(
                "aggregation.sample_cap must be at least 1".into(),
            ));
        }
        self.validate_filter()
    }

    /// Check only the cleaning rules; `clean` needs nothing else.
    pub fn validate_filter(&self) -> Result<()> {
        crate::filter::AutomatedMatcher::new(&self.filter.automated_patterns)?;
        Ok(())
    }
}

fn check_domain_token(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Err(ContactError::Config(format!("{field}: empty entry")));
    }
    if trimmed.contains('@') || trimmed.chars().any(char::is_whitespace) {
        return Err(ContactError::Config(format!(
            "{field}: '{value}' is not a domain or domain suffix"
        )));
    }
    Ok(())
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXCONTACTS_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mboxcontacts").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxcontacts")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut cfg = Config::default();
        cfg.domains.internal = vec!["allfed.info".to_string()];
        cfg
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.aggregation.sample_cap, 5);
        assert_eq!(cfg.domains.target_patterns[0], ".gov.au");
        assert_eq!(cfg.export.csv_separator, ',');
        assert_eq!(
            cfg.organizations.aliases.get("abs").map(String::as_str),
            Some("Australian Bureau of Statistics")
        );
    }

    #[test]
    fn test_default_config_needs_internal_domains() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ContactError::Config(_)));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        let mut cfg = valid();
        cfg.domains.target_patterns = vec![];
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.domains.target_patterns = vec!["user@gov.au".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.domains.internal.push("  ".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.aggregation.sample_cap = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[domains]
internal = ["example.org"]

[aggregation]
sample_cap = 3

[organizations.aliases]
dpc = "Department of the Premier and Cabinet"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.domains.internal, vec!["example.org".to_string()]);
        assert_eq!(cfg.aggregation.sample_cap, 3);
        assert_eq!(cfg.aggregation.snippet_chars, 300);
        assert_eq!(cfg.domains.target_patterns.len(), 5);
        assert_eq!(cfg.organizations.aliases.len(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = valid();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.domains.internal, cfg.domains.internal);
        assert_eq!(parsed.enrichment.model, cfg.enrichment.model);
        assert_eq!(parsed.enrichment.provider, EnrichmentProvider::OpenAi);
    }

    #[test]
    fn test_filter_validation_ignores_domains() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_err());
        assert!(cfg.validate_filter().is_ok());

        cfg.filter.automated_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(
            cfg.validate_filter().unwrap_err(),
            ContactError::Config(_)
        ));
    }

    #[test]
    fn test_enrichment_provider_defaults() {
        let toml_str = r#"
[enrichment]
provider = "anthropic"
"#;
        let cfg: Config = toml::from_str(toml_str).expect("parse");
        assert_eq!(cfg.enrichment.provider, EnrichmentProvider::Anthropic);
        assert_eq!(cfg.enrichment.endpoint(), "https://api.anthropic.com/v1");
        assert_eq!(cfg.enrichment.api_key_env(), "ANTHROPIC_API_KEY");
        assert!(cfg.enrichment.model().starts_with("claude"));

        let local = EnrichmentConfig {
            model: Some("llama3".to_string()),
            endpoint: Some("http://localhost:11434/v1".to_string()),
            ..EnrichmentConfig::default()
        };
        assert_eq!(local.model(), "llama3");
        assert_eq!(local.endpoint(), "http://localhost:11434/v1");
        assert_eq!(local.api_key_env(), "OPENAI_API_KEY");

        assert_eq!(
            "Anthropic".parse::<EnrichmentProvider>(),
            Ok(EnrichmentProvider::Anthropic)
        );
        assert!("gemini".parse::<EnrichmentProvider>().is_err());
    }
}
