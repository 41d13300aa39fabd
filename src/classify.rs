//! Address classification: normalization, validation, and domain membership.

use tracing::debug;

use crate::config::DomainConfig;
use crate::error::{ContactError, Result};

/// A validated, normalized address with its domain memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAddress {
    /// Lowercase, trimmed `local@domain`.
    pub email: String,
    pub domain: String,
    pub is_internal: bool,
    /// Every target pattern the domain ends with, in configured order.
    pub category_tags: Vec<String>,
}

/// Classifies addresses against the configured internal and target domain sets.
///
/// Pure: the result depends only on the input string and the configuration
/// passed to [`AddressClassifier::new`].
#[derive(Debug, Clone)]
pub struct AddressClassifier {
    internal_domains: Vec<String>,
    target_patterns: Vec<String>,
    personal_domains: Vec<String>,
}

impl AddressClassifier {
    pub fn new(domains: &DomainConfig) -> Self {
        let clean = |list: &[String]| -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(list.len());
            for item in list {
                let item = item.trim().to_lowercase();
                if !item.is_empty() && !out.contains(&item) {
                    out.push(item);
                }
            }
            out
        };
        Self {
            internal_domains: clean(&domains.internal)
                .into_iter()
                .map(|d| d.trim_start_matches('.').to_string())
                .collect(),
            target_patterns: clean(&domains.target_patterns),
            personal_domains: clean(&domains.personal),
        }
    }

    /// Normalize and classify a raw address.
    ///
    /// Fails with [`ContactError::InvalidAddress`] unless the address has
    /// exactly one `@` with non-empty local and domain parts.
    pub fn classify(&self, raw: &str) -> Result<ClassifiedAddress> {
        let email = normalize(raw);
        let (_, domain) = split_address(&email)
            .map_err(|reason| ContactError::invalid_address(raw.trim(), reason))?;
        let domain = domain.to_string();
        let is_internal = self.is_internal_domain(&domain);
        let category_tags = self.matching_patterns(&domain);
        debug!(email = %email, internal = is_internal, tags = ?category_tags, "Classified address");

        Ok(ClassifiedAddress {
            email,
            domain,
            is_internal,
            category_tags,
        })
    }

    /// Exact match or subdomain of an internal domain.
    pub fn is_internal_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.internal_domains
            .iter()
            .any(|d| domain_matches(&domain, d))
    }

    /// Webmail providers whose users carry no organization in their domain.
    pub fn is_personal_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.personal_domains
            .iter()
            .any(|d| domain_matches(&domain, d))
    }

    /// First labels of the internal domains (`allfed.info` → `allfed`).
    pub fn internal_labels(&self) -> impl Iterator<Item = &str> {
        self.internal_domains
            .iter()
            .filter_map(|d| d.split('.').next())
            .filter(|l| !l.is_empty())
    }

    fn matching_patterns(&self, domain: &str) -> Vec<String> {
        self.target_patterns
            .iter()
            .filter(|p| domain.ends_with(p.as_str()))
            .cloned()
            .collect()
    }
}

/// Lowercase, trim whitespace, drop a `mailto:` prefix and surrounding angle brackets.
pub fn normalize(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(stripped) = s.strip_prefix('<') {
        s = stripped;
    }
    if let Some(stripped) = s.strip_suffix('>') {
        s = stripped;
    }
    let s = s.trim().to_lowercase();
    match s.strip_prefix("mailto:") {
        Some(rest) => rest.trim().to_string(),
        None => s,
    }
}

fn split_address(email: &str) -> std::result::Result<(&str, &str), &'static str> {
    if email.is_empty() {
        return Err("empty address");
    }
    if email.chars().any(char::is_whitespace) {
        return Err("contains whitespace");
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("must contain exactly one '@'");
    };
    if local.is_empty() {
        return Err("empty local part");
    }
    if domain.is_empty() {
        return Err("empty domain part");
    }
    Ok((local, domain))
}

fn domain_matches(domain: &str, base: &str) -> bool {
    domain == base
        || (domain.len() > base.len()
            && domain.ends_with(base)
            && domain.as_bytes()[domain.len() - base.len() - 1] == b'.')
}
