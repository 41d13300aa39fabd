//! Post-aggregation cleaning: bounce/automated addresses and internal-only threads.

use regex::Regex;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::error::{ContactError, Result};
use crate::model::contact::Contact;

/// Result of [`clean`]. Removed contacts are kept so callers can report them.
#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    pub kept: Vec<Contact>,
    pub removed_automated: Vec<Contact>,
    pub removed_internal: Vec<Contact>,
}

impl CleanOutcome {
    pub fn removed(&self) -> usize {
        self.removed_automated.len() + self.removed_internal.len()
    }
}

/// Compiled form of `filter.automated_patterns`.
///
/// Entries containing regex metacharacters are compiled as regular
/// expressions; everything else is a plain substring.
#[derive(Debug, Clone)]
pub struct AutomatedMatcher {
    substrings: Vec<String>,
    regexes: Vec<Regex>,
}

const REGEX_META: &[char] = &['^', '$', '*', '+', '?', '[', ']', '{', '}', '(', ')', '|', '\\'];

impl AutomatedMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut substrings = Vec::new();
        let mut regexes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if pattern.contains(REGEX_META) {
                let re = Regex::new(pattern).map_err(|e| {
                    ContactError::Config(format!("filter.automated_patterns: '{pattern}': {e}"))
                })?;
                regexes.push(re);
            } else {
                substrings.push(pattern.to_lowercase());
            }
        }
        Ok(Self {
            substrings,
            regexes,
        })
    }

    /// `true` for bounce, no-reply and other machine-generated addresses.
    pub fn is_automated(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.substrings.iter().any(|s| email.contains(s.as_str()))
            || self.regexes.iter().any(|re| re.is_match(&email))
    }
}

/// Split contacts into kept and removed. Kept contacts are moved, never modified.
///
/// Automated addresses are checked first; a contact removed for that reason
/// is not also counted as internal.
pub fn clean(contacts: Vec<Contact>, config: &FilterConfig) -> Result<CleanOutcome> {
    let matcher = AutomatedMatcher::new(&config.automated_patterns)?;
    let internal_subjects: Vec<String> = config
        .internal_subjects
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut outcome = CleanOutcome::default();
    for contact in contacts {
        if matcher.is_automated(&contact.email) {
            debug!(email = %contact.email, "Removing automated address");
            outcome.removed_automated.push(contact);
        } else if let Some(subject) = internal_subject(&contact, &internal_subjects) {
            debug!(email = %contact.email, subject = %subject, "Removing internal collaborator");
            outcome.removed_internal.push(contact);
        } else {
            outcome.kept.push(contact);
        }
    }

    info!(
        kept = outcome.kept.len(),
        automated = outcome.removed_automated.len(),
        internal = outcome.removed_internal.len(),
        "Cleaned contacts"
    );
    Ok(outcome)
}

/// First interaction subject containing an internal-only subject pattern.
fn internal_subject<'a>(contact: &'a Contact, patterns: &[String]) -> Option<&'a str> {
    if patterns.is_empty() {
        return None;
    }
    contact
        .interactions()
        .iter()
        .map(|i| i.subject.as_str())
        .chain(contact.sample_subjects.iter().map(String::as_str))
        .find(|subject| {
            let lower = subject.to_lowercase();
            patterns.iter().any(|p| lower.contains(p.as_str()))
        })
}
