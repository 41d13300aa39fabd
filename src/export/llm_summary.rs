//! LLM-ready contact summary.
//!
//! One row per contact with an engagement bucket, cleaned recent subjects,
//! keyword-derived relationship cues and a few dated excerpts. The table is
//! meant to be pasted into (or fed to) a model for relationship review.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::export::report::{categorize, Category};
use crate::model::contact::Contact;

/// Distinct cleaned subjects listed per contact.
const RECENT_SUBJECTS: usize = 5;

/// Excerpts combined into the context sample.
const CONTEXT_EXCERPTS: usize = 5;

/// Excerpts shorter than this carry no useful context.
const MIN_EXCERPT_CHARS: usize = 50;

/// Upper bound on the combined context sample.
const MAX_CONTEXT_CHARS: usize = 2500;

static ENCODED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\?[^?]+\?[QqBb]\?.*?\?=").expect("valid encoded-word regex"));

static REPLY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^((re|fwd?|aw|sv)\s*(\[\d+\])?\s*:\s*)+").expect("valid reply prefix regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Keyword groups searched in subjects, with the cue they produce.
const SUBJECT_CUES: [(&str, &[&str]); 4] = [
    (
        "Meetings/Calls",
        &["meeting", "call", "discussion", "invitation", "catch up", "follow up", "follow-up"],
    ),
    (
        "Active Collaboration",
        &["collaboration", "project", "partnership", "proposal", "application"],
    ),
    (
        "Formal Government",
        &["[sec=official]", "official", "clearance", "submission"],
    ),
    ("Funding Related", &["fund", "grant", "budget"]),
];

/// Interaction-count bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EngagementBucket {
    VeryHigh,
    High,
    Medium,
    Low,
    Minimal,
}

impl EngagementBucket {
    pub const ALL: [EngagementBucket; 5] = [
        Self::VeryHigh,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Minimal,
    ];

    pub fn from_count(count: u64) -> Self {
        match count {
            50.. => Self::VeryHigh,
            20..=49 => Self::High,
            10..=19 => Self::Medium,
            5..=9 => Self::Low,
            _ => Self::Minimal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Minimal => "Minimal",
        }
    }
}

impl fmt::Display for EngagementBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip reply/forward prefixes and leftover encoded words; collapse whitespace.
///
/// `"Re: Fwd:  Budget\r\n update"` → `"Budget update"`.
pub fn clean_subject(subject: &str) -> String {
    let without_encoded = ENCODED_WORD.replace_all(subject, "");
    let collapsed = WHITESPACE.replace_all(without_encoded.trim(), " ");
    REPLY_PREFIX.replace(&collapsed, "").trim().to_string()
}

/// Cues derived from subjects and interaction volume.
pub fn relationship_indicators(contact: &Contact) -> Vec<&'static str> {
    let subjects = contact_subjects(contact)
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let mut cues: Vec<&'static str> = SUBJECT_CUES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| subjects.contains(k)))
        .map(|(cue, _)| *cue)
        .collect();

    match contact.interaction_count {
        20.. => cues.push("High Engagement"),
        10..=19 => cues.push("Regular Contact"),
        5..=9 => cues.push("Moderate Contact"),
        _ => {}
    }
    cues
}

fn contact_subjects(contact: &Contact) -> Box<dyn Iterator<Item = &str> + '_> {
    if contact.interactions().is_empty() {
        Box::new(contact.sample_subjects.iter().map(String::as_str))
    } else {
        Box::new(contact.interactions().iter().map(|r| r.subject.as_str()))
    }
}

/// One row of the LLM summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub contact_name: String,
    pub email: String,
    pub domain: String,
    pub organization: String,
    pub category: Category,
    pub is_target: bool,
    pub interaction_count: u64,
    pub engagement: EngagementBucket,
    pub first_contact: String,
    pub last_contact: String,
    pub interaction_summary: String,
    pub recent_subjects: Vec<String>,
    pub relationship_indicators: Vec<&'static str>,
    pub context_sample: String,
}

impl SummaryRow {
    pub fn from_contact(contact: &Contact, personal_domains: &[String]) -> Self {
        let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
            d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
        };

        // Newest first
        let recent: Vec<_> = contact.interactions().iter().rev().collect();

        let mut recent_subjects: Vec<String> = Vec::new();
        for subject in recent.iter().map(|r| clean_subject(&r.subject)) {
            if recent_subjects.len() == RECENT_SUBJECTS {
                break;
            }
            if !subject.is_empty() && !recent_subjects.contains(&subject) {
                recent_subjects.push(subject);
            }
        }

        let first = date(contact.first_seen);
        let last = date(contact.last_seen);
        let interaction_summary = if first.is_empty() {
            format!("{} interactions", contact.interaction_count)
        } else {
            format!("{} interactions ({first} to {last})", contact.interaction_count)
        };

        let excerpts: Vec<String> = recent
            .iter()
            .filter(|r| r.excerpt.trim().chars().count() > MIN_EXCERPT_CHARS)
            .take(CONTEXT_EXCERPTS)
            .map(|r| {
                let when = r
                    .date
                    .map(|d| d.format("%d %b %Y").to_string())
                    .unwrap_or_else(|| "undated".to_string());
                format!("[{when} - {}]\n{}", clean_subject(&r.subject), r.excerpt.trim())
            })
            .collect();
        let mut context_sample = if excerpts.is_empty() {
            contact.sample_snippets.first().cloned().unwrap_or_default()
        } else {
            excerpts.join("\n\n---\n\n")
        };
        if context_sample.chars().count() > MAX_CONTEXT_CHARS {
            context_sample = context_sample.chars().take(MAX_CONTEXT_CHARS).collect();
            context_sample.push_str("...");
        }

        Self {
            contact_name: contact.label().to_string(),
            email: contact.email.clone(),
            domain: contact.domain.clone(),
            organization: contact.organization.clone().unwrap_or_default(),
            category: categorize(contact, personal_domains),
            is_target: contact.is_target(),
            interaction_count: contact.interaction_count,
            engagement: EngagementBucket::from_count(contact.interaction_count),
            first_contact: first,
            last_contact: last,
            interaction_summary,
            recent_subjects,
            relationship_indicators: relationship_indicators(contact),
            context_sample,
        }
    }
}

/// Summary rows ordered target first, then by engagement bucket, then by count.
pub fn summary_rows(contacts: &[Contact], personal_domains: &[String]) -> Vec<SummaryRow> {
    let mut rows: Vec<SummaryRow> = contacts
        .iter()
        .map(|c| SummaryRow::from_contact(c, personal_domains))
        .collect();
    rows.sort_by(|a, b| {
        b.is_target
            .cmp(&a.is_target)
            .then_with(|| a.engagement.cmp(&b.engagement))
            .then_with(|| b.interaction_count.cmp(&a.interaction_count))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::contact::InteractionRecord;
    use chrono::{TimeZone, Utc};

    fn contact(email: &str, tags: &[&str], count: u64) -> Contact {
        Contact {
            email: email.to_string(),
            display_name: String::new(),
            organization: None,
            organization_source: None,
            domain: email.split('@').nth(1).unwrap_or_default().to_string(),
            category_tags: tags.iter().map(|t| t.to_string()).collect(),
            interaction_count: count,
            first_seen: None,
            last_seen: None,
            sample_subjects: Vec::new(),
            sample_snippets: Vec::new(),
            interactions: Vec::new(),
        }
    }

    fn record(day: u32, subject: &str, excerpt: &str) -> InteractionRecord {
        InteractionRecord {
            date: Some(Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()),
            subject: subject.to_string(),
            excerpt: excerpt.to_string(),
        }
    }

    #[test]
    fn test_engagement_buckets() {
        let cases = [
            (0, EngagementBucket::Minimal),
            (4, EngagementBucket::Minimal),
            (5, EngagementBucket::Low),
            (10, EngagementBucket::Medium),
            (19, EngagementBucket::Medium),
            (20, EngagementBucket::High),
            (50, EngagementBucket::VeryHigh),
            (500, EngagementBucket::VeryHigh),
        ];
        for (count, expected) in cases {
            assert_eq!(EngagementBucket::from_count(count), expected, "{count}");
        }
        assert_eq!(EngagementBucket::VeryHigh.to_string(), "Very High");
    }

    #[test]
    fn test_clean_subject() {
        assert_eq!(clean_subject("Re: Budget"), "Budget");
        assert_eq!(clean_subject("RE: Fwd: FW:  Budget\r\n  update"), "Budget update");
        assert_eq!(clean_subject("Re[2]: Agenda"), "Agenda");
        assert_eq!(clean_subject("=?UTF-8?Q?Caf=C3=A9?= meeting"), "meeting");
        assert_eq!(clean_subject("Rebuild plan"), "Rebuild plan");
        assert_eq!(clean_subject(""), "");
    }

    #[test]
    fn test_relationship_indicators() {
        let mut c = contact("a@treasury.gov.au", &[".gov.au"], 12);
        c.interactions = vec![
            record(1, "Meeting invitation", ""),
            record(2, "Grant application [SEC=OFFICIAL]", ""),
        ];
        assert_eq!(
            relationship_indicators(&c),
            vec![
                "Meetings/Calls",
                "Active Collaboration",
                "Formal Government",
                "Funding Related",
                "Regular Contact"
            ]
        );

        let mut quiet = contact("b@example.com", &[], 1);
        quiet.sample_subjects = vec!["Hello".to_string()];
        assert!(relationship_indicators(&quiet).is_empty());
    }

    #[test]
    fn test_summary_row_recent_subjects_and_context() {
        let long = "We should confirm the grain reserve figures before the briefing next week.";
        let mut c = contact("a@treasury.gov.au", &[".gov.au"], 3);
        c.display_name = "Alice".to_string();
        c.first_seen = Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        c.last_seen = Some(Utc.with_ymd_and_hms(2024, 3, 3, 9, 0, 0).unwrap());
        c.interactions = vec![
            record(1, "Budget", "short"),
            record(2, "Re: Budget", long),
            record(3, "Fwd: Briefing", long),
        ];

        let row = SummaryRow::from_contact(&c, &[]);
        assert_eq!(row.contact_name, "Alice");
        assert_eq!(row.recent_subjects, vec!["Briefing", "Budget"]);
        assert_eq!(row.interaction_summary, "3 interactions (2024-03-01 to 2024-03-03)");
        assert_eq!(row.engagement, EngagementBucket::Minimal);
        assert!(row.context_sample.starts_with("[03 Mar 2024 - Briefing]"));
        assert_eq!(row.context_sample.matches("---").count(), 1);
        assert!(!row.context_sample.contains("short"));
    }

    #[test]
    fn test_summary_rows_order() {
        let contacts = vec![
            contact("a@example.com", &[], 60),
            contact("b@agency.gov.au", &[".gov.au"], 6),
            contact("c@agency.gov.au", &[".gov.au"], 25),
            contact("d@agency.gov.au", &[".gov.au"], 9),
        ];
        let order: Vec<String> = summary_rows(&contacts, &[])
            .into_iter()
            .map(|r| r.email)
            .collect();
        assert_eq!(
            order,
            vec!["c@agency.gov.au", "d@agency.gov.au", "b@agency.gov.au", "a@example.com"]
        );
    }
}
