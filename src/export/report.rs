//! Run summary and the plain-text extraction report.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::enrich::EnrichedContact;
use crate::error::{ContactError, Result};
use crate::export::json::ContactTable;
use crate::model::contact::Contact;

/// Interaction count from which a contact counts as high-interaction.
pub const HIGH_INTERACTION: u64 = 5;

/// How many entries the "top" lists keep.
const TOP_N: usize = 10;

/// Coarse organization category of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    Government,
    University,
    Organisation,
    Business,
    Personal,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Government,
        Self::University,
        Self::Organisation,
        Self::Business,
        Self::Personal,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Government => "Government",
            Self::University => "University",
            Self::Organisation => "Organisation",
            Self::Business => "Business",
            Self::Personal => "Personal",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorize a contact from its domain labels and organization name.
pub fn categorize(contact: &Contact, personal_domains: &[String]) -> Category {
    let domain = contact.domain.to_lowercase();
    let personal = personal_domains.iter().any(|p| {
        let p = p.to_lowercase();
        domain == p || domain.ends_with(&format!(".{p}"))
    });
    if personal {
        return Category::Personal;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let has = |l: &str| labels.iter().skip(1).any(|x| *x == l);
    if has("gov") || has("govt") || has("mil") {
        return Category::Government;
    }
    if has("edu") || has("ac") {
        return Category::University;
    }

    let org = contact
        .organization
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    if has("org") || has("asn") || has("ngo") {
        return Category::Organisation;
    }
    if ["foundation", "charity", "institute", "nonprofit"]
        .iter()
        .any(|k| org.contains(k))
    {
        return Category::Organisation;
    }
    if org.contains("university") {
        return Category::University;
    }
    if has("com") || has("net") || has("biz") || has("co") {
        return Category::Business;
    }
    Category::Other
}

/// Aggregate figures for a contact table.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_contacts: usize,
    pub target_contacts: usize,
    pub high_interaction: usize,
    pub total_interactions: u64,
    pub categories: Vec<(Category, usize)>,
    pub top_domains: Vec<(String, usize)>,
    /// `(label, email, interaction_count)` of the busiest target contacts.
    pub top_targets: Vec<(String, String, u64)>,
}

impl Summary {
    pub fn from_contacts(contacts: &[Contact], personal_domains: &[String]) -> Self {
        let mut category_counts: HashMap<Category, usize> = HashMap::new();
        let mut domain_counts: HashMap<&str, usize> = HashMap::new();
        for contact in contacts {
            *category_counts
                .entry(categorize(contact, personal_domains))
                .or_default() += 1;
            *domain_counts.entry(contact.domain.as_str()).or_default() += 1;
        }

        let categories = Category::ALL
            .iter()
            .filter_map(|c| category_counts.get(c).map(|n| (*c, *n)))
            .collect();

        let mut top_domains: Vec<(String, usize)> = domain_counts
            .into_iter()
            .map(|(d, n)| (d.to_string(), n))
            .collect();
        top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_domains.truncate(TOP_N);

        let mut targets: Vec<&Contact> = contacts.iter().filter(|c| c.is_target()).collect();
        targets.sort_by(|a, b| b.interaction_count.cmp(&a.interaction_count));

        Self {
            total_contacts: contacts.len(),
            target_contacts: targets.len(),
            high_interaction: contacts
                .iter()
                .filter(|c| c.interaction_count >= HIGH_INTERACTION)
                .count(),
            total_interactions: contacts.iter().map(|c| c.interaction_count).sum(),
            categories,
            top_domains,
            top_targets: targets
                .iter()
                .take(TOP_N)
                .map(|c| (c.label().to_string(), c.email.clone(), c.interaction_count))
                .collect(),
        }
    }
}

/// Write `contact_extraction_report.txt`.
pub fn write_report(table: &ContactTable, summary: &Summary, path: &Path) -> Result<()> {
    let mut out = String::new();
    render_report(table, summary, &mut out).map_err(|e| ContactError::Export(e.to_string()))?;
    let mut file = std::fs::File::create(path).map_err(|e| ContactError::io(path, e))?;
    file.write_all(out.as_bytes())
        .map_err(|e| ContactError::io(path, e))
}

fn render_report(table: &ContactTable, summary: &Summary, out: &mut String) -> fmt::Result {
    use std::fmt::Write as _;

    writeln!(out, "Email Contact Extraction Report")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))?;
    if let Some(ref source) = table.source {
        writeln!(out, "Source:    {source}")?;
    }
    if table.truncated {
        writeln!(out, "WARNING:   the source was not read to the end; figures are partial")?;
    }
    writeln!(out)?;

    writeln!(out, "OVERALL STATISTICS")?;
    writeln!(out, "{}", "-".repeat(20))?;
    writeln!(out, "Total unique contacts: {}", summary.total_contacts)?;
    writeln!(out, "Target-domain contacts: {}", summary.target_contacts)?;
    writeln!(
        out,
        "High interaction contacts ({HIGH_INTERACTION}+ emails): {}",
        summary.high_interaction
    )?;
    writeln!(out, "Total interactions: {}", summary.total_interactions)?;
    writeln!(out, "Sent messages processed: {}", table.stats.sent_messages)?;
    writeln!(out, "Duplicate messages skipped: {}", table.stats.duplicates)?;
    writeln!(out, "Invalid addresses discarded: {}", table.discards.invalid_addresses)?;
    writeln!(out, "Malformed messages discarded: {}", table.discards.malformed_messages)?;
    writeln!(out)?;

    writeln!(out, "CATEGORIES")?;
    writeln!(out, "{}", "-".repeat(10))?;
    for (category, count) in &summary.categories {
        writeln!(out, "{category}: {count}")?;
    }
    writeln!(out)?;

    writeln!(out, "TOP DOMAINS")?;
    writeln!(out, "{}", "-".repeat(11))?;
    for (domain, count) in &summary.top_domains {
        writeln!(out, "{domain}: {count}")?;
    }
    writeln!(out)?;

    if !summary.top_targets.is_empty() {
        writeln!(out, "TOP TARGET CONTACTS")?;
        writeln!(out, "{}", "-".repeat(19))?;
        for (label, email, count) in &summary.top_targets {
            let contact = table.contacts.iter().find(|c| &c.email == email);
            writeln!(out, "{label} <{email}> - {count} interactions")?;
            if let Some(contact) = contact {
                writeln!(
                    out,
                    "  Organization: {}",
                    contact.organization.as_deref().unwrap_or("Unknown")
                )?;
                let last = contact
                    .last_seen
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                writeln!(out, "  Last contact: {last}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Write `important_contacts_enhancement_report.txt` for an enrichment run.
pub fn write_enrichment_report(enriched: &[EnrichedContact], path: &Path) -> Result<()> {
    let mut out = String::new();
    render_enrichment_report(enriched, &mut out).map_err(|e| ContactError::Export(e.to_string()))?;
    std::fs::write(path, out).map_err(|e| ContactError::io(path, e))
}

/// `(value, count)` sorted by count descending, then value.
fn breakdown<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        let value = value.trim();
        *counts
            .entry(if value.is_empty() { "Unspecified" } else { value })
            .or_default() += 1;
    }
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

fn render_enrichment_report(enriched: &[EnrichedContact], out: &mut String) -> fmt::Result {
    use std::fmt::Write as _;

    let analyzed: Vec<_> = enriched
        .iter()
        .filter_map(|e| e.enrichment.as_ref().map(|a| (&e.contact, a)))
        .collect();

    writeln!(out, "Contact Enhancement Report")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Total contacts analyzed: {}", enriched.len())?;
    writeln!(out, "Failed analyses: {}", enriched.len() - analyzed.len())?;
    writeln!(out)?;

    writeln!(out, "HANDOVER PRIORITY BREAKDOWN")?;
    writeln!(out, "{}", "-".repeat(30))?;
    for (priority, count) in breakdown(analyzed.iter().map(|(_, a)| a.handover_priority.as_str())) {
        writeln!(out, "{priority}: {count}")?;
    }
    writeln!(out)?;

    writeln!(out, "RELATIONSHIP TYPE BREAKDOWN")?;
    writeln!(out, "{}", "-".repeat(30))?;
    for (kind, count) in breakdown(analyzed.iter().map(|(_, a)| a.relationship_type.as_str())) {
        writeln!(out, "{kind}: {count}")?;
    }
    writeln!(out)?;

    let high: Vec<_> = analyzed.iter().filter(|(_, a)| a.is_high_priority()).collect();
    if !high.is_empty() {
        writeln!(out, "HIGH PRIORITY CONTACTS FOR HANDOVER")?;
        writeln!(out, "{}", "-".repeat(35))?;
        for (contact, analysis) in high {
            writeln!(out)?;
            writeln!(out, "{} <{}>", contact.label(), contact.email)?;
            writeln!(
                out,
                "Organization: {}",
                contact.organization.as_deref().unwrap_or("Unknown")
            )?;
            writeln!(out, "Relationship: {}", analysis.relationship_description)?;
            writeln!(out, "Key Topics: {}", analysis.key_topics.join(", "))?;
            writeln!(out, "Next Steps: {}", analysis.suggested_next_steps)?;
            writeln!(out, "{}", "-".repeat(50))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{DiscardTally, IngestStats};

    fn contact(email: &str, org: Option<&str>, tags: &[&str], count: u64) -> Contact {
        Contact {
            email: email.to_string(),
            display_name: String::new(),
            organization: org.map(str::to_string),
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

    fn personal() -> Vec<String> {
        vec!["gmail.com".to_string()]
    }

    #[test]
    fn test_categorize() {
        let p = personal();
        let cases = [
            ("a@treasury.gov.au", None, Category::Government),
            ("a@state.gov", None, Category::Government),
            ("a@anu.edu.au", None, Category::University),
            ("a@ox.ac.uk", None, Category::University),
            ("a@redcross.org.au", None, Category::Organisation),
            ("a@acme.com", Some("Gates Foundation"), Category::Organisation),
            ("a@acme.com.au", None, Category::Business),
            ("a@gmail.com", None, Category::Personal),
            ("a@example.io", None, Category::Other),
        ];
        for (email, org, expected) in cases {
            assert_eq!(categorize(&contact(email, org, &[], 1), &p), expected, "{email}");
        }
    }

    #[test]
    fn test_summary_counts() {
        let contacts = vec![
            contact("a@treasury.gov.au", None, &[".gov.au"], 7),
            contact("b@treasury.gov.au", None, &[".gov.au"], 2),
            contact("c@gmail.com", None, &[], 5),
        ];
        let summary = Summary::from_contacts(&contacts, &personal());
        assert_eq!(summary.total_contacts, 3);
        assert_eq!(summary.target_contacts, 2);
        assert_eq!(summary.high_interaction, 2);
        assert_eq!(summary.total_interactions, 14);
        assert_eq!(summary.top_domains[0], ("treasury.gov.au".to_string(), 2));
        assert_eq!(
            summary.categories,
            vec![(Category::Government, 2), (Category::Personal, 1)]
        );
        assert_eq!(summary.top_targets[0].1, "a@treasury.gov.au");
    }

    #[test]
    fn test_write_report() {
        let contacts = vec![contact("a@treasury.gov.au", Some("Treasury"), &[".gov.au"], 7)];
        let table = ContactTable {
            version: 1,
            generated_at: Utc::now(),
            source: Some("sent.mbox".into()),
            contacts: contacts.clone(),
            discards: DiscardTally::default(),
            stats: IngestStats::default(),
            truncated: true,
        };
        let summary = Summary::from_contacts(&contacts, &personal());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contact_extraction_report.txt");
        write_report(&table, &summary, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Total unique contacts: 1"));
        assert!(text.contains("a@treasury.gov.au <a@treasury.gov.au> - 7 interactions"));
        assert!(text.contains("Organization: Treasury"));
        assert!(text.contains("WARNING"));
    }

    #[test]
    fn test_write_enrichment_report() {
        use crate::enrich::Enrichment;

        let analysis = |kind: &str, priority: &str| Enrichment {
            relationship_type: kind.to_string(),
            handover_priority: priority.to_string(),
            relationship_description: format!("{kind} contact"),
            key_topics: vec!["drought".to_string(), "grain".to_string()],
            suggested_next_steps: "Introduce successor".to_string(),
            ..Enrichment::default()
        };
        let mut alice = contact("alice@treasury.gov.au", Some("Treasury"), &[".gov.au"], 7);
        alice.display_name = "Alice Nguyen".to_string();
        let enriched = vec![
            EnrichedContact {
                contact: alice,
                enrichment: Some(analysis("Government Official", "High")),
                error: None,
            },
            EnrichedContact {
                contact: contact("b@acme.com", None, &[], 2),
                enrichment: Some(analysis("Vendor", "Low")),
                error: None,
            },
            EnrichedContact {
                contact: contact("c@acme.com", None, &[], 1),
                enrichment: Some(analysis("Vendor", "Low")),
                error: None,
            },
            EnrichedContact {
                contact: contact("d@acme.com", None, &[], 1),
                enrichment: None,
                error: Some("timeout".to_string()),
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("important_contacts_enhancement_report.txt");
        write_enrichment_report(&enriched, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(text.contains("Total contacts analyzed: 4"));
        assert!(text.contains("Failed analyses: 1"));
        assert!(text.contains("HANDOVER PRIORITY BREAKDOWN\n------------------------------\nLow: 2\nHigh: 1\n"));
        assert!(text.contains("Vendor: 2\nGovernment Official: 1\n"));
        assert!(text.contains("Alice Nguyen <alice@treasury.gov.au>\nOrganization: Treasury\n"));
        assert!(text.contains("Key Topics: drought, grain"));
        assert!(text.contains("Next Steps: Introduce successor"));
        assert!(!text.contains("b@acme.com"));
    }
}
