//! Export contacts to CSV.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::enrich::EnrichedContact;
use crate::error::{ContactError, Result};
use crate::export::llm_summary::SummaryRow;
use crate::model::contact::Contact;

const CONTACT_COLUMNS: [&str; 12] = [
    "email",
    "name",
    "organization",
    "organization_source",
    "domain",
    "category_tags",
    "is_target",
    "interaction_count",
    "first_contact",
    "last_contact",
    "sample_subjects",
    "sample_snippets",
];

const ENRICHMENT_COLUMNS: [&str; 7] = [
    "relationship_type",
    "engagement_level",
    "key_topics",
    "relationship_description",
    "handover_priority",
    "suggested_next_steps",
    "enrichment_error",
];

const SUMMARY_COLUMNS: [&str; 14] = [
    "contact_name",
    "email",
    "domain",
    "organization",
    "organization_category",
    "is_target",
    "interaction_count",
    "engagement_level",
    "first_contact",
    "last_contact",
    "interaction_summary",
    "recent_email_subjects",
    "relationship_indicators",
    "sample_email_context",
];

/// Export order: target contacts first, then by interaction count descending.
///
/// The sort is stable, so equal contacts keep first-sighting order.
pub fn export_order(contacts: &[Contact]) -> Vec<&Contact> {
    let mut sorted: Vec<&Contact> = contacts.iter().collect();
    sorted.sort_by(|a, b| {
        b.is_target()
            .cmp(&a.is_target())
            .then_with(|| b.interaction_count.cmp(&a.interaction_count))
    });
    sorted
}

/// Write contacts, in the order given, to `output_path`.
pub fn export_contacts(contacts: &[&Contact], output_path: &Path, separator: char) -> Result<()> {
    write_csv(output_path, |out| {
        write_row(out, CONTACT_COLUMNS.iter().copied(), separator)?;
        for contact in contacts {
            write_row(out, contact_fields(contact).iter().map(String::as_str), separator)?;
        }
        Ok(())
    })
}

/// Write enriched contacts: every contact column followed by the analysis.
pub fn export_enriched(
    contacts: &[EnrichedContact],
    output_path: &Path,
    separator: char,
) -> Result<()> {
    write_csv(output_path, |out| {
        let header = CONTACT_COLUMNS.iter().chain(ENRICHMENT_COLUMNS.iter()).copied();
        write_row(out, header, separator)?;
        for item in contacts {
            let mut fields = contact_fields(&item.contact);
            match &item.enrichment {
                Some(e) => fields.extend([
                    e.relationship_type.clone(),
                    e.engagement_level.clone(),
                    e.key_topics.join(", "),
                    e.relationship_description.clone(),
                    e.handover_priority.clone(),
                    e.suggested_next_steps.clone(),
                    String::new(),
                ]),
                None => {
                    fields.extend(std::iter::repeat(String::new()).take(ENRICHMENT_COLUMNS.len() - 1));
                    fields.push(item.error.clone().unwrap_or_default());
                }
            }
            write_row(out, fields.iter().map(String::as_str), separator)?;
        }
        Ok(())
    })
}

/// Write the LLM summary table, rows in the order given.
pub fn export_llm_summary(rows: &[SummaryRow], output_path: &Path, separator: char) -> Result<()> {
    write_csv(output_path, |out| {
        write_row(out, SUMMARY_COLUMNS.iter().copied(), separator)?;
        for row in rows {
            let fields = [
                row.contact_name.clone(),
                row.email.clone(),
                row.domain.clone(),
                row.organization.clone(),
                row.category.to_string(),
                row.is_target.to_string(),
                row.interaction_count.to_string(),
                row.engagement.to_string(),
                row.first_contact.clone(),
                row.last_contact.clone(),
                row.interaction_summary.clone(),
                row.recent_subjects.join(" | "),
                row.relationship_indicators.join(", "),
                row.context_sample.clone(),
            ];
            write_row(out, fields.iter().map(String::as_str), separator)?;
        }
        Ok(())
    })
}

fn contact_fields(contact: &Contact) -> Vec<String> {
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    };
    vec![
        contact.email.clone(),
        contact.display_name.clone(),
        contact.organization.clone().unwrap_or_default(),
        contact
            .organization_source
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        contact.domain.clone(),
        contact.category_tags.join("; "),
        contact.is_target().to_string(),
        contact.interaction_count.to_string(),
        date(contact.first_seen),
        date(contact.last_seen),
        contact.sample_subjects.join(" | "),
        contact.sample_snippets.join(" | "),
    ]
}

fn write_csv(
    path: &Path,
    body: impl FnOnce(&mut dyn Write) -> std::io::Result<()>,
) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| ContactError::io(path, e))?;
    let mut out = BufWriter::new(file);

    // UTF-8 BOM for Excel
    out.write_all(&[0xEF, 0xBB, 0xBF])
        .and_then(|_| body(&mut out))
        .and_then(|_| out.flush())
        .map_err(|e| ContactError::io(path, e))
}

fn write_row<'a>(
    out: &mut dyn Write,
    fields: impl Iterator<Item = &'a str>,
    separator: char,
) -> std::io::Result<()> {
    let row = fields
        .map(|f| csv_escape(f, separator))
        .collect::<Vec<_>>()
        .join(&separator.to_string());
    writeln!(out, "{row}")
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains the separator, quotes, or newlines.
fn csv_escape(value: &str, separator: char) -> String {
    if value.contains(separator) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::Enrichment;

    fn contact(email: &str, tags: &[&str], count: u64) -> Contact {
        Contact {
            email: email.to_string(),
            display_name: "Nguyen, Alice".to_string(),
            organization: None,
            organization_source: None,
            domain: email.split('@').nth(1).unwrap_or_default().to_string(),
            category_tags: tags.iter().map(|t| t.to_string()).collect(),
            interaction_count: count,
            first_seen: None,
            last_seen: None,
            sample_subjects: vec!["Say \"hi\"".to_string()],
            sample_snippets: Vec::new(),
            interactions: Vec::new(),
        }
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello", ','), "hello");
        assert_eq!(csv_escape("hello, world", ','), "\"hello, world\"");
        assert_eq!(csv_escape("hello, world", ';'), "hello, world");
        assert_eq!(csv_escape("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2", ','), "\"line1\nline2\"");
    }

    #[test]
    fn test_export_order_targets_first() {
        let contacts = vec![
            contact("a@example.com", &[], 50),
            contact("b@agency.gov.au", &[".gov.au"], 1),
            contact("c@agency.gov.au", &[".gov.au"], 9),
            contact("d@example.com", &[], 50),
        ];
        let order: Vec<&str> = export_order(&contacts)
            .iter()
            .map(|c| c.email.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["c@agency.gov.au", "b@agency.gov.au", "a@example.com", "d@example.com"]
        );
    }

    #[test]
    fn test_export_contacts_writes_bom_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts_all.csv");
        let c = contact("alice@agency.gov.au", &[".gov.au"], 3);
        export_contacts(&[&c], &path, ',').unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("email,name,organization,"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("alice@agency.gov.au,\"Nguyen, Alice\",,,agency.gov.au,.gov.au,true,3,"));
        assert!(row.contains("\"Say \"\"hi\"\"\""));
    }

    #[test]
    fn test_export_enriched_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts_enriched.csv");
        let items = vec![
            EnrichedContact {
                contact: contact("a@agency.gov.au", &[".gov.au"], 3),
                enrichment: Some(Enrichment {
                    handover_priority: "High".into(),
                    key_topics: vec!["food".into(), "policy".into()],
                    ..Enrichment::default()
                }),
                error: None,
            },
            EnrichedContact {
                contact: contact("b@agency.gov.au", &[".gov.au"], 1),
                enrichment: None,
                error: Some("timeout".into()),
            },
        ];
        export_enriched(&items, &path, ',').unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert!(lines[0].ends_with("handover_priority,suggested_next_steps,enrichment_error"));
        assert!(lines[1].contains("\"food, policy\""));
        assert!(lines[1].ends_with(",High,,"));
        assert!(lines[2].ends_with(",,,,,,,timeout"));
    }
}
