//! Export functionality: CSV tables, JSON contact tables, and the text reports.

pub mod csv;
pub mod json;
pub mod llm_summary;
pub mod report;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::{ContactError, Result};
use json::ContactTable;
use report::Summary;

pub const CONTACTS_JSON: &str = "contacts.json";
pub const INTERACTIONS_JSON: &str = "contact_interactions.json";
pub const ALL_CSV: &str = "contacts_all.csv";
pub const TARGET_CSV: &str = "contacts_target.csv";
pub const ENRICHED_CSV: &str = "contacts_enriched.csv";
pub const ENRICHED_JSON: &str = "contacts_enriched.json";
pub const REPORT_TXT: &str = "contact_extraction_report.txt";
pub const LLM_SUMMARY_CSV: &str = "contacts_llm_summary.csv";
pub const ENRICHMENT_REPORT_TXT: &str = "important_contacts_enhancement_report.txt";

/// Create `dir` if needed; fail if it exists and is not a directory.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(ContactError::Export(format!(
            "output path '{}' is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir).map_err(|e| ContactError::io(dir, e))
}

/// Write every output of an extraction run into `dir`. Returns the files written.
pub fn write_outputs(table: &ContactTable, dir: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    ensure_output_dir(dir)?;
    let separator = config.export.csv_separator;
    let mut written = Vec::new();

    let path = dir.join(CONTACTS_JSON);
    json::save_table(table, &path)?;
    written.push(path);

    let path = dir.join(INTERACTIONS_JSON);
    json::save_interactions(&table.contacts, &path)?;
    written.push(path);

    let ordered = csv::export_order(&table.contacts);
    let path = dir.join(ALL_CSV);
    csv::export_contacts(&ordered, &path, separator)?;
    written.push(path);

    let targets: Vec<_> = ordered.into_iter().filter(|c| c.is_target()).collect();
    let path = dir.join(TARGET_CSV);
    csv::export_contacts(&targets, &path, separator)?;
    written.push(path);

    let rows = llm_summary::summary_rows(&table.contacts, &config.domains.personal);
    let path = dir.join(LLM_SUMMARY_CSV);
    csv::export_llm_summary(&rows, &path, separator)?;
    written.push(path);

    let summary = Summary::from_contacts(&table.contacts, &config.domains.personal);
    let path = dir.join(REPORT_TXT);
    report::write_report(table, &summary, &path)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "Wrote outputs");
    Ok(written)
}
