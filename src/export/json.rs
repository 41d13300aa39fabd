//! JSON contact tables: the lossless form every later command reads back.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregation, DiscardTally, IngestStats};
use crate::error::{ContactError, Result};
use crate::model::contact::{Contact, InteractionRecord};

/// Current `contacts.json` layout version.
pub const TABLE_VERSION: u32 = 1;

/// Everything an extraction run produced, as written to `contacts.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTable {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    /// Archive the contacts were extracted from.
    #[serde(default)]
    pub source: Option<String>,
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub discards: DiscardTally,
    #[serde(default)]
    pub stats: IngestStats,
    #[serde(default)]
    pub truncated: bool,
}

impl ContactTable {
    pub fn from_aggregation(aggregation: Aggregation, source: Option<String>) -> Self {
        Self {
            version: TABLE_VERSION,
            generated_at: Utc::now(),
            source,
            contacts: aggregation.contacts,
            discards: aggregation.discards,
            stats: aggregation.stats,
            truncated: aggregation.truncated,
        }
    }

    /// Same run metadata, different contact list (after cleaning).
    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        Self {
            contacts,
            generated_at: Utc::now(),
            ..self
        }
    }
}

/// Write a table as pretty-printed JSON.
pub fn save_table(table: &ContactTable, path: &Path) -> Result<()> {
    write_json(path, table)
}

/// Read a table written by [`save_table`].
pub fn load_table(path: &Path) -> Result<ContactTable> {
    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ContactError::FileNotFound(path.to_path_buf())
        } else {
            ContactError::io(path, e)
        }
    })?;
    let table: ContactTable = serde_json::from_reader(BufReader::new(file))?;
    if table.version > TABLE_VERSION {
        return Err(ContactError::Export(format!(
            "{} has table version {}, newer than supported {TABLE_VERSION}",
            path.display(),
            table.version
        )));
    }
    Ok(table)
}

/// Write `email → interaction log` for every contact.
pub fn save_interactions(contacts: &[Contact], path: &Path) -> Result<()> {
    let map: BTreeMap<&str, &[InteractionRecord]> = contacts
        .iter()
        .map(|c| (c.email.as_str(), c.interactions()))
        .collect();
    write_json(path, &map)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| ContactError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| ContactError::io(path, e))
}
