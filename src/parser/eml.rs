//! Message source over `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ContactError, Result};
use crate::model::message::Message;
use crate::parser::mime::MessageDecoder;

/// Yields the messages of a single `.eml` file or of every `.eml` file in a
/// directory, in file-name order.
///
/// The record offset is the file's index in that order. An unreadable file
/// is yielded as an I/O error and ends the iteration.
pub struct EmlSource {
    files: std::vec::IntoIter<PathBuf>,
    decoder: MessageDecoder,
    index: u64,
    finished: bool,
}

impl EmlSource {
    pub fn open(path: impl AsRef<Path>, decoder: MessageDecoder) -> Result<Self> {
        let files = list_eml_files(path.as_ref())?;
        debug!(count = files.len(), path = %path.as_ref().display(), "Listed EML files");
        Ok(Self {
            files: files.into_iter(),
            decoder,
            index: 0,
            finished: false,
        })
    }

    /// Number of files not yet read.
    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl Iterator for EmlSource {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let path = self.files.next()?;
        let offset = self.index;
        self.index += 1;

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                self.finished = true;
                return Some(Err(ContactError::io(&path, e)));
            }
        };

        Some(self.decoder.decode(offset, &data).map_err(|e| match e {
            ContactError::MalformedMessage { offset, reason } => ContactError::MalformedMessage {
                offset,
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        }))
    }
}

/// `path` itself when it is a file, otherwise its `.eml` children sorted by name.
fn list_eml_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(ContactError::FileNotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|e| ContactError::io(path, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ContactError::io(path, e))?;
        let p = entry.path();
        let is_eml = p
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("eml"));
        if is_eml && p.is_file() {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::AddressClassifier;
    use crate::config::{AggregationConfig, DomainConfig};

    fn decoder() -> MessageDecoder {
        let classifier = AddressClassifier::new(&DomainConfig {
            internal: vec!["allfed.info".into()],
            ..DomainConfig::default()
        });
        MessageDecoder::new(classifier, &AggregationConfig::default())
    }

    #[test]
    fn test_reads_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.eml"),
            "From: me@allfed.info\nTo: b@example.com\nSubject: second\n\nbody\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.EML"),
            "From: me@allfed.info\nTo: a@example.com\nSubject: first\n\nbody\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = EmlSource::open(dir.path(), decoder()).unwrap();
        assert_eq!(source.remaining(), 2);
        let messages: Vec<Message> = source.collect::<Result<_>>().unwrap();
        assert_eq!(messages[0].subject, "first");
        assert_eq!(messages[1].subject, "second");
        assert_eq!(messages[1].offset, 1);
    }

    #[test]
    fn test_malformed_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.eml"), "Subject: no sender\n\nbody\n").unwrap();
        let mut source = EmlSource::open(dir.path(), decoder()).unwrap();
        let err = source.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("bad.eml"));
        assert!(source.next().is_none());
    }

    #[test]
    fn test_missing_path() {
        let err = EmlSource::open("/nonexistent/mail", decoder()).err().unwrap();
        assert!(matches!(err, ContactError::FileNotFound(_)));
    }
}
