//! Message sources: MBOX streaming reader, EML files, MIME decoding, and header helpers.

pub mod date;
pub mod eml;
pub mod header;
pub mod mbox;
pub mod mime;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{ContactError, Result};
use crate::model::message::Message;

pub use eml::EmlSource;
pub use mbox::{MboxReader, MboxSource};
pub use mime::MessageDecoder;

/// Any supported message source, chosen from the input path.
pub enum Source {
    Mbox {
        inner: MboxSource<BufReader<File>>,
        file_size: u64,
    },
    Eml {
        inner: EmlSource,
        total: u64,
    },
}

impl Source {
    /// A directory or `*.eml` file opens as EML, anything else as MBOX.
    pub fn open(path: &Path, decoder: MessageDecoder) -> Result<Self> {
        if !path.exists() {
            return Err(ContactError::FileNotFound(path.to_path_buf()));
        }
        if is_eml_path(path) {
            let inner = EmlSource::open(path, decoder)?;
            let total = inner.remaining() as u64;
            Ok(Self::Eml { inner, total })
        } else {
            let file_size = std::fs::metadata(path)
                .map_err(|e| ContactError::io(path, e))?
                .len();
            Ok(Self::Mbox {
                inner: MboxSource::open(path, decoder)?,
                file_size,
            })
        }
    }

    /// `(done, total)` in bytes for MBOX, in files for EML.
    pub fn progress(&self) -> (u64, u64) {
        match self {
            Self::Mbox { inner, file_size } => (inner.position(), *file_size),
            Self::Eml { inner, total } => (total - inner.remaining() as u64, *total),
        }
    }
}

/// `true` for a directory or a file with an `.eml` extension.
pub fn is_eml_path(path: &Path) -> bool {
    path.is_dir()
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

impl Iterator for Source {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Mbox { inner, .. } => inner.next(),
            Self::Eml { inner, .. } => inner.next(),
        }
    }
}
