//! `mboxcontacts`: extract deduplicated external contacts from sent mail.
//!
//! This crate provides the core library for streaming an MBOX archive (or a
//! directory of `.eml` files), classifying every recipient address, inferring
//! organizations, and folding the result into one contact per address with
//! a date-ordered interaction log.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod filter;
pub mod model;
pub mod organization;
pub mod parser;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use aggregate::{Aggregation, ContactAggregator};
use config::Config;
use error::Result;
use parser::{MessageDecoder, Source};

/// Stream every message at `path` through a fresh aggregator.
///
/// `on_progress(done, total)` is called after each record. Opening the
/// source is the only fatal failure; a source error mid-stream yields a
/// truncated but valid aggregation.
pub fn extract_contacts(
    path: &Path,
    config: &Config,
    on_progress: impl FnMut(u64, u64),
) -> Result<Aggregation> {
    extract_contacts_until(path, config, &AtomicBool::new(false), on_progress)
}

/// [`extract_contacts`] that also stops once `stop` is set.
///
/// The flag is checked after every record. An interrupted run finalizes
/// what was read so far and is marked truncated.
pub fn extract_contacts_until(
    path: &Path,
    config: &Config,
    stop: &AtomicBool,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<Aggregation> {
    let mut aggregator = ContactAggregator::new(config);
    let decoder = MessageDecoder::new(aggregator.classifier().clone(), &config.aggregation);
    let mut source = Source::open(path, decoder)?;

    while let Some(item) = source.next() {
        let keep_going = aggregator.accept(item);
        let (done, total) = source.progress();
        on_progress(done, total);
        if !keep_going {
            break;
        }
        if stop.load(Ordering::SeqCst) {
            warn!(offset = done, "Extraction interrupted; keeping partial results");
            aggregator.mark_truncated();
            break;
        }
    }

    Ok(aggregator.finalize())
}
