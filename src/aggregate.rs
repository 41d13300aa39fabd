//! Contact aggregation.
//!
//! Folds a stream of decoded messages into one [`Contact`] per external
//! recipient address. The aggregator is the sole owner of every contact and
//! interaction log until [`ContactAggregator::finalize`] hands them out.
//!
//! Merge rules for a repeated sighting of the same normalized address:
//! - `interaction_count` grows by one per qualifying message;
//! - `first_seen` / `last_seen` take the min / max date, whatever the arrival order;
//! - the longest non-empty display name wins (ties keep the earlier one);
//! - the first organization is kept, except that a signature-derived one
//!   replaces one that came only from the domain fallback;
//! - sample lists keep the first `sample_cap` entries, later ones are dropped.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{AddressClassifier, ClassifiedAddress};
use crate::config::{AggregationConfig, Config};
use crate::error::{ContactError, Result};
use crate::model::address::EmailAddress;
use crate::model::contact::{Contact, InteractionRecord};
use crate::model::message::Message;
use crate::organization::{OrgInference, OrgSubject, OrganizationInference};

/// Records that were dropped because they could not be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardTally {
    /// Sender or recipient addresses that failed classification.
    pub invalid_addresses: u64,
    /// Records the message source could not decode.
    pub malformed_messages: u64,
}

impl DiscardTally {
    pub fn total(&self) -> u64 {
        self.invalid_addresses + self.malformed_messages
    }
}

/// Counters describing what happened to each ingested message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Messages handed to `ingest`.
    pub messages_seen: u64,
    /// Sent messages with a valid sender that were processed.
    pub sent_messages: u64,
    /// Messages skipped because they were not sent from this mailbox.
    pub not_sent: u64,
    /// Messages skipped because their `Message-ID` was already ingested.
    pub duplicates: u64,
    /// Recipients skipped because they are internal.
    pub internal_recipients: u64,
    /// Contact updates (one per external recipient per message).
    pub contact_touches: u64,
}

/// The finished result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Contacts in first-sighting order.
    pub contacts: Vec<Contact>,
    pub discards: DiscardTally,
    pub stats: IngestStats,
    /// `true` when the message source stopped early (I/O fault, interrupt).
    pub truncated: bool,
}

/// Single-owner, single-pass contact aggregator.
pub struct ContactAggregator {
    classifier: AddressClassifier,
    organizations: OrganizationInference,
    settings: AggregationConfig,
    contacts: Vec<Contact>,
    index: HashMap<String, usize>,
    seen_message_ids: HashSet<String>,
    discards: DiscardTally,
    stats: IngestStats,
    truncated: bool,
}

impl ContactAggregator {
    /// Build an aggregator from a validated configuration.
    pub fn new(config: &Config) -> Self {
        let classifier = AddressClassifier::new(&config.domains);
        let organizations = OrganizationInference::new(&classifier, &config.organizations);
        Self::with_parts(classifier, organizations, config.aggregation.clone())
    }

    /// Build from explicit collaborators (custom strategy chains, tests).
    pub fn with_parts(
        classifier: AddressClassifier,
        organizations: OrganizationInference,
        settings: AggregationConfig,
    ) -> Self {
        Self {
            classifier,
            organizations,
            settings,
            contacts: Vec::new(),
            index: HashMap::new(),
            seen_message_ids: HashSet::new(),
            discards: DiscardTally::default(),
            stats: IngestStats::default(),
            truncated: false,
        }
    }

    pub fn classifier(&self) -> &AddressClassifier {
        &self.classifier
    }

    /// Number of distinct contacts so far.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn discards(&self) -> DiscardTally {
        self.discards
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Count a record the message source could not decode.
    pub fn record_malformed(&mut self, error: &ContactError) {
        warn!(error = %error, "Skipping malformed message");
        self.discards.malformed_messages += 1;
    }

    /// Mark the run as stopped before the source was exhausted.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    /// Feed one item from a message source.
    ///
    /// Returns `false` once the source has failed and the run must stop;
    /// the aggregation is then marked truncated.
    pub fn accept(&mut self, item: Result<Message>) -> bool {
        match item {
            Ok(message) => {
                self.ingest(&message);
                true
            }
            Err(e) if e.is_recoverable() => {
                self.record_malformed(&e);
                true
            }
            Err(e) => {
                warn!(error = %e, "Message source failed, stopping early");
                self.mark_truncated();
                false
            }
        }
    }

    /// Fold one message into the contact table.
    ///
    /// Never fails: unusable addresses are counted in the discard tally.
    pub fn ingest(&mut self, message: &Message) {
        self.stats.messages_seen += 1;

        if !message.is_sent() {
            self.stats.not_sent += 1;
            return;
        }

        if let Some(id) = message.message_id.as_deref() {
            if !self.seen_message_ids.insert(id.to_string()) {
                debug!(message_id = id, "Skipping already ingested message");
                self.stats.duplicates += 1;
                return;
            }
        }

        let sender = match self.classifier.classify(&message.sender.address) {
            Ok(sender) => sender,
            Err(e) => {
                debug!(offset = message.offset, error = %e, "Discarding message with invalid sender");
                self.discards.invalid_addresses += 1;
                return;
            }
        };
        self.stats.sent_messages += 1;

        let mut touched: HashSet<String> = HashSet::new();
        for recipient in &message.recipients {
            let classified = match self.classifier.classify(&recipient.address) {
                Ok(c) => c,
                Err(e) => {
                    debug!(offset = message.offset, error = %e, "Discarding invalid recipient");
                    self.discards.invalid_addresses += 1;
                    continue;
                }
            };
            if classified.is_internal {
                debug!(email = %classified.email, sender_internal = sender.is_internal, "Skipping internal recipient");
                self.stats.internal_recipients += 1;
                continue;
            }
            if !touched.insert(classified.email.clone()) {
                continue;
            }
            self.touch(message, recipient, classified);
        }
    }

    /// Hand out the contacts gathered so far. Safe to call at any point.
    pub fn finalize(self) -> Aggregation {
        debug!(
            contacts = self.contacts.len(),
            discarded = self.discards.total(),
            "Finalized contact aggregation"
        );
        Aggregation {
            contacts: self.contacts,
            discards: self.discards,
            stats: self.stats,
            truncated: self.truncated,
        }
    }

    fn touch(&mut self, message: &Message, recipient: &EmailAddress, address: ClassifiedAddress) {
        self.stats.contact_touches += 1;
        let org = self.organizations.infer(
            message,
            OrgSubject {
                display_name: &recipient.display_name,
                domain: &address.domain,
            },
        );
        let sample = excerpt(&message.body, self.settings.sample_chars);
        let record = InteractionRecord {
            date: message.date,
            subject: message.subject.clone(),
            excerpt: excerpt(&message.body, self.settings.snippet_chars),
        };
        let cap = self.settings.sample_cap.max(1);

        match self.index.get(&address.email) {
            Some(&idx) => {
                let contact = &mut self.contacts[idx];
                merge_sighting(contact, &recipient.display_name, org, message.date);
                push_bounded(&mut contact.sample_subjects, &message.subject, cap);
                push_bounded(&mut contact.sample_snippets, &sample, cap);
                contact.record_interaction(record);
            }
            None => {
                debug!(email = %address.email, "New contact");
                let (organization, organization_source) = match org {
                    Some(OrgInference { name, source }) => (Some(name), Some(source)),
                    None => (None, None),
                };
                let mut contact = Contact {
                    email: address.email.clone(),
                    display_name: recipient.display_name.trim().to_string(),
                    organization,
                    organization_source,
                    domain: address.domain,
                    category_tags: address.category_tags,
                    interaction_count: 1,
                    first_seen: message.date,
                    last_seen: message.date,
                    sample_subjects: Vec::new(),
                    sample_snippets: Vec::new(),
                    interactions: Vec::new(),
                };
                push_bounded(&mut contact.sample_subjects, &message.subject, cap);
                push_bounded(&mut contact.sample_snippets, &sample, cap);
                contact.record_interaction(record);
                self.index.insert(address.email, self.contacts.len());
                self.contacts.push(contact);
            }
        }
    }
}

/// Apply the merge rules for a repeated sighting.
fn merge_sighting(
    contact: &mut Contact,
    display_name: &str,
    org: Option<OrgInference>,
    date: Option<DateTime<Utc>>,
) {
    contact.interaction_count += 1;

    if let Some(date) = date {
        contact.first_seen = Some(contact.first_seen.map_or(date, |d| d.min(date)));
        contact.last_seen = Some(contact.last_seen.map_or(date, |d| d.max(date)));
    }

    let name = display_name.trim();
    if name.chars().count() > contact.display_name.chars().count() {
        contact.display_name = name.to_string();
    }

    if let Some(OrgInference { name, source }) = org {
        let replace = match contact.organization_source {
            None => true,
            Some(existing) => !existing.is_signature() && source.is_signature(),
        };
        if replace {
            contact.organization = Some(name);
            contact.organization_source = Some(source);
        }
    }
}

/// Append unless the list is full. Empty values are not recorded.
fn push_bounded(list: &mut Vec<String>, value: &str, cap: usize) {
    if list.len() < cap && !value.trim().is_empty() {
        list.push(value.to_string());
    }
}

/// Whitespace-collapsed prefix of the newest reply segment, at most `max_chars` long.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let segment = crate::organization::latest_reply_segment(body);
    let mut out = String::new();
    let mut len = 0;
    for word in segment.iter().flat_map(|l| l.split_whitespace()) {
        let word_len = word.chars().count();
        let needed = word_len + usize::from(len > 0);
        if len + needed > max_chars {
            if len == 0 {
                out.extend(word.chars().take(max_chars));
            }
            break;
        }
        if len > 0 {
            out.push(' ');
        }
        out.push_str(word);
        len += needed;
    }
    out
}
