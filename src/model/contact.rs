//! Aggregated contact records and their interaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which inference tier produced a contact's organization.
///
/// Ordered by precedence: signature tiers outrank the domain fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgSource {
    /// An organization line in the signature block.
    Signature,
    /// A capitalized phrase next to the person's name in the signature.
    NameAdjacent,
    /// A label derived from the email domain.
    Domain,
}

impl OrgSource {
    /// `true` for the tiers read from message text rather than the domain.
    pub fn is_signature(self) -> bool {
        matches!(self, Self::Signature | Self::NameAdjacent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::NameAdjacent => "name_adjacent",
            Self::Domain => "domain",
        }
    }
}

/// One touch of a contact: a single qualifying message sent to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub date: Option<DateTime<Utc>>,
    pub subject: String,
    /// Whitespace-collapsed excerpt of the most recent reply segment.
    pub excerpt: String,
}

/// A deduplicated external contact.
///
/// Identity is `email` (already normalized: lowercase, trimmed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,

    /// Longest non-empty display name seen so far.
    pub display_name: String,

    pub organization: Option<String>,

    /// Tier that produced `organization`; `None` when there is no organization.
    pub organization_source: Option<OrgSource>,

    pub domain: String,

    /// Target-domain patterns matched by `domain`, in configured order.
    pub category_tags: Vec<String>,

    pub interaction_count: u64,

    pub first_seen: Option<DateTime<Utc>>,

    pub last_seen: Option<DateTime<Utc>>,

    /// First `sample_cap` subjects, in arrival order.
    pub sample_subjects: Vec<String>,

    /// First `sample_cap` content samples, in arrival order.
    pub sample_snippets: Vec<String>,

    /// Every interaction, date ascending.
    pub interactions: Vec<InteractionRecord>,
}

impl Contact {
    /// `true` when the domain matched at least one target pattern.
    pub fn is_target(&self) -> bool {
        !self.category_tags.is_empty()
    }

    /// Read-only view of the interaction log.
    pub fn interactions(&self) -> &[InteractionRecord] {
        &self.interactions
    }

    /// Display name, or the address when no name was ever seen.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }

    /// Insert an interaction keeping the log date-ascending.
    ///
    /// Undated records sort first; equal dates keep arrival order.
    pub(crate) fn record_interaction(&mut self, record: InteractionRecord) {
        let pos = self
            .interactions
            .partition_point(|existing| existing.date <= record.date);
        self.interactions.insert(pos, record);
    }
}
