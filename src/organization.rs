//! Organization inference.
//!
//! Best-effort and infallible: an ordered chain of extraction strategies is
//! tried until one returns a name. Only the most recent reply segment of a
//! body is ever scanned, so a quoted signature is never attributed to the
//! wrong person.
//!
//! Precedence:
//! 1. [`SignatureOrgLine`]: an organization line in the signature block.
//! 2. [`NameAdjacentPhrase`]: a capitalized phrase next to the person's name.
//! 3. [`DomainLabel`]: a readable label derived from the email domain.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::classify::AddressClassifier;
use crate::config::OrganizationConfig;
use crate::model::contact::OrgSource;
use crate::model::message::Message;

/// Signature blocks longer than this are cut from the top.
const MAX_SIGNATURE_LINES: usize = 10;

/// Without a sign-off, this many trailing lines are treated as the signature.
const TRAILING_SIGNATURE_LINES: usize = 6;

/// Lines longer than this are prose, not signature.
const MAX_SIGNATURE_LINE_CHARS: usize = 80;

static SIGN_OFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((kind|warm|best|many|with|all the)\s+)*(regards|wishes|thanks|thank you|cheers|sincerely|best|yours sincerely|yours truly|yours faithfully)[\s,.!]*$",
    )
    .expect("valid sign-off regex")
});

static WROTE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^on\s.+\bwrote:\s*$").expect("valid wrote regex"));

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(-{2,}\s*(original message|forwarded message)\s*-{2,}|_{10,})")
        .expect("valid separator regex")
});

static ORG_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(department|dept|ministry|office|agency|commission|university|institute|foundation|council|bureau|authority|centre|center|college|school|association|society|organisation|organization|government|committee|trust|alliance|ltd|pty|inc|llc|corporation|company|laboratory|network)\b",
    )
    .expect("valid organization keyword regex")
});

static TITLE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(director|manager|officer|researcher|professor|lecturer|adviser|advisor|analyst|engineer|assistant|secretary|head|lead|coordinator|executive|president|ceo|cto|coo|chair|fellow|scientist|consultant|specialist|minister|associate|student|candidate)\b",
    )
    .expect("valid title keyword regex")
});

/// The person an organization is being inferred for.
#[derive(Debug, Clone, Copy)]
pub struct OrgSubject<'a> {
    pub display_name: &'a str,
    pub domain: &'a str,
}

/// A successful inference and the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgInference {
    pub name: String,
    pub source: OrgSource,
}

/// Text views shared by all strategies for one inference call.
pub struct InferenceInput<'a> {
    /// Lines of the most recent reply segment.
    pub segment: Vec<&'a str>,
    /// Trimmed, non-empty, short lines of the signature block.
    pub signature: Vec<&'a str>,
    pub subject: OrgSubject<'a>,
    /// Squashed internal organization labels (`allfed`, `example`).
    pub internal_labels: &'a [String],
}

impl InferenceInput<'_> {
    /// Whether a candidate names one of our own organizations.
    ///
    /// Signature strategies skip such candidates and keep scanning.
    pub fn is_internal(&self, name: &str) -> bool {
        let squashed: String = name
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        self.internal_labels
            .iter()
            .any(|label| squashed.contains(label.as_str()))
    }
}

/// One extraction tier. Pure: no state changes between calls.
pub trait OrgStrategy: Send + Sync {
    fn source(&self) -> OrgSource;
    fn extract(&self, input: &InferenceInput<'_>) -> Option<String>;
}

/// The ordered strategy chain.
pub struct OrganizationInference {
    strategies: Vec<Box<dyn OrgStrategy>>,
    /// Internal organization labels; signature candidates containing one are ignored.
    internal_labels: Vec<String>,
}

impl OrganizationInference {
    /// The standard three-tier chain.
    pub fn new(classifier: &AddressClassifier, orgs: &OrganizationConfig) -> Self {
        Self::with_strategies(
            classifier,
            vec![
                Box::new(SignatureOrgLine),
                Box::new(NameAdjacentPhrase),
                Box::new(DomainLabel::new(classifier.clone(), orgs.aliases.clone())),
            ],
        )
    }

    /// A custom chain, tried in the given order.
    pub fn with_strategies(
        classifier: &AddressClassifier,
        strategies: Vec<Box<dyn OrgStrategy>>,
    ) -> Self {
        let mut internal_labels: Vec<String> =
            classifier.internal_labels().map(str::to_string).collect();
        internal_labels.dedup();
        Self {
            strategies,
            internal_labels,
        }
    }

    /// Infer the organization of `subject` from `message`.
    pub fn infer(&self, message: &Message, subject: OrgSubject<'_>) -> Option<OrgInference> {
        let input = prepare_input(&message.body, subject, &self.internal_labels);
        for strategy in &self.strategies {
            let Some(name) = strategy.extract(&input) else {
                continue;
            };
            let source = strategy.source();
            // Custom strategies may not filter their own candidates.
            if source.is_signature() && input.is_internal(&name) {
                debug!(candidate = %name, "Ignoring internal organization in signature");
                continue;
            }
            debug!(organization = %name, source = source.as_str(), "Inferred organization");
            return Some(OrgInference { name, source });
        }
        None
    }

}

fn prepare_input<'a>(
    body: &'a str,
    subject: OrgSubject<'a>,
    internal_labels: &'a [String],
) -> InferenceInput<'a> {
    let segment = latest_reply_segment(body);
    let signature = signature_block(&segment);
    InferenceInput {
        segment,
        signature,
        subject,
        internal_labels,
    }
}

/// Lines of the newest part of a body, stopping at the first quote marker.
///
/// Markers: a line starting with `>`, an `On <date>, <name> wrote:` header
/// (possibly wrapped over two lines), an Outlook `From:`/`Sent:` block, and
/// original/forwarded-message separators.
pub fn latest_reply_segment(body: &str) -> Vec<&str> {
    let lines: Vec<&str> = body.lines().collect();
    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let next = lines.get(i + 1).map(|l| l.trim()).unwrap_or("");
        let is_marker = trimmed.starts_with('>')
            || WROTE_HEADER.is_match(trimmed)
            || (trimmed.starts_with("On ") && next.ends_with("wrote:"))
            || SEPARATOR.is_match(trimmed)
            || (trimmed.starts_with("From:")
                && (next.starts_with("Sent:") || next.starts_with("Date:")));
        if is_marker {
            end = i;
            break;
        }
    }
    lines[..end].to_vec()
}

/// The signature block: lines after the last sign-off or `--` delimiter,
/// else the last few non-empty lines.
pub fn signature_block<'a>(segment: &[&'a str]) -> Vec<&'a str> {
    let start = segment
        .iter()
        .rposition(|l| {
            let t = l.trim();
            t == "--" || SIGN_OFF.is_match(t)
        })
        .map(|i| i + 1);

    let candidates: Vec<&str> = match start {
        Some(i) => segment[i..].iter().map(|l| l.trim()).collect(),
        None => {
            let non_empty: Vec<&str> = segment
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect();
            let skip = non_empty.len().saturating_sub(TRAILING_SIGNATURE_LINES);
            non_empty[skip..].to_vec()
        }
    };

    candidates
        .into_iter()
        .filter(|l| !l.is_empty() && l.chars().count() <= MAX_SIGNATURE_LINE_CHARS)
        .take(MAX_SIGNATURE_LINES)
        .collect()
}

// ── Strategies ──────────────────────────────────────────────────

/// An explicit organization line (keyword match) in the signature block.
pub struct SignatureOrgLine;

impl OrgStrategy for SignatureOrgLine {
    fn source(&self) -> OrgSource {
        OrgSource::Signature
    }

    fn extract(&self, input: &InferenceInput<'_>) -> Option<String> {
        input.signature.iter().find_map(|line| {
            // "Senior Analyst, Department of Finance" → pick the organization part
            line.split([',', '|'])
                .map(clean_candidate)
                .find(|part| {
                    ORG_KEYWORD.is_match(part)
                        && is_plausible_org(part)
                        && !input.is_internal(part)
                })
                .map(str::to_string)
        })
    }
}

/// A capitalized phrase on or right after the line holding the person's name.
pub struct NameAdjacentPhrase;

impl OrgStrategy for NameAdjacentPhrase {
    fn source(&self) -> OrgSource {
        OrgSource::NameAdjacent
    }

    fn extract(&self, input: &InferenceInput<'_>) -> Option<String> {
        let name = input.subject.display_name.trim();
        if name.chars().count() < 2 {
            return None;
        }
        let name_lower = name.to_lowercase();
        let idx = input
            .signature
            .iter()
            .position(|l| l.to_lowercase().contains(&name_lower))?;

        // Same line: "Jane Smith | Bureau Of Meteorology"
        let line = input.signature[idx];
        let rest = line
            .to_lowercase()
            .find(&name_lower)
            .and_then(|pos| line.get(pos + name_lower.len()..));
        if let Some(rest) = rest {
            let rest = rest.trim_start_matches(|c: char| {
                c.is_whitespace() || matches!(c, ',' | '|' | '-' | '–' | '/')
            });
            for part in rest.split([',', '|']) {
                let part = clean_candidate(part);
                if is_capitalized_phrase(part)
                    && !TITLE_KEYWORD.is_match(part)
                    && !input.is_internal(part)
                {
                    return Some(part.to_string());
                }
            }
        }

        input
            .signature
            .iter()
            .skip(idx + 1)
            .take(3)
            .map(|l| clean_candidate(l))
            .filter(|l| !TITLE_KEYWORD.is_match(l) && !input.is_internal(l))
            .find(|l| is_capitalized_phrase(l))
            .map(str::to_string)
    }
}

/// Readable label derived from the domain (`treasury.gov.au` → alias or `Treasury`).
///
/// Yields nothing for personal webmail domains.
pub struct DomainLabel {
    classifier: AddressClassifier,
    aliases: BTreeMap<String, String>,
}

impl DomainLabel {
    pub fn new(classifier: AddressClassifier, aliases: BTreeMap<String, String>) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            classifier,
            aliases,
        }
    }
}

impl OrgStrategy for DomainLabel {
    fn source(&self) -> OrgSource {
        OrgSource::Domain
    }

    fn extract(&self, input: &InferenceInput<'_>) -> Option<String> {
        let domain = input.subject.domain.trim().to_lowercase();
        if domain.is_empty() || self.classifier.is_personal_domain(&domain) {
            return None;
        }
        let label = organization_label(&domain)?;
        if let Some(alias) = self.aliases.get(label) {
            return Some(alias.clone());
        }
        let titled = title_case(label);
        (!titled.is_empty()).then_some(titled)
    }
}

/// The most specific non-generic label of a domain.
///
/// Trailing TLD-like segments (`com`, `gov`, `edu`, two-letter country codes…)
/// are stripped; at least one label is always kept.
pub fn organization_label(domain: &str) -> Option<&str> {
    const GENERIC: &[&str] = &[
        "com", "org", "net", "edu", "gov", "mil", "int", "info", "biz", "io", "asn", "ac", "co",
        "id", "nsw", "vic", "qld", "sa", "wa", "tas", "act", "nt",
    ];
    let mut labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    while labels.len() > 1 {
        let last = labels[labels.len() - 1];
        if GENERIC.contains(&last) || last.len() == 2 {
            labels.pop();
        } else {
            break;
        }
    }
    labels.last().copied()
}

fn title_case(label: &str) -> String {
    label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_candidate(s: &str) -> &str {
    s.trim()
        .trim_matches(|c: char| matches!(c, ',' | ';' | '|' | '-' | '–' | '*' | '_'))
        .trim()
}

fn is_plausible_org(s: &str) -> bool {
    let len = s.chars().count();
    if !(3..=MAX_SIGNATURE_LINE_CHARS).contains(&len) {
        return false;
    }
    let lower = s.to_lowercase();
    if s.contains('@') || lower.contains("http") || lower.contains("www.") {
        return false;
    }
    let digits = s.chars().filter(char::is_ascii_digit).count();
    digits * 10 <= len * 3
}

fn is_capitalized_phrase(s: &str) -> bool {
    const CONNECTORS: &[&str] = &["of", "and", "for", "the", "&", "de", "du", "la", "in", "on"];
    if !is_plausible_org(s) || s.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.is_empty() || words.len() > 8 {
        return false;
    }
    words.iter().all(|w| {
        CONNECTORS.contains(&w.to_lowercase().as_str())
            || w.chars().next().is_some_and(|c| c.is_uppercase())
    }) && words[0].chars().next().is_some_and(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;

    fn classifier() -> AddressClassifier {
        AddressClassifier::new(&DomainConfig {
            internal: vec!["allfed.info".into()],
            target_patterns: vec![".gov.au".into()],
            personal: vec!["gmail.com".into()],
        })
    }

    fn inference() -> OrganizationInference {
        OrganizationInference::new(&classifier(), &OrganizationConfig::default())
    }

    fn msg(body: &str) -> Message {
        Message::sent("me@allfed.info", "x@agency.gov.au", None, "s", body)
    }

    fn subject<'a>(name: &'a str, domain: &'a str) -> OrgSubject<'a> {
        OrgSubject {
            display_name: name,
            domain,
        }
    }

    #[test]
    fn test_latest_segment_stops_at_quote_markers() {
        let body = "Thanks Jane.\n\nOn Mon, 1 Jan 2024 at 10:00, Jane <j@x.gov.au> wrote:\n> Hi\n";
        assert_eq!(latest_reply_segment(body), vec!["Thanks Jane.", ""]);

        let body = "Short note\n> quoted\nmore";
        assert_eq!(latest_reply_segment(body), vec!["Short note"]);

        let body = "Hi\nOn Tue, 2 Jan 2024, Jane Smith\n<jane@x.gov.au> wrote:\nold";
        assert_eq!(latest_reply_segment(body), vec!["Hi"]);

        let body = "See below\n-----Original Message-----\nFrom: a";
        assert_eq!(latest_reply_segment(body), vec!["See below"]);

        let body = "FYI\nFrom: Jane Smith\nSent: Monday\nOld text";
        assert_eq!(latest_reply_segment(body), vec!["FYI"]);
    }

    #[test]
    fn test_signature_block_after_sign_off() {
        let segment = vec!["Body text here.", "", "Kind regards,", "Jane Smith", "Policy Officer"];
        assert_eq!(signature_block(&segment), vec!["Jane Smith", "Policy Officer"]);
    }

    #[test]
    fn test_signature_block_without_sign_off_uses_tail() {
        let segment: Vec<&str> = (0..10).map(|_| "line").collect();
        assert_eq!(signature_block(&segment).len(), TRAILING_SIGNATURE_LINES);
    }

    #[test]
    fn test_signature_org_line_wins() {
        let body = "Please see attached.\n\nRegards,\nJane Smith\nSenior Analyst, Department of Finance\n";
        let got = inference()
            .infer(&msg(body), subject("Jane Smith", "finance.gov.au"))
            .unwrap();
        assert_eq!(got.name, "Department of Finance");
        assert_eq!(got.source, OrgSource::Signature);
    }

    #[test]
    fn test_quoted_signature_is_ignored() {
        let body = "Sounds good.\n\nOn Mon, 1 Jan 2024, Jane wrote:\n> Regards,\n> Jane\n> Bureau of Meteorology\n";
        let got = inference()
            .infer(&msg(body), subject("Jane", "bom.gov.au"))
            .unwrap();
        assert_eq!(got.source, OrgSource::Domain);
        assert_eq!(got.name, "Bom");
    }

    #[test]
    fn test_name_adjacent_phrase() {
        let body = "Great to meet you.\n\nCheers,\nProf Tom Wilson\nResearch Fellow\nAustralian National Univ\n";
        let got = inference()
            .infer(&msg(body), subject("Tom Wilson", "anu.edu.au"))
            .unwrap();
        assert_eq!(got.source, OrgSource::NameAdjacent);
        assert_eq!(got.name, "Australian National Univ");
    }

    #[test]
    fn test_name_adjacent_same_line() {
        let body = "Thanks\n--\nJane Smith | Snowy Hydro\n";
        let got = inference()
            .infer(&msg(body), subject("Jane Smith", "snowyhydro.com.au"))
            .unwrap();
        assert_eq!(got.name, "Snowy Hydro");
        assert_eq!(got.source, OrgSource::NameAdjacent);
    }

    #[test]
    fn test_internal_signature_is_not_attributed() {
        let body = "Hi Jane\n\nBest regards,\nYour Name\nAllfed Research Alliance\n";
        let got = inference()
            .infer(&msg(body), subject("Jane", "treasury.gov.au"))
            .unwrap();
        assert_eq!(got.source, OrgSource::Domain);
        assert_eq!(got.name, "Department of Treasury");
    }

    #[test]
    fn test_internal_signature_line_is_skipped_not_fatal() {
        let body = "Regards,\nJane Smith\nAllfed Research Alliance\nBureau of Meteorology\n";
        let got = inference()
            .infer(&msg(body), subject("Jane Smith", "bom.gov.au"))
            .unwrap();
        assert_eq!(got.name, "Bureau of Meteorology");
        assert_eq!(got.source, OrgSource::Signature);
    }

    #[test]
    fn test_name_adjacent_skips_internal_phrase() {
        let body = "Thanks,\nJane Smith\nAllfed Volunteers\nSnowy Hydro\n";
        let got = inference()
            .infer(&msg(body), subject("Jane Smith", "snowyhydro.com.au"))
            .unwrap();
        assert_eq!(got.name, "Snowy Hydro");
        assert_eq!(got.source, OrgSource::NameAdjacent);
    }

    #[test]
    fn test_domain_fallback_and_personal_domains() {
        let inf = inference();
        let got = inf.infer(&msg(""), subject("", "mail.snowy-hydro.com.au")).unwrap();
        assert_eq!(got.name, "Snowy Hydro");
        assert!(inf.infer(&msg(""), subject("", "gmail.com")).is_none());
    }

    #[test]
    fn test_organization_label() {
        assert_eq!(organization_label("agency.gov.au"), Some("agency"));
        assert_eq!(organization_label("csiro.au"), Some("csiro"));
        assert_eq!(organization_label("anu.edu.au"), Some("anu"));
        assert_eq!(organization_label("example.com"), Some("example"));
        assert_eq!(organization_label("gov.au"), Some("gov"));
    }

    #[test]
    fn test_capitalized_phrase() {
        assert!(is_capitalized_phrase("Bureau of Meteorology"));
        assert!(!is_capitalized_phrase("call me tomorrow"));
        assert!(!is_capitalized_phrase("Ph 02 6123 4567"));
    }
}
