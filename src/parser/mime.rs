//! MIME decoding: raw record → [`Message`], with HTML-to-text fallback for bodies.

use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser};
use tracing::{debug, trace};

use crate::classify::AddressClassifier;
use crate::config::AggregationConfig;
use crate::error::{ContactError, Result};
use crate::model::address::EmailAddress;
use crate::model::message::{Direction, Message};
use crate::parser::{date, header};

/// Turns raw RFC 5322 bytes into [`Message`] records.
///
/// Holds the classifier because direction detection needs to know which
/// sender domains are internal.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    classifier: AddressClassifier,
    sent_labels: Vec<String>,
    max_body_chars: usize,
}

impl MessageDecoder {
    pub fn new(classifier: AddressClassifier, settings: &AggregationConfig) -> Self {
        Self {
            classifier,
            sent_labels: settings
                .sent_labels
                .iter()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
            max_body_chars: settings.max_body_chars,
        }
    }

    /// Decode one record. `raw` may start with an MBOX `From ` separator.
    pub fn decode(&self, offset: u64, raw: &[u8]) -> Result<Message> {
        let (separator, message_bytes) = split_from_line(raw);
        let malformed = |reason: &str| ContactError::MalformedMessage {
            offset,
            reason: reason.to_string(),
        };

        let parsed = MessageParser::default()
            .parse(message_bytes)
            .ok_or_else(|| malformed("unparseable MIME structure"))?;

        let headers = header::raw_headers(message_bytes);

        // mail-parser drops address headers it cannot parse; fall back to the raw text.
        let sender = parsed
            .from()
            .and_then(|from| addresses(from).into_iter().next())
            .or_else(|| raw_addresses(&headers, "from").into_iter().next())
            .ok_or_else(|| malformed("missing From header"))?;

        let mut recipients = Vec::new();
        for (list, name) in [(parsed.to(), "to"), (parsed.cc(), "cc"), (parsed.bcc(), "bcc")] {
            match list {
                Some(list) => recipients.extend(addresses(list)),
                None => recipients.extend(raw_addresses(&headers, name)),
            }
        }

        let date = parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
            .or_else(|| header::get_header(&headers, "date").and_then(date::parse_date))
            .or_else(|| separator.and_then(date::separator_date));

        let body = parsed
            .body_text(0)
            .map(|s| s.into_owned())
            .or_else(|| parsed.body_html(0).map(|html| html_to_text(&html)))
            .unwrap_or_default();
        let body = truncate_chars(body, self.max_body_chars);

        let labels = header::gmail_labels(&headers);
        let direction = self.direction(&labels, &sender);

        trace!(offset, sender = %sender, ?direction, "Decoded message");

        Ok(Message {
            offset,
            message_id: parsed.message_id().map(|id| id.trim_matches(['<', '>']).to_string()),
            sender,
            recipients,
            date,
            subject: parsed.subject().unwrap_or_default().trim().to_string(),
            body,
            labels,
            direction,
        })
    }

    /// Sent when labelled as such, or when the sender's domain is internal.
    fn direction(&self, labels: &[String], sender: &EmailAddress) -> Direction {
        let labelled = labels
            .iter()
            .any(|l| self.sent_labels.contains(&l.to_lowercase()));
        if labelled {
            return Direction::Sent;
        }
        match self.classifier.classify(&sender.address) {
            Ok(classified) if classified.is_internal => Direction::Sent,
            Ok(_) => Direction::Received,
            Err(e) => {
                debug!(error = %e, "Sender not classifiable, treating as received");
                Direction::Received
            }
        }
    }
}

/// Flatten an address header, including group members.
fn addresses(list: &Address<'_>) -> Vec<EmailAddress> {
    let convert = |addr: &mail_parser::Addr<'_>| {
        let address = addr.address.as_deref().unwrap_or_default().trim();
        (!address.is_empty()).then(|| EmailAddress::new(addr.name.as_deref().unwrap_or_default(), address))
    };
    match list {
        Address::List(addrs) => addrs.iter().filter_map(convert).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .filter_map(convert)
            .collect(),
    }
}

/// Addresses of a raw header value, for headers mail-parser could not parse.
fn raw_addresses(headers: &[(String, String)], name: &str) -> Vec<EmailAddress> {
    header::get_header(headers, name)
        .map(EmailAddress::parse_list)
        .unwrap_or_default()
}

/// Split off the `From ` separator line at the start of MBOX records.
fn split_from_line(data: &[u8]) -> (Option<&str>, &[u8]) {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return (std::str::from_utf8(&data[..pos]).ok(), &data[pos + 1..]);
        }
    }
    (None, data)
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

/// Convert HTML to plain text.
///
/// - Preserves line breaks from `<br>`, `<p>`, `<div>`
/// - Converts `<li>` to a new line
/// - Removes scripts and styles
/// - Decodes common HTML entities
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    for tag in ["br", "BR", "br/", "br /"] {
        text = text.replace(&format!("<{tag}>"), "\n");
    }
    for tag in ["p", "div", "tr", "li", "h1", "h2", "h3", "h4"] {
        let upper = tag.to_uppercase();
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{tag} "), "\n<");
        text = text.replace(&format!("<{upper}>"), "\n");
        text = text.replace(&format!("</{tag}>"), "\n");
        text = text.replace(&format!("</{upper}>"), "\n");
    }

    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        ("&amp;", "&"),
    ] {
        result = result.replace(entity, replacement);
    }

    // At most one blank line in a row
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(result.len());
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut result = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(&open).map(|p| cursor + p) {
        result.push_str(&html[cursor..start]);
        match lower[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;

    fn decoder() -> MessageDecoder {
        let classifier = AddressClassifier::new(&DomainConfig {
            internal: vec!["allfed.info".into()],
            ..DomainConfig::default()
        });
        MessageDecoder::new(classifier, &AggregationConfig::default())
    }

    #[test]
    fn test_decodes_sent_message() {
        let raw = b"From me@allfed.info Thu Jan  4 10:00:00 2024\n\
From: Me <me@allfed.info>\n\
To: \"Nguyen, Alice\" <Alice@Agency.gov.au>, bob@example.com\n\
Cc: Carol <carol@uni.edu.au>\n\
Subject: Resilience briefing\n\
Message-ID: <abc123@allfed.info>\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\n\
\n\
Hello Alice\n";
        let msg = decoder().decode(7, raw).unwrap();
        assert_eq!(msg.offset, 7);
        assert_eq!(msg.sender.address, "me@allfed.info");
        assert_eq!(msg.recipients.len(), 3);
        assert_eq!(msg.recipients[0].display_name, "Nguyen, Alice");
        assert_eq!(msg.recipients[2].address, "carol@uni.edu.au");
        assert_eq!(msg.message_id.as_deref(), Some("abc123@allfed.info"));
        assert_eq!(msg.subject, "Resilience briefing");
        assert!(msg.body.contains("Hello Alice"));
        assert_eq!(msg.direction, Direction::Sent);
        assert_eq!(
            msg.date.unwrap().format("%Y-%m-%d").to_string(),
            "2024-01-04"
        );
    }

    #[test]
    fn test_gmail_sent_label_marks_direction() {
        let raw = b"From: Someone <someone@gmail.com>\n\
X-Gmail-Labels: Archived,Sent\n\
To: x@example.com\n\
Subject: hi\n\
\n\
body\n";
        let msg = decoder().decode(0, raw).unwrap();
        assert_eq!(msg.direction, Direction::Sent);
        assert_eq!(msg.labels, vec!["Archived", "Sent"]);
    }

    #[test]
    fn test_external_sender_is_received() {
        let raw = b"From: Alice <alice@agency.gov.au>\nTo: me@allfed.info\nSubject: re\n\nbody\n";
        let msg = decoder().decode(0, raw).unwrap();
        assert_eq!(msg.direction, Direction::Received);
    }

    #[test]
    fn test_missing_from_is_malformed() {
        let raw = b"To: x@example.com\nSubject: orphan\n\nbody\n";
        let err = decoder().decode(42, raw).unwrap_err();
        assert!(matches!(err, ContactError::MalformedMessage { offset: 42, .. }));
    }

    #[test]
    fn test_separator_date_fallback() {
        let raw = b"From me@allfed.info Thu Jan  4 10:00:00 2024\nFrom: me@allfed.info\nTo: a@b.com\n\nbody\n";
        let msg = decoder().decode(0, raw).unwrap();
        assert_eq!(
            msg.date.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-01-04 10:00"
        );
    }

    #[test]
    fn test_body_truncated_to_limit() {
        let classifier = AddressClassifier::new(&DomainConfig::default());
        let settings = AggregationConfig {
            max_body_chars: 5,
            ..AggregationConfig::default()
        };
        let raw = "From: me@x.org\nTo: a@b.com\n\nhéllo world\n".as_bytes();
        let msg = MessageDecoder::new(classifier, &settings).decode(0, raw).unwrap();
        assert_eq!(msg.body, "héllo");
    }

    #[test]
    fn test_split_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        let (line, rest) = split_from_line(data);
        assert!(line.unwrap().starts_with("From user@"));
        assert!(rest.starts_with(b"Subject:"));
        let (line, rest) = split_from_line(b"Subject: Test\n");
        assert!(line.is_none());
        assert_eq!(rest, b"Subject: Test\n");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>Hello <b>world</b></p><p>Tom &amp; Jerry &lt;3&gt;</p>";
        let text = html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(text.contains("Tom & Jerry <3>"));
        assert_eq!(html_to_text("Before<SCRIPT>alert(1)</script>After"), "BeforeAfter");
    }
}
