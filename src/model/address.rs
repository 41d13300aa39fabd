//! Email address parsing (RFC 5322 §3.4).

/// An address as it appeared in a header: display name plus raw address.
///
/// Nothing here is normalized or validated; that is the classifier's job.
///
/// # Examples
/// - `"Alice Nguyen <alice@agency.gov.au>"` → `display_name = "Alice Nguyen"`, `address = "alice@agency.gov.au"`
/// - `"bob@example.com"` → `display_name = ""`, `address = "bob@example.com"`
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The address part, exactly as written.
    pub address: String,
}

impl EmailAddress {
    /// Build from already separated parts, cleaning up the display name.
    pub fn new(display_name: impl AsRef<str>, address: impl Into<String>) -> Self {
        let address = address.into();
        let display_name = clean_display_name(display_name.as_ref(), &address);
        Self {
            display_name,
            address,
        }
    }

    /// Parse a single address from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// Anything else is stored as the raw `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self::new(&trimmed[..open], trimmed[open + 1..close].trim());
            }
        }
        Self::new("", trimmed)
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas: `"Last, First" <a@b.com>, other@c.com`
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    push_parsed(&mut results, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        push_parsed(&mut results, &current);

        results
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

fn push_parsed(results: &mut Vec<EmailAddress>, segment: &str) {
    let addr = EmailAddress::parse(segment);
    if !addr.address.is_empty() {
        results.push(addr);
    }
}

/// Strip quotes and whitespace; a "name" that is just the address again counts as no name.
fn clean_display_name(raw: &str, address: &str) -> String {
    let mut name = raw.trim();
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        name = name[1..name.len() - 1].trim();
    }
    if name.len() >= 2 && name.starts_with('\'') && name.ends_with('\'') {
        name = name[1..name.len() - 1].trim();
    }
    if name.eq_ignore_ascii_case(address.trim()) || name.contains('@') {
        return String::new();
    }
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("user@example.com");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("Dr. Alice  Nguyen <alice@agency.gov.au>");
        assert_eq!(addr.address, "alice@agency.gov.au");
        assert_eq!(addr.display_name, "Dr. Alice Nguyen");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Last, First\" <user@example.com>");
        assert_eq!(addr.display_name, "Last, First");
    }

    #[test]
    fn test_name_repeating_address_is_dropped() {
        let addr = EmailAddress::parse("'alice@x.org' <alice@x.org>");
        assert_eq!(addr.display_name, "");
        let addr = EmailAddress::new("ALICE@X.ORG", "alice@x.org");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = EmailAddress::parse_list(
            "\"Smith, John\" <john@treasury.gov.au>, Jane <jane@finance.gov.au>, x@y.com",
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].display_name, "Smith, John");
        assert_eq!(list[1].address, "jane@finance.gov.au");
        assert_eq!(list[2].display_name, "");
    }

    #[test]
    fn test_parse_list_skips_empty_segments() {
        assert!(EmailAddress::parse_list(" , ").is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EmailAddress::new("Alice", "alice@example.com").display(),
            "Alice <alice@example.com>"
        );
        assert_eq!(EmailAddress::new("", "a@b.c").to_string(), "a@b.c");
    }
}
