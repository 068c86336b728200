//! Email text helpers: address parsing, body decoding, reply trimming.
//!
//! Pure string handling, no I/O.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Gmail encodes bodies as base64url, sometimes without padding.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Split a header like `"Alice Smith" <alice@example.com>` into
/// `(display name, address)`.
///
/// Without angle brackets the trimmed header is used for both.
pub fn parse_address(raw: &str) -> (String, String) {
    let raw = raw.trim();
    match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let email = raw[open + 1..close].trim().to_string();
            let name = raw[..open].trim().trim_matches('"').trim().to_string();
            let name = if name.is_empty() { email.clone() } else { name };
            (name, email)
        }
        _ => (raw.to_string(), raw.to_string()),
    }
}

/// The address part of a header value.
pub fn address_of(raw: &str) -> String {
    parse_address(raw).1
}

/// Split a To/Cc header into individual entries.
///
/// Commas inside quoted display names (`"Smith, Alice" <a@x>`) do not split.
pub fn split_address_list(header: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in header.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                push_entry(&mut entries, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_entry(&mut entries, &current);
    entries
}

fn push_entry(entries: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        entries.push(trimmed.to_string());
    }
}

/// Decode a base64url body part into text. Invalid UTF-8 is replaced.
pub fn decode_body(data: &str) -> Option<String> {
    let bytes = BASE64URL.decode(data.trim()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Drop the quoted history from a reply, keeping only the new text.
///
/// Cuts at the first `On ... wrote:` attribution or `Original Message`
/// separator and skips `>`-prefixed lines before it.
pub fn trim_reply_history(body: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        let attribution = trimmed.starts_with("On ") && trimmed.ends_with("wrote:");
        let separator = trimmed.starts_with("---") && trimmed.contains("Original Message");
        if attribution || separator {
            break;
        }
        if !trimmed.starts_with('>') {
            kept.push(line);
        }
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    kept.join("\n")
}

/// First `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_address() {
        assert_eq!(
            parse_address("Alice Smith <alice@example.com>"),
            ("Alice Smith".to_string(), "alice@example.com".to_string())
        );
        assert_eq!(
            parse_address(r#""Smith, Alice" <alice@example.com>"#),
            ("Smith, Alice".to_string(), "alice@example.com".to_string())
        );
    }

    #[test]
    fn bare_address_falls_back_to_raw() {
        assert_eq!(address_of("  bob@example.com "), "bob@example.com");
        assert_eq!(address_of("<carol@example.com>"), "carol@example.com");
        assert_eq!(address_of("not an address"), "not an address");
    }

    #[test]
    fn splits_address_lists() {
        let list = split_address_list(
            r#"Alice <a@x.com>, "Smith, Bob" <b@x.com>,c@x.com, "#,
        );
        assert_eq!(
            list,
            vec!["Alice <a@x.com>", r#""Smith, Bob" <b@x.com>"#, "c@x.com"]
        );
        assert!(split_address_list("").is_empty());
    }

    #[test]
    fn decodes_unpadded_base64url() {
        // "Hello?>" in base64url without padding.
        assert_eq!(decode_body("SGVsbG8_Pg").as_deref(), Some("Hello?>"));
        assert_eq!(decode_body("SGVsbG8_Pg==").as_deref(), Some("Hello?>"));
        assert!(decode_body("***").is_none());
    }

    #[test]
    fn trims_reply_history() {
        let body = "Sounds good!\n> earlier\n\nOn Mon, Jan 1, 2026 at 10:00 AM Alice <a@x.com> wrote:\n> Original";
        assert_eq!(trim_reply_history(body), "Sounds good!");

        let body = "My reply\n\n--- Original Message ---\nOld stuff";
        assert_eq!(trim_reply_history(body), "My reply");

        assert_eq!(trim_reply_history("plain\ntext"), "plain\ntext");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("", 3), "");
    }
}
