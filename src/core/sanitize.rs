//! Text transforms applied to study descriptions
//!
//! Operators embed delivery instructions in the free-text study description,
//! e.g. `"Results for alice@example.com pw=secret42"`. These functions pull
//! the recipients and passphrase out, and produce the cleaned text used for
//! the rewritten description and the artifact file name.
//!
//! Extraction must run on the original text, before stripping.

use regex::Regex;
use std::sync::OnceLock;

/// Passphrase used when the description carries no `pw=` token
pub const DEFAULT_PASSPHRASE: &str = "default123";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("email pattern is valid"))
}

fn passphrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pw\s*=\s*(\S+)").expect("passphrase pattern is valid"))
}

/// Email-shaped substrings in order of first appearance, without duplicates
pub fn extract_recipients(text: &str) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    for found in email_regex().find_iter(text) {
        let address = found.as_str();
        if !recipients.iter().any(|r| r == address) {
            recipients.push(address.to_string());
        }
    }
    recipients
}

/// Value of the first `pw=<token>`, or `None` when absent
pub fn find_passphrase(text: &str) -> Option<String> {
    passphrase_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Value of the first `pw=<token>`, falling back to `default`
pub fn extract_passphrase(text: &str, default: &str) -> String {
    find_passphrase(text).unwrap_or_else(|| default.to_string())
}

/// Remove every recipient and `pw=` token, then trim surrounding whitespace
pub fn strip_sensitive_markers(text: &str) -> String {
    let without_emails = email_regex().replace_all(text, "");
    let without_passphrase = passphrase_regex().replace_all(&without_emails, "");
    without_passphrase.trim().to_string()
}

/// Map every character to a file-name safe alphabet
///
/// ASCII alphanumerics, `_`, `-` and `.` pass through; space and `^` (the
/// DICOM name component delimiter) become `_`; anything else becomes `-`.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' ' | '^' => '_',
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' => c,
            _ => '-',
        })
        .collect()
}
