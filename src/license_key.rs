//! License key generation and format checks.
//!
//! Keys have the form `PREFIX-XXXX-XXXX-XXXX-XXXX`, where each `XXXX`
//! segment is two bytes from the operating system's CSPRNG rendered as
//! uppercase hex.
//!
//! # Example
//!
//! ```rust
//! use eclipse::license_key::{generate_license_key, validate_license_key_format};
//!
//! let key = generate_license_key("ECL");
//! assert!(key.starts_with("ECL-"));
//! assert!(validate_license_key_format(&key));
//! ```

use std::sync::OnceLock;

use rand::RngCore;
use regex::Regex;

/// Number of random segments after the prefix.
pub const KEY_SEGMENTS: usize = 4;

/// Random bytes drawn per segment (rendered as 4 hex characters).
pub const SEGMENT_BYTES: usize = 2;

/// Longest prefix accepted for generated keys.
pub const MAX_PREFIX_LEN: usize = 16;

/// Source of candidate license keys.
///
/// Implementations must be stateless with respect to the license store: the
/// engine, not the generator, rejects keys that are already taken.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, prefix: &str) -> String;
}

/// Default generator backed by the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeyGenerator;

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self, prefix: &str) -> String {
        generate_license_key(prefix)
    }
}

/// Generate a single segment of uppercase hex characters.
fn generate_segment() -> String {
    let mut bytes = [0u8; SEGMENT_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Generate a license key with the given prefix.
pub fn generate_license_key(prefix: &str) -> String {
    let segments: Vec<String> = (0..KEY_SEGMENTS).map(|_| generate_segment()).collect();

    format!("{}-{}", prefix, segments.join("-"))
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]{1,16}(-[0-9A-F]{4}){4}$").expect("license key pattern is valid")
    })
}

/// Whether `prefix` can head a generated key: 1-16 ASCII alphanumerics.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate that a license key matches `PREFIX-XXXX-XXXX-XXXX-XXXX`.
pub fn validate_license_key_format(key: &str) -> bool {
    key_pattern().is_match(key)
}

/// Split a well-formed key into its prefix and segments.
///
/// Returns `None` if the key does not match the generated format.
pub fn parse_license_key(key: &str) -> Option<(String, Vec<String>)> {
    if !validate_license_key_format(key) {
        return None;
    }

    let mut parts = key.split('-');
    let prefix = parts.next()?.to_string();
    let segments: Vec<String> = parts.map(str::to_string).collect();

    Some((prefix, segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_has_correct_format() {
        let key = generate_license_key("ECL");

        assert!(key.starts_with("ECL-"));

        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5); // prefix + 4 segments

        for segment in &parts[1..] {
            assert_eq!(segment.len(), 4);
            assert!(segment
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn generated_keys_pass_format_check() {
        for _ in 0..100 {
            let key = RandomKeyGenerator.generate("PRO");
            assert!(validate_license_key_format(&key), "bad key: {key}");
        }
    }

    #[test]
    fn validate_format_rejects_malformed_keys() {
        assert!(!validate_license_key_format("ECL-AB12-CD34-EF56")); // too few
        assert!(!validate_license_key_format("ECL-AB12-CD34-EF56-0789-AAAA")); // too many
        assert!(!validate_license_key_format("ECL-ab12-CD34-EF56-0789")); // lowercase hex
        assert!(!validate_license_key_format("ECL-AG12-CD34-EF56-0789")); // not hex
        assert!(!validate_license_key_format("-AB12-CD34-EF56-0789")); // no prefix
        assert!(!validate_license_key_format(""));
    }

    #[test]
    fn prefix_rules() {
        assert!(is_valid_prefix("ECL"));
        assert!(is_valid_prefix("pro2"));
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("EC-L"));
        assert!(!is_valid_prefix(&"A".repeat(MAX_PREFIX_LEN + 1)));
    }

    #[test]
    fn parse_key_extracts_components() {
        let (prefix, segments) = parse_license_key("ECL-AB12-CD34-EF56-0789").unwrap();
        assert_eq!(prefix, "ECL");
        assert_eq!(segments, vec!["AB12", "CD34", "EF56", "0789"]);
    }

    #[test]
    fn parse_key_returns_none_for_invalid() {
        assert!(parse_license_key("INVALID").is_none());
        assert!(parse_license_key("").is_none());
    }

    #[test]
    fn generated_keys_are_unique() {
        let mut keys = std::collections::HashSet::new();

        // 64 bits of entropy per key; 1000 draws should never collide.
        for _ in 0..1000 {
            let key = generate_license_key("ECL");
            assert!(keys.insert(key.clone()), "Duplicate key generated: {}", key);
        }
    }
}
