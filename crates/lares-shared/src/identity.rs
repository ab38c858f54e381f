//! Identity-key helpers.
//!
//! Devices announce a MAC-like identity in two places: the probe payload and
//! the tail of the discovered service name (`shelly1pm-AABBCCDDEEFF`). Both
//! are normalized to uppercase hex without separators before use as a record
//! key, and the name-embedded form is honored even when a half-provisioned
//! device reports an empty identity over HTTP.

/// Normalize a MAC-like identity to its canonical record-key form.
///
/// Returns `None` for an empty input so callers never key records on "".
pub fn normalize_key(raw: &str) -> Option<String> {
    let key: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect::<String>()
        .to_uppercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Extract an identity key embedded in a discovered service name.
///
/// Newer firmware appends the full MAC after the last dash; older firmware
/// appends a short serial which is not usable as an identity key.
pub fn key_from_name(name: &str) -> Option<String> {
    let tail = name.rsplit('-').next()?;
    if tail.len() == 12 && tail.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(tail.to_uppercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(
            normalize_key("aa:bb:cc:dd:ee:ff").as_deref(),
            Some("AABBCCDDEEFF")
        );
        assert_eq!(normalize_key("test-mac").as_deref(), Some("TESTMAC"));
        assert_eq!(normalize_key(""), None);
    }

    #[test]
    fn test_key_from_name_with_mac() {
        assert_eq!(
            key_from_name("shelly1pm-AABBCCDDEEFF").as_deref(),
            Some("AABBCCDDEEFF")
        );
        assert_eq!(
            key_from_name("shellyplus2pm-aabbccddeeff").as_deref(),
            Some("AABBCCDDEEFF")
        );
    }

    #[test]
    fn test_key_from_name_short_serial() {
        // Older firmware announces a short serial, not a MAC.
        assert_eq!(key_from_name("shelly1pm-12345"), None);
        assert_eq!(key_from_name("no dashes here"), None);
    }
}
