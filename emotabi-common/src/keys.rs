//! API key format checks
//!
//! These checks never call the remote service; they only catch keys that are
//! obviously truncated or pasted into the wrong variable. Key material must
//! never be logged, only its length.

/// Key presence/format status used by startup diagnostics and `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// No key configured
    Missing,
    /// Key present but does not look like a key for this provider
    Malformed { len: usize },
    /// Key present and well-formed
    Configured { len: usize },
}

impl KeyStatus {
    pub fn is_configured(&self) -> bool {
        matches!(self, KeyStatus::Configured { .. })
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, KeyStatus::Missing)
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Google Maps Platform keys start with `AIza` and are at least 30 chars
pub fn google_maps_key_status(key: Option<&str>) -> KeyStatus {
    classify(key, |k| k.len() >= 30 && k.starts_with("AIza"))
}

/// OpenAI keys start with `sk-` and are at least 20 chars
pub fn openai_key_status(key: Option<&str>) -> KeyStatus {
    classify(key, |k| k.len() >= 20 && k.starts_with("sk-"))
}

fn classify(key: Option<&str>, well_formed: impl Fn(&str) -> bool) -> KeyStatus {
    match key.map(str::trim) {
        Some(k) if is_valid_key(k) => {
            if well_formed(k) {
                KeyStatus::Configured { len: k.len() }
            } else {
                KeyStatus::Malformed { len: k.len() }
            }
        }
        _ => KeyStatus::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_key_status() {
        assert_eq!(google_maps_key_status(None), KeyStatus::Missing);
        assert_eq!(google_maps_key_status(Some("   ")), KeyStatus::Missing);
        assert_eq!(
            google_maps_key_status(Some("short")),
            KeyStatus::Malformed { len: 5 }
        );
        let key = format!("AIza{}", "x".repeat(35));
        assert_eq!(
            google_maps_key_status(Some(&key)),
            KeyStatus::Configured { len: 39 }
        );
    }

    #[test]
    fn test_openai_key_status() {
        assert!(!openai_key_status(Some("not-a-key-at-all-really")).is_configured());
        assert!(openai_key_status(Some("sk-0123456789abcdefghij")).is_configured());
        assert!(openai_key_status(Some("sk-short")).is_present());
    }
}
