//! Credential pool and model preference list.
//!
//! Both are loaded once per process and shared read-only across requests.
//! A credential's identity is its position in the pool.

use std::fmt;
use std::sync::Arc;

/// Models tried in priority order when no list is configured.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.5-flash-lite",
    "gemini-2.5-flash",
    "gemini-flash-latest",
];

// ─────────────────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────────────────

/// An opaque upstream API key.
///
/// `Debug` and `Display` only ever show the masked form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: Arc<str>,
}

impl Credential {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    /// The raw secret, for building provider requests.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Masked form for logs and reports.
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Mask a secret as `first5...last3`, or `KEY` when it is too short to mask.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "KEY".to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", head, tail)
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential Pool
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, immutable pool of credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    credentials: Arc<[Credential]>,
}

impl CredentialPool {
    /// Build a pool from secrets, dropping blank entries.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Credential::new)
            .collect();
        Self {
            credentials: credentials.into(),
        }
    }

    /// Parse a comma-separated value such as `KEY_A, KEY_B,,KEY_C`.
    pub fn parse_delimited(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Number of credentials.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Returns true if no credential is usable.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Credential at `index`.
    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    /// The first credential, used for embeddings.
    pub fn first(&self) -> Option<&Credential> {
        self.credentials.first()
    }

    /// Iterate in pool order.
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model List
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, immutable list of candidate generation models.
#[derive(Debug, Clone)]
pub struct ModelList {
    models: Arc<[String]>,
}

impl ModelList {
    /// Build a list from model identifiers, dropping blanks.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| {
                let m: String = m.into();
                m.trim().to_string()
            })
            .filter(|m| !m.is_empty())
            .collect();
        Self {
            models: models.into(),
        }
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model at `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.models.get(index).map(String::as_str)
    }

    /// Iterate in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }
}

impl Default for ModelList {
    fn default() -> Self {
        Self::new(DEFAULT_MODELS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimited_trims_and_drops_empty() {
        let pool = CredentialPool::parse_delimited(" key-one , ,key-two,, ");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0).unwrap().expose(), "key-one");
        assert_eq!(pool.get(1).unwrap().expose(), "key-two");
        assert_eq!(pool.first().unwrap().expose(), "key-one");
    }

    #[test]
    fn test_parse_delimited_empty() {
        assert!(CredentialPool::parse_delimited("").is_empty());
        assert!(CredentialPool::parse_delimited(" , ,").is_empty());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("AIzaSyD-1234567xyz"), "AIzaS...xyz");
        assert_eq!(mask_secret("short"), "KEY");
        assert_eq!(mask_secret("12345678"), "KEY");
        assert_eq!(mask_secret("123456789"), "12345...789");
    }

    #[test]
    fn test_credential_debug_is_masked() {
        let cred = Credential::new("AIzaSyD-super-secret-value");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("AIzaS...lue"));
        assert_eq!(cred.to_string(), "AIzaS...lue");
    }

    #[test]
    fn test_default_models() {
        let models = ModelList::default();
        assert_eq!(models.len(), 3);
        assert_eq!(models.get(0), Some("gemini-2.5-flash-lite"));
        assert_eq!(models.get(2), Some("gemini-flash-latest"));
        assert_eq!(models.get(3), None);
    }

    #[test]
    fn test_model_list_drops_blanks() {
        let models = ModelList::new(vec!["a", " ", "b "]);
        assert_eq!(models.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
