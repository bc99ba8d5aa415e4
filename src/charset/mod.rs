//! Charset labels to byte decoders.
use std::collections::HashMap;
use std::sync::Arc;

use encoding_rs::Encoding;
use once_cell::sync::Lazy;

use crate::errors::ContentError;

/// Registry shared by every resolver that does not bring its own.
pub static DEFAULT_CHARSETS: Lazy<Arc<CharsetRegistry>> =
    Lazy::new(|| Arc::new(CharsetRegistry::with_defaults()));

// An absent charset parameter reads as UTF-8; WHATWG has no label for it.
const UNLABELLED: &str = "";

#[derive(Debug, Clone, Copy)]
pub struct Charset {
    name: &'static str,
    encoding: &'static Encoding,
}

impl Charset {
    pub fn new(name: &'static str, encoding: &'static Encoding) -> Self {
        Self { name, encoding }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decodes the whole part. Malformed sequences become U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (decoded, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            tracing::debug!(charset = self.name, "replaced malformed byte sequences");
        }
        decoded.into_owned()
    }
}

impl From<&'static Encoding> for Charset {
    fn from(encoding: &'static Encoding) -> Self {
        Self::new(encoding.name(), encoding)
    }
}

/// Read-only lookup table from case-insensitive labels to [`Charset`]s.
///
/// Explicitly registered labels win. With the WHATWG table enabled, any
/// other label `encoding_rs` knows is accepted too.
#[derive(Debug, Clone, Default)]
pub struct CharsetRegistry {
    by_label: HashMap<String, Charset>,
    whatwg: bool,
}

impl CharsetRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(encoding_rs::UTF_8.into(), &[UNLABELLED]);
        registry.whatwg = true;
        registry
    }

    /// Maps `labels` to `charset`. A label that is already taken is reassigned.
    pub fn register(&mut self, charset: Charset, labels: &[&str]) {
        for label in labels {
            self.by_label.insert(label.trim().to_ascii_lowercase(), charset);
        }
    }

    pub fn resolve(&self, label: &str) -> Result<Charset, ContentError> {
        let key = label.trim().to_ascii_lowercase();
        if let Some(charset) = self.by_label.get(&key) {
            return Ok(*charset);
        }
        self.whatwg
            // Labels WHATWG maps to the replacement decoder are refused.
            .then(|| Encoding::for_label_no_replacement(key.as_bytes()))
            .flatten()
            .map(Charset::from)
            .ok_or_else(|| ContentError::UnsupportedCharset(label.to_string()))
    }

    pub fn decode(&self, label: &str, bytes: &[u8]) -> Result<String, ContentError> {
        Ok(self.resolve(label)?.decode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_registry_has_both_families() {
        assert!(DEFAULT_CHARSETS.resolve("utf-8").is_ok());
        assert!(DEFAULT_CHARSETS.resolve("iso-8859-1").is_ok());
    }

    #[test]
    fn empty_label_is_utf8() {
        let registry = CharsetRegistry::with_defaults();
        assert_eq!(registry.resolve("").unwrap().name(), "UTF-8");
        assert_eq!(registry.decode("", "héllo".as_bytes()).unwrap(), "héllo");
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let registry = CharsetRegistry::with_defaults();
        assert_eq!(registry.resolve(" UTF-8 ").unwrap().name(), "UTF-8");
        assert_eq!(registry.resolve("Latin1").unwrap().name(), "windows-1252");
        assert_eq!(registry.resolve("US-ASCII").unwrap().name(), "windows-1252");
    }

    #[test]
    fn iso_8859_1_decodes_high_bytes() {
        let registry = CharsetRegistry::with_defaults();
        let text = registry.decode("ISO-8859-1", b"caf\xe9").unwrap();
        assert_eq!(text, "caf\u{e9}");
    }

    #[test]
    fn legacy_charsets_decode() {
        let registry = CharsetRegistry::with_defaults();
        assert_eq!(
            registry
                .decode("koi8-r", b"\xf0\xd2\xc9\xd7\xc5\xd4")
                .unwrap(),
            "Привет"
        );
        assert_eq!(registry.decode("iso-8859-2", b"\xb1").unwrap(), "ą");
        assert_eq!(registry.decode("windows-1251", b"\xc4\xe0").unwrap(), "Да");
        assert_eq!(registry.decode("iso-8859-15", b"\xa4").unwrap(), "\u{20ac}");
        for label in ["gb2312", "shift_jis", "iso-2022-jp", "euc-kr"] {
            assert!(registry.resolve(label).is_ok(), "{label}");
        }
    }

    #[test]
    fn unknown_label_is_an_error() {
        let registry = CharsetRegistry::with_defaults();
        assert_eq!(
            registry.resolve("x-bogus").unwrap_err(),
            ContentError::UnsupportedCharset("x-bogus".into())
        );
        assert!(registry.resolve("iso-2022-kr").is_err());
    }

    #[test]
    fn empty_registry_knows_only_what_is_registered() {
        let mut registry = CharsetRegistry::empty();
        assert!(registry.resolve("utf-8").is_err());
        registry.register(
            Charset::new("latin-9", encoding_rs::ISO_8859_15),
            &["latin9"],
        );
        assert_eq!(registry.decode("LATIN9", b"\xa4").unwrap(), "\u{20ac}");
        assert!(registry.resolve("koi8-r").is_err());
    }
}
