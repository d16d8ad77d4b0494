//! Message integrity tags for direct client-to-client traffic.
//!
//! Every client loads the same shared secret; a tag is the base64-encoded
//! HMAC-SHA256 of the message text under that secret. Verification runs in
//! constant time via [`Mac::verify_slice`].

use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shared key material, ready to tag and verify message texts.
#[derive(Clone)]
pub struct MessageKey {
    mac: HmacSha256,
}

impl MessageKey {
    pub fn new(material: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(material).context("failed to derive HMAC key")?;
        Ok(Self { mac })
    }

    /// Loads key material from disk, trimming surrounding whitespace.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        let material = raw.trim_ascii();
        if material.is_empty() {
            bail!("key file {} is empty", path.display());
        }
        Self::new(material)
    }

    /// Computes the transport tag for a message text.
    pub fn tag(&self, text: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(text.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Checks a received tag against a message text.
    ///
    /// Tags that do not decode as base64 fail verification outright.
    pub fn verify(&self, tag: &str, text: &str) -> bool {
        let Ok(claimed) = STANDARD.decode(tag) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(text.as_bytes());
        mac.verify_slice(&claimed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MessageKey {
        MessageKey::new(b"a-shared-secret-for-tests").expect("key")
    }

    #[test]
    fn tag_verifies_against_same_text() {
        let key = key();
        let tag = key.tag("hello bob");
        assert!(key.verify(&tag, "hello bob"));
    }

    #[test]
    fn altered_text_fails_verification() {
        let key = key();
        let tag = key.tag("hello bob");
        assert!(!key.verify(&tag, "hello bob!"));
    }

    #[test]
    fn garbage_tag_fails_verification() {
        let key = key();
        assert!(!key.verify("not base64 at all???", "hello bob"));
        assert!(!key.verify("", "hello bob"));
    }

    #[test]
    fn different_keys_produce_different_tags() {
        let key_a = key();
        let key_b = MessageKey::new(b"another-secret").expect("key");
        assert_ne!(key_a.tag("hello"), key_b.tag("hello"));
    }

    #[test]
    fn load_trims_whitespace_and_rejects_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hmac.key");

        std::fs::write(&path, b"  secret-material\n").expect("write key");
        let loaded = MessageKey::load(&path).expect("load key");
        let direct = MessageKey::new(b"secret-material").expect("key");
        assert_eq!(loaded.tag("x"), direct.tag("x"));

        std::fs::write(&path, b"   \n").expect("write empty key");
        assert!(MessageKey::load(&path).is_err());
    }
}
