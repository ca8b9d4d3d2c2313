//! Cryptographic collaborator for the cookie security layer: AES-256-GCM
//! authenticated encryption and HMAC-SHA256 value signing.

use crate::error::{Result, WeftError};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Master key length in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce length in bytes, prefixed to the ciphertext.
pub const NONCE_SIZE: usize = 12;

/// Length of the base64url-encoded HMAC-SHA256 tag appended to a signed
/// value. Fixed, so the tag can be split off without a delimiter.
pub const MAC_TAG_LEN: usize = 43;

/// Holds the master key and implements both cookie protection modes.
///
/// Encrypt mode produces `base64url(nonce || ciphertext)`; the nonce is
/// fresh per call, so two encryptions of the same plaintext differ yet
/// both decrypt to it. Mac mode appends a fixed-length base64url
/// HMAC-SHA256 tag computed with a key derived from the master key,
/// leaving the value itself readable.
#[derive(Clone)]
pub struct SecretService {
    master_key: Vec<u8>,
    mac_key: Vec<u8>,
}

impl std::fmt::Debug for SecretService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches log or panic output.
        f.debug_struct("SecretService")
            .field("master_key", &"<redacted>")
            .field("mac_key", &"<redacted>")
            .finish()
    }
}

impl SecretService {
    /// Create a service from a 32-byte master key.
    pub fn new(master_key: Vec<u8>) -> Result<Self> {
        if master_key.len() != KEY_SIZE {
            return Err(WeftError::Encryption(format!(
                "invalid master key size: expected {} bytes, got {}",
                KEY_SIZE,
                master_key.len()
            )));
        }
        // Signing uses its own key derived from the master key so MAC
        // tags and ciphertexts never share key material.
        let mac_key = Sha256::digest(&master_key).to_vec();
        Ok(Self {
            master_key,
            mac_key,
        })
    }

    /// Generate a random master key.
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// The stable master key bytes (the HMAC derivation input).
    pub fn key_bytes(&self) -> &[u8] {
        &self.master_key
    }

    /// Authenticated encryption: `base64url(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = Key::<Aes256Gcm>::from_slice(&self.master_key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| WeftError::Encryption(e.to_string()))?;

        let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wire.extend_from_slice(&nonce);
        wire.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(wire))
    }

    /// Authenticated decryption of [`SecretService::encrypt`] output.
    /// Any failure (bad encoding, truncation, tampering) is a
    /// recoverable `Decryption` error.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let wire = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| WeftError::Decryption(format!("invalid encoding: {e}")))?;
        if wire.len() < NONCE_SIZE {
            return Err(WeftError::Decryption("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = wire.split_at(NONCE_SIZE);

        let key = Key::<Aes256Gcm>::from_slice(&self.master_key);
        let cipher = Aes256Gcm::new(key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| WeftError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| WeftError::Decryption(format!("invalid utf-8: {e}")))
    }

    /// Append the fixed-length signature: `value || base64url(tag)`.
    pub fn sign(&self, value: &str) -> Result<String> {
        // Qualified: `aes_gcm::aead::KeyInit` also provides a
        // `new_from_slice` for `Hmac<Sha256>`.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|e| WeftError::Encryption(e.to_string()))?;
        mac.update(value.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{value}{tag}"))
    }

    /// Split the trailing signature off a signed value, verify it and
    /// return the bare value. Mismatches are recoverable `Decryption`
    /// errors.
    pub fn verify(&self, signed: &str) -> Result<String> {
        if signed.len() < MAC_TAG_LEN {
            return Err(WeftError::Decryption("signed value too short".to_string()));
        }
        let split = signed.len() - MAC_TAG_LEN;
        if !signed.is_char_boundary(split) {
            return Err(WeftError::Decryption("malformed signed value".to_string()));
        }
        let (value, tag_b64) = signed.split_at(split);
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|e| WeftError::Decryption(format!("invalid signature encoding: {e}")))?;

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|e| WeftError::Encryption(e.to_string()))?;
        mac.update(value.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| WeftError::Decryption("signature mismatch".to_string()))?;

        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SecretService {
        SecretService::new(vec![7u8; KEY_SIZE]).unwrap()
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let rendered = format!("{:?}", service());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains('7'));
    }

    #[test]
    fn rejects_wrong_key_size() {
        let err = SecretService::new(vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, WeftError::Encryption(_)));
    }

    #[test]
    fn encrypt_roundtrip() {
        let secrets = service();
        let encoded = secrets.encrypt("session-42").unwrap();
        assert_eq!(secrets.decrypt(&encoded).unwrap(), "session-42");
    }

    #[test]
    fn encrypt_is_nondeterministic() {
        let secrets = service();
        let first = secrets.encrypt("same").unwrap();
        let second = secrets.encrypt("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(secrets.decrypt(&first).unwrap(), "same");
        assert_eq!(secrets.decrypt(&second).unwrap(), "same");
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let secrets = service();
        let encoded = secrets.encrypt("secret").unwrap();

        let mut bytes = encoded.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let err = secrets.decrypt(&tampered).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn sign_roundtrip() {
        let secrets = service();
        let signed = secrets.sign("cart=3").unwrap();
        assert!(signed.starts_with("cart=3"));
        assert_eq!(signed.len(), "cart=3".len() + MAC_TAG_LEN);
        assert_eq!(secrets.verify(&signed).unwrap(), "cart=3");
    }

    #[test]
    fn tampered_value_fails_verification() {
        let secrets = service();
        let signed = secrets.sign("cart=3").unwrap();
        let tampered = signed.replacen("cart=3", "cart=9", 1);

        let err = secrets.verify(&tampered).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn tampered_tag_fails_verification() {
        let secrets = service();
        let mut signed = secrets.sign("cart=3").unwrap().into_bytes();
        let last = signed.len() - 1;
        signed[last] = if signed[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(signed).unwrap();

        assert!(secrets.verify(&tampered).is_err());
    }

    #[test]
    fn verify_rejects_short_input() {
        let secrets = service();
        assert!(secrets.verify("short").is_err());
    }

    #[test]
    fn different_keys_do_not_verify() {
        let signer = service();
        let other = SecretService::new(vec![8u8; KEY_SIZE]).unwrap();
        let signed = signer.sign("value").unwrap();
        assert!(other.verify(&signed).is_err());
    }
}
