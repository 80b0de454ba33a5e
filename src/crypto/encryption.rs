//! AES-256-GCM encryption for wallet private keys at rest.
//!
//! Stored layout: `"<base64 ciphertext>.<base64 auth tag>"` with the 16-byte IV kept in its own
//! base64 column.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Encryption key must be 32 bytes (256 bits) when decoded")]
    InvalidKeyLength,
    #[error("Invalid encrypted data format. Expected \"encrypted.authTag\"")]
    InvalidFormat,
    #[error("Missing encrypted data or authentication tag")]
    MissingParts,
    #[error("IV must be 16 bytes")]
    InvalidIv,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decryption failed (wrong key or corrupted data)")]
    Cipher,
    #[error("decrypted data is not valid UTF-8")]
    Utf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub encrypted_data: String,
    pub iv: String,
}

/// Node's `JSON.stringify(buffer)` shape, which some legacy rows hold instead of the string.
#[derive(Deserialize)]
struct StringifiedBuffer {
    #[serde(rename = "type")]
    kind: String,
    data: Vec<u8>,
}

#[derive(Clone)]
pub struct WalletCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for WalletCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCipher").finish_non_exhaustive()
    }
}

impl WalletCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Builds a cipher from the base64 `WALLET_ENCRYPTION_KEY` value.
    pub fn from_base64_key(encoded: &str) -> Result<Self, EncryptionError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Result<Aes256Gcm16, EncryptionError> {
        Aes256Gcm16::new_from_slice(&self.key).map_err(|_| EncryptionError::InvalidKeyLength)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, EncryptionError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let sealed = self
            .cipher()?
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| EncryptionError::Cipher)?;

        // aes-gcm appends the tag; the stored format keeps it separate.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(EncryptedSecret {
            encrypted_data: format!("{}.{}", BASE64.encode(ciphertext), BASE64.encode(tag)),
            iv: BASE64.encode(iv),
        })
    }

    pub fn decrypt(&self, encrypted_data: &str, iv: &str) -> Result<String, EncryptionError> {
        let encrypted_data = unwrap_stringified_buffer(encrypted_data);

        let (ciphertext_b64, tag_b64) = encrypted_data
            .split_once('.')
            .ok_or(EncryptionError::InvalidFormat)?;
        if ciphertext_b64.is_empty() || tag_b64.is_empty() {
            return Err(EncryptionError::MissingParts);
        }

        let iv = BASE64.decode(iv)?;
        if iv.len() != IV_LEN {
            return Err(EncryptionError::InvalidIv);
        }

        let mut sealed = BASE64.decode(ciphertext_b64)?;
        sealed.extend_from_slice(&BASE64.decode(tag_b64)?);

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EncryptionError::Cipher)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::Utf8)
    }
}

fn unwrap_stringified_buffer(raw: &str) -> String {
    if !raw.contains("\"type\":\"Buffer\"") {
        return raw.to_string();
    }
    match serde_json::from_str::<StringifiedBuffer>(raw) {
        Ok(buf) if buf.kind == "Buffer" => String::from_utf8_lossy(&buf.data).into_owned(),
        Ok(_) => raw.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse stringified Buffer payload");
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> WalletCipher {
        WalletCipher::new([7u8; 32])
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let c = cipher();
        let sealed = c.encrypt("secret-key-material").unwrap();
        assert!(sealed.encrypted_data.contains('.'));
        assert_eq!(BASE64.decode(&sealed.iv).unwrap().len(), IV_LEN);
        assert_eq!(c.decrypt(&sealed.encrypted_data, &sealed.iv).unwrap(), "secret-key-material");
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let c = cipher();
        let sealed = c.encrypt("payload").unwrap();
        let (ct, _) = sealed.encrypted_data.split_once('.').unwrap();
        let forged = format!("{}.{}", ct, BASE64.encode([0u8; TAG_LEN]));
        assert!(matches!(c.decrypt(&forged, &sealed.iv), Err(EncryptionError::Cipher)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = cipher().encrypt("payload").unwrap();
        let other = WalletCipher::new([9u8; 32]);
        assert!(other.decrypt(&sealed.encrypted_data, &sealed.iv).is_err());
    }

    #[test]
    fn data_without_separator_is_a_format_error() {
        let iv = BASE64.encode([0u8; IV_LEN]);
        assert!(matches!(cipher().decrypt("abcd", &iv), Err(EncryptionError::InvalidFormat)));
        assert!(matches!(cipher().decrypt("abcd.", &iv), Err(EncryptionError::MissingParts)));
    }

    #[test]
    fn stringified_buffer_rows_are_unwrapped() {
        let c = cipher();
        let sealed = c.encrypt("legacy").unwrap();
        let as_buffer = serde_json::json!({
            "type": "Buffer",
            "data": sealed.encrypted_data.as_bytes(),
        })
        .to_string();
        assert_eq!(c.decrypt(&as_buffer, &sealed.iv).unwrap(), "legacy");
    }

    #[test]
    fn key_must_decode_to_32_bytes() {
        assert!(matches!(
            WalletCipher::from_base64_key(&BASE64.encode([1u8; 16])),
            Err(EncryptionError::InvalidKeyLength)
        ));
        assert!(WalletCipher::from_base64_key(&BASE64.encode([1u8; 32])).is_ok());
    }
}
