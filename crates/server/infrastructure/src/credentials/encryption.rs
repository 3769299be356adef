//! AES-256-GCM sealing for integration credentials.
//!
//! A sealed value is hex(`nonce || ciphertext || tag`) with a fresh 96-bit
//! nonce per call. Callers pass a binding (the credential's scope, provider
//! and user) as associated data, so a sealed token copied onto another
//! credential row fails to open.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use thiserror::Error;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("credentials key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("credentials key is not hex: {0}")]
    KeyEncoding(#[from] hex::FromHexError),

    #[error("sealed credential is not hex")]
    SealedEncoding,

    #[error("sealed credential is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("credential could not be sealed")]
    Seal,

    /// Wrong key, wrong binding or tampered ciphertext
    #[error("credential could not be opened")]
    Open,
}

/// Key for sealing credentials. The raw bytes are zeroed on drop and never
/// printed.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self { bytes }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, EncryptionError> {
        let bytes: [u8; KEY_LEN] = raw
            .try_into()
            .map_err(|_| EncryptionError::KeyLength(raw.len()))?;
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Parse `ESIGN_CREDENTIALS_KEY`: 64 hex characters.
    pub fn from_hex(encoded: &str) -> Result<Self, EncryptionError> {
        let raw = Zeroizing::new(hex::decode(encoded.trim())?);
        Self::from_bytes(&raw)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes[..]))
    }

    pub fn seal(&self, plaintext: &[u8], binding: &[u8]) -> Result<String, EncryptionError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let body = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: binding,
                },
            )
            .map_err(|_| EncryptionError::Seal)?;

        let mut sealed = nonce.to_vec();
        sealed.extend(body);
        Ok(hex::encode(sealed))
    }

    pub fn open(&self, sealed: &str, binding: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let sealed = hex::decode(sealed.trim()).map_err(|_| EncryptionError::SealedEncoding)?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::Truncated(sealed.len()));
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: binding,
                },
            )
            .map_err(|_| EncryptionError::Open)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}
