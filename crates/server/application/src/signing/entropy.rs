//! Entropy source for raw signing tokens.

use esign_server_domain::DomainError;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Entropy source failed: {0}")]
pub struct EntropyError(pub String);

impl From<EntropyError> for DomainError {
    fn from(err: EntropyError) -> Self {
        DomainError::infrastructure(err.to_string())
    }
}

/// Fills buffers with cryptographically secure random bytes. Injectable so
/// tests can pin the generated tokens.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// The operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError(e.to_string()))
    }
}
