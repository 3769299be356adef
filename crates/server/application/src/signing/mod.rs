//! Signing tokens
//!
//! Raw tokens are 256-bit random values, URL-safe base64 without padding.
//! Only their SHA-256 hash (optionally peppered) is persisted.

pub mod entropy;
pub mod tokens;

pub use entropy::{EntropyError, EntropySource, OsEntropy};
pub use tokens::{IssuedToken, SigningTokenService, hash_token};
