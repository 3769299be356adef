//! Integration credential encryption
//!
//! OAuth tokens are sealed with AES-256-GCM before they are written to the
//! store. The key comes from `ESIGN_CREDENTIALS_KEY`; without it the vault
//! is disabled rather than storing plaintext.

mod encryption;
mod vault;

pub use encryption::{EncryptionError, EncryptionKey};
pub use vault::{CredentialVault, OAuthTokens};
