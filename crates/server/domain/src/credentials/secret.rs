//! Decrypted integration tokens, minted signing tokens and the token pepper
//! are held as [`SecretValue`]: redacted in `Debug`, zeroed on drop.

use zeroize::Zeroizing;

#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(Zeroizing<Vec<u8>>);

impl SecretValue {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Raw bytes. Hand them straight to the consumer; copies are not zeroed.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// `None` when the bytes are not UTF-8
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretValue(<{} bytes>)", self.len())
    }
}

macro_rules! secret_from {
    ($($source:ty),+) => {
        $(impl From<$source> for SecretValue {
            fn from(value: $source) -> Self {
                Self::new(value)
            }
        })+
    };
}

secret_from!(&str, String, Vec<u8>);
