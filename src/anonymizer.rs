//! Caller anonymization
//!
//! Likes are deduplicated per caller without ever persisting the caller's
//! network address: only a SHA-256 digest of it reaches the store.

use sha2::{Digest, Sha256};

/// One-way hasher for caller addresses.
#[derive(Debug, Clone, Default)]
pub struct IpAnonymizer {
    salt: String,
}

impl IpAnonymizer {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Hash an address into a lowercase hex token.
    ///
    /// The input is not validated; empty or malformed addresses hash like
    /// any other string.
    pub fn hash(&self, address: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(address.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Unsalted convenience form of [`IpAnonymizer::hash`].
pub fn hash_ip(address: &str) -> String {
    IpAnonymizer::default().hash(address)
}
