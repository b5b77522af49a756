//! Content fingerprints.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `bytes`.
///
/// # Example
///
/// ```
/// use preview_core::fingerprint;
///
/// assert_eq!(fingerprint(b"# Hello").len(), 64);
/// assert_eq!(fingerprint(b"# Hello"), fingerprint(b"# Hello"));
/// ```
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
