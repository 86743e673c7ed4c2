//! Row and dataset digests.
//!
//! Rows are hashed over their canonical serialization with a field separator
//! that cannot appear in canonical values, so no two distinct rows share a
//! preimage. Dataset-level digests chain the per-row digests in final row
//! order.

use crate::config::HashAlgorithm;
use sha2::{Digest, Sha256, Sha512};

/// Field separator inside one row's hash preimage.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Hex digest of raw bytes under the configured algorithm.
#[must_use]
pub fn hash_hex(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
    }
}

/// Digest of one row from its canonical field renderings.
#[must_use]
pub fn row_digest(algorithm: HashAlgorithm, fields: &[&str]) -> String {
    let mut preimage = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            preimage.push(FIELD_SEPARATOR);
        }
        preimage.extend_from_slice(field.as_bytes());
    }
    hash_hex(algorithm, &preimage)
}

/// Dataset-level digest over per-row digests, in row order.
#[must_use]
pub fn dataset_digest(algorithm: HashAlgorithm, row_hashes: &[String]) -> String {
    let mut preimage = Vec::with_capacity(row_hashes.len() * 65);
    for row_hash in row_hashes {
        preimage.extend_from_slice(row_hash.as_bytes());
        preimage.push(b'\n');
    }
    hash_hex(algorithm, &preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            hash_hex(HashAlgorithm::Sha256, b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn row_digest_distinguishes_field_boundaries() {
        let a = row_digest(HashAlgorithm::Sha256, &["ab", "c"]);
        let b = row_digest(HashAlgorithm::Sha256, &["a", "bc"]);
        assert_ne!(a, b);

        let c = row_digest(HashAlgorithm::Sha256, &["ab", "c"]);
        assert_eq!(a, c);
    }

    #[test]
    fn dataset_digest_is_order_sensitive() {
        let h1 = row_digest(HashAlgorithm::Sha256, &["x"]);
        let h2 = row_digest(HashAlgorithm::Sha256, &["y"]);

        let forward = dataset_digest(HashAlgorithm::Sha256, &[h1.clone(), h2.clone()]);
        let reverse = dataset_digest(HashAlgorithm::Sha256, &[h2, h1]);
        assert_ne!(forward, reverse);
    }

    #[test]
    fn sha512_produces_longer_digests() {
        let d256 = hash_hex(HashAlgorithm::Sha256, b"x");
        let d512 = hash_hex(HashAlgorithm::Sha512, b"x");
        assert_eq!(d256.len(), 64);
        assert_eq!(d512.len(), 128);
    }
}
