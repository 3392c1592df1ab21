//! Server seed generation and commitment hashing

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::FairnessError;

/// Generate a fresh 32-byte server seed, hex-encoded
pub fn generate_server_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Commitment hash published for a seed: hex(sha256(seed))
pub fn hash_seed(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a revealed seed against its published hash
pub fn verify_commitment(server_seed: &str, server_seed_hash: &str) -> Result<(), FairnessError> {
    let actual = hash_seed(server_seed);
    if actual.eq_ignore_ascii_case(server_seed_hash) {
        Ok(())
    } else {
        Err(FairnessError::CommitmentMismatch {
            expected: server_seed_hash.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_seed_shape() {
        let seed = generate_server_seed();
        assert_eq!(seed.len(), 64);
        assert!(seed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(seed, generate_server_seed());
    }

    #[test]
    fn test_hash_seed_known_vector() {
        let seed = "a".repeat(64);
        assert_eq!(
            hash_seed(&seed),
            "ffe054fe7ae0cb6dc65c3af9b61d5209f439851db43d0ba5997337df154668eb"
        );
    }

    #[test]
    fn test_verify_commitment() {
        let seed = generate_server_seed();
        let hash = hash_seed(&seed);
        assert!(verify_commitment(&seed, &hash).is_ok());
        assert!(verify_commitment(&seed, &hash.to_uppercase()).is_ok());

        let other = generate_server_seed();
        assert!(matches!(
            verify_commitment(&other, &hash),
            Err(FairnessError::CommitmentMismatch { .. })
        ));
    }
}
