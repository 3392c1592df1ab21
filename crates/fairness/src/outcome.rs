//! Dice outcome derivation

use sha2::{Digest, Sha256};

use crate::error::FairnessError;
use crate::seed::verify_commitment;

/// Number of faces on the die
pub const DICE_FACES: u32 = 6;

/// Derive a roll in `1..=6` from the seed pair and nonce.
///
/// The digest of `"{server_seed}:{client_seed}:{nonce}"` is read as a
/// big-endian `u32` from its first four bytes, reduced modulo six.
pub fn compute_outcome(server_seed: &str, client_seed: &str, nonce: u64) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hasher.update(b":");
    hasher.update(client_seed.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_string().as_bytes());
    let digest = hasher.finalize();

    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    // DICE_FACES fits in u8 and the remainder is < 6
    (prefix % DICE_FACES) as u8 + 1
}

/// Verify a settled roll end to end: the seed matches its commitment and
/// the recorded outcome is what the inputs produce.
pub fn verify_bet(
    server_seed: &str,
    server_seed_hash: &str,
    client_seed: &str,
    nonce: u64,
    recorded_outcome: u8,
) -> Result<(), FairnessError> {
    verify_commitment(server_seed, server_seed_hash)?;

    let computed = compute_outcome(server_seed, client_seed, nonce);
    if computed != recorded_outcome {
        return Err(FairnessError::OutcomeMismatch {
            recorded: recorded_outcome,
            computed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{generate_server_seed, hash_seed};

    #[test]
    fn test_known_vectors() {
        let seed = "a".repeat(64);
        // sha256 prefixes 81869cce, 84b1afb7, e1273d45
        assert_eq!(compute_outcome(&seed, "lucky", 1), 5);
        assert_eq!(compute_outcome(&seed, "lucky", 2), 2);
        assert_eq!(compute_outcome(&seed, "player-seed", 7), 2);
    }

    #[test]
    fn test_outcome_is_deterministic_and_in_range() {
        let seed = generate_server_seed();
        for nonce in 0..500 {
            let first = compute_outcome(&seed, "client", nonce);
            assert!((1..=6).contains(&first));
            assert_eq!(first, compute_outcome(&seed, "client", nonce));
        }
    }

    #[test]
    fn test_every_face_reachable() {
        let seed = generate_server_seed();
        let mut seen = [false; 6];
        for nonce in 0..1000 {
            seen[(compute_outcome(&seed, "faces", nonce) - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_verify_bet() {
        let seed = generate_server_seed();
        let hash = hash_seed(&seed);
        let outcome = compute_outcome(&seed, "abc", 3);

        assert!(verify_bet(&seed, &hash, "abc", 3, outcome).is_ok());

        let wrong = outcome % 6 + 1;
        assert_eq!(
            verify_bet(&seed, &hash, "abc", 3, wrong),
            Err(FairnessError::OutcomeMismatch {
                recorded: wrong,
                computed: outcome
            })
        );
    }
}
