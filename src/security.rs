use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Iteration count used by the salted generation. Wallets hashed under it
/// still exist, so the constant cannot change.
const SALTED_ITERATIONS: u32 = 10_000;

const ADAPTIVE_PREFIX: &str = "$argon2";

/// A stored transaction-password hash, one of three coexisting generations.
///
/// The variant is decided once, from the shape of the stored columns, and
/// verification dispatches on it. Call sites never inspect hash strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPassword<'a> {
    /// Oldest wallets: a single unsalted SHA-256 hex digest.
    Legacy { digest: &'a str },
    /// Middle generation: SHA-256 chained for a fixed iteration count over
    /// `salt + password`, hex output.
    SaltedIterated { digest: &'a str, salt: &'a str },
    /// Current generation: an argon2 PHC string, self-describing.
    Adaptive { encoded: &'a str },
}

impl<'a> StoredPassword<'a> {
    /// Classify a stored hash by shape: the argon2 PHC prefix wins, then
    /// presence of a salt, else legacy.
    pub fn classify(hash: &'a str, salt: Option<&'a str>) -> Self {
        if hash.starts_with(ADAPTIVE_PREFIX) {
            return StoredPassword::Adaptive { encoded: hash };
        }
        match salt {
            Some(salt) if !salt.is_empty() => StoredPassword::SaltedIterated { digest: hash, salt },
            _ => StoredPassword::Legacy { digest: hash },
        }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        match self {
            StoredPassword::Legacy { digest } => sha256_hex(candidate.as_bytes()) == *digest,
            StoredPassword::SaltedIterated { digest, salt } => {
                salted_iterated_digest(candidate, salt) == *digest
            }
            StoredPassword::Adaptive { encoded } => {
                let Ok(parsed) = PasswordHash::new(encoded) else {
                    return false;
                };
                Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok()
            }
        }
    }
}

/// Hash a new transaction password. All newly created wallets use the
/// adaptive generation.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

/// Lowercase hex of `bytes` cryptographically random bytes.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn salted_iterated_digest(password: &str, salt: &str) -> String {
    let mut digest = sha256_hex(format!("{salt}{password}").as_bytes());
    for _ in 1..SALTED_ITERATIONS {
        digest = sha256_hex(digest.as_bytes());
    }
    digest
}

/// Produce the hash stored for a salted-iterated wallet. Kept public for
/// administrative tooling that migrates legacy rows.
pub fn legacy_salted_hash(password: &str, salt: &str) -> String {
    salted_iterated_digest(password, salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_unsalted_verifies_original_password() {
        let digest = sha256_hex(b"gems4ever");
        let stored = StoredPassword::classify(&digest, None);
        assert!(matches!(stored, StoredPassword::Legacy { .. }));
        assert!(stored.verify("gems4ever"));
        assert!(!stored.verify("gems4ever "));
        assert!(!stored.verify("something-else"));
    }

    #[test]
    fn salted_iterated_verifies_original_password() {
        let digest = legacy_salted_hash("gems4ever", "a1b2c3");
        let stored = StoredPassword::classify(&digest, Some("a1b2c3"));
        assert!(matches!(stored, StoredPassword::SaltedIterated { .. }));
        assert!(stored.verify("gems4ever"));
        assert!(!stored.verify("gems4even"));
    }

    #[test]
    fn adaptive_verifies_original_password() {
        let encoded = hash_password("gems4ever").unwrap();
        let stored = StoredPassword::classify(&encoded, None);
        assert!(matches!(stored, StoredPassword::Adaptive { .. }));
        assert!(stored.verify("gems4ever"));
        assert!(!stored.verify("GEMS4EVER"));
    }

    #[test]
    fn adaptive_prefix_wins_over_salt_presence() {
        let encoded = hash_password("pw").unwrap();
        // A migrated row may still carry its old salt column.
        let stored = StoredPassword::classify(&encoded, Some("leftover-salt"));
        assert!(matches!(stored, StoredPassword::Adaptive { .. }));
        assert!(stored.verify("pw"));
    }

    #[test]
    fn empty_salt_is_treated_as_legacy() {
        let digest = sha256_hex(b"pw");
        let stored = StoredPassword::classify(&digest, Some(""));
        assert!(matches!(stored, StoredPassword::Legacy { .. }));
        assert!(stored.verify("pw"));
    }

    #[test]
    fn random_hex_is_lowercase_hex_of_expected_length() {
        let s = random_hex(32);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn malformed_adaptive_hash_rejects() {
        let stored = StoredPassword::Adaptive { encoded: "$argon2id$not-a-real-hash" };
        assert!(!stored.verify("anything"));
    }
}
