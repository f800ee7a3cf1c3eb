use sha2::{Digest, Sha256};

/// One-way, deterministic transform of a password and the process salt.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str, salt: &str) -> String;

    fn verify(&self, password: &str, salt: &str, digest: &str) -> bool {
        self.hash(password, salt) == digest
    }
}

/// Hex encoded SHA-256 over `salt || 0x00 || password`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl CredentialHasher for Sha256Hasher {
    fn hash(&self, password: &str, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}
