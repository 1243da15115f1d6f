pub mod scheme;

pub use scheme::{Commitment, CommitmentScheme, Secret, SECRET_LEN};

use crate::types::Choice;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// SHA-256 over the one-byte choice code followed by the secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Commitment;

impl CommitmentScheme for Sha256Commitment {
    fn commit(&self, choice: Choice, secret: &Secret) -> Commitment {
        let mut hasher = Sha256::new();
        hasher.update([choice.code()]);
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Commitment::from_bytes(bytes)
    }
}

/// Rnd 256-bit secret for commitment
pub fn generate_secret() -> Secret {
    let mut secret = [0u8; SECRET_LEN];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    Secret::from_bytes(secret)
}

/// Fresh secret plus its commitment. The caller keeps the secret until reveal.
pub fn generate(scheme: &dyn CommitmentScheme, choice: Choice) -> (Secret, Commitment) {
    let secret = generate_secret();
    let commitment = scheme.commit(choice, &secret);
    (secret, commitment)
}

/// Values a reveal must carry. The authoritative side rejects a pair that
/// does not match the earlier commitment; that is not detectable locally.
pub fn reveal_payload(choice: Choice, secret: Secret) -> (Choice, Secret) {
    (choice, secret)
}
