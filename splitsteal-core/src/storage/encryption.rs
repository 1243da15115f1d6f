use crate::error::{LedgerError, Result};
use rand::RngCore;

// ChaCha20Poly1305 for authenticated encryption
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};

pub const SALT_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
const PBKDF2_ROUNDS: u32 = 100_000;

#[derive(Debug, Clone)]
pub struct Sealed {
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Encrypt data with passphrase using ChaCha20Poly1305
pub fn seal(data: &[u8], passphrase: &str) -> Result<Sealed> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt);
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let cipher = ChaCha20Poly1305::new(&key);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| LedgerError::crypto(format!("Encryption failed: {}", e)))?;

    Ok(Sealed {
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Decrypt data with passphrase. Fails on a wrong passphrase or tampered data.
pub fn open(sealed: &Sealed, passphrase: &str) -> Result<Vec<u8>> {
    if sealed.nonce.len() != NONCE_SIZE {
        return Err(LedgerError::crypto(format!(
            "Nonce must be {} bytes, got {}",
            NONCE_SIZE,
            sealed.nonce.len()
        )));
    }

    let key = derive_key(passphrase, &sealed.salt);
    let cipher = ChaCha20Poly1305::new(&key);
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|e| LedgerError::crypto(format!("Decryption failed: {}", e)))
}

/// Derive encryption key from passphrase using PBKDF2
fn derive_key(passphrase: &str, salt: &[u8]) -> Key {
    use pbkdf2::pbkdf2_hmac;
    use sha2::Sha256;

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    *Key::from_slice(&key)
}
