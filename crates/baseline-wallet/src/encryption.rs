//! AES-256-GCM wallet encryption keyed by PBKDF2-HMAC-SHA256.
//!
//! Every call to [`encrypt`] draws a fresh salt and IV from the OS RNG. The
//! iteration count travels with the ciphertext so it can be raised later
//! without breaking existing blobs.
//!
//! # Stored format
//! ```text
//! {"iv": base64(12 bytes), "salt": base64(16 bytes), "data": base64(ciphertext || tag), "iterations": n}
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::Hmac;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::WalletError;

/// PBKDF2 iterations used when none are configured or stored.
pub const DEFAULT_KDF_ITERATIONS: u32 = 200_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

const KEY_LEN: usize = 32;

/// Ciphertext plus the parameters needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub iv: [u8; IV_LEN],
    pub salt: [u8; SALT_LEN],
    /// AES-GCM output, authentication tag included.
    pub ciphertext: Vec<u8>,
    pub iterations: u32,
}

#[derive(Serialize, Deserialize)]
struct StoredBlob {
    iv: String,
    salt: String,
    data: String,
    #[serde(default)]
    iterations: u32,
}

impl EncryptedBlob {
    /// Serialize to the stored JSON object.
    pub fn to_json(&self) -> Result<String, WalletError> {
        let stored = StoredBlob {
            iv: STANDARD.encode(self.iv),
            salt: STANDARD.encode(self.salt),
            data: STANDARD.encode(&self.ciphertext),
            iterations: self.iterations,
        };
        serde_json::to_string(&stored).map_err(|e| WalletError::Serialization(e.to_string()))
    }

    /// Parse the stored JSON object.
    ///
    /// Any malformed field is reported as [`WalletError::DecryptionFailed`].
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let stored: StoredBlob =
            serde_json::from_str(json).map_err(|_| WalletError::DecryptionFailed)?;
        let iv = decode_fixed::<IV_LEN>(&stored.iv)?;
        let salt = decode_fixed::<SALT_LEN>(&stored.salt)?;
        let ciphertext = STANDARD
            .decode(stored.data.as_bytes())
            .map_err(|_| WalletError::DecryptionFailed)?;
        Ok(Self {
            iv,
            salt,
            ciphertext,
            iterations: effective_iterations(stored.iterations),
        })
    }
}

fn decode_fixed<const N: usize>(b64: &str) -> Result<[u8; N], WalletError> {
    let bytes = STANDARD
        .decode(b64.as_bytes())
        .map_err(|_| WalletError::DecryptionFailed)?;
    bytes.try_into().map_err(|_| WalletError::DecryptionFailed)
}

fn effective_iterations(iterations: u32) -> u32 {
    if iterations == 0 {
        DEFAULT_KDF_ITERATIONS
    } else {
        iterations
    }
}

/// Stretch a passphrase into a 256-bit AES key.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>, WalletError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(passphrase, salt, effective_iterations(iterations), &mut key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` under `passphrase`.
///
/// `iterations` of 0 selects [`DEFAULT_KDF_ITERATIONS`].
pub fn encrypt(
    passphrase: &str,
    plaintext: &[u8],
    iterations: u32,
) -> Result<EncryptedBlob, WalletError> {
    use rand::RngCore;
    let mut iv = [0u8; IV_LEN];
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let iterations = effective_iterations(iterations);
    let key = derive_key(passphrase.as_bytes(), &salt, iterations)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    Ok(EncryptedBlob {
        iv,
        salt,
        ciphertext,
        iterations,
    })
}

/// Decrypt a blob produced by [`encrypt`].
///
/// A wrong passphrase and a tampered blob both yield
/// [`WalletError::DecryptionFailed`].
pub fn decrypt(passphrase: &str, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let key = derive_key(passphrase.as_bytes(), &blob.salt, blob.iterations)
        .map_err(|_| WalletError::DecryptionFailed)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| WalletError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::from_slice(&blob.iv), blob.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| WalletError::DecryptionFailed)
}

/// Serialize `value` to JSON and encrypt it.
pub fn seal<T: Serialize>(
    passphrase: &str,
    value: &T,
    iterations: u32,
) -> Result<EncryptedBlob, WalletError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(value).map_err(|e| WalletError::Serialization(e.to_string()))?,
    );
    encrypt(passphrase, &plaintext, iterations)
}

/// Decrypt a blob and deserialize the JSON payload.
pub fn open<T: DeserializeOwned>(passphrase: &str, blob: &EncryptedBlob) -> Result<T, WalletError> {
    let plaintext = decrypt(passphrase, blob)?;
    serde_json::from_slice(&plaintext).map_err(|_| WalletError::DecryptionFailed)
}
