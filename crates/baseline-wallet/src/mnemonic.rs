//! BIP-39 mnemonic generation, validation and seed stretching.

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use crate::error::WalletError;

/// Entropy for freshly generated phrases (12 words).
const NEW_MNEMONIC_ENTROPY_BYTES: usize = 16;

/// Generate a new 12-word English mnemonic from 128 bits of OS entropy.
pub fn generate_mnemonic() -> Result<Zeroizing<String>, WalletError> {
    use rand::RngCore;
    let mut entropy = Zeroizing::new([0u8; NEW_MNEMONIC_ENTROPY_BYTES]);
    rand::rngs::OsRng.fill_bytes(&mut entropy[..]);
    let m = Mnemonic::from_entropy_in(Language::English, &entropy[..])
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(m.to_string()))
}

/// Collapse whitespace and lowercase a user-entered phrase.
pub fn normalize_phrase(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(
        phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    )
}

/// Parse a phrase, checking the word list and checksum.
///
/// Normalizes whitespace and converts to lowercase before parsing.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = normalize_phrase(phrase);
    Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Stretch a phrase into the 512-bit BIP-39 seed with an empty passphrase.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Zeroizing<[u8; 64]>, WalletError> {
    let m = parse_mnemonic(phrase)?;
    Ok(Zeroizing::new(m.to_seed("")))
}
