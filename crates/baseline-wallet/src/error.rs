//! Wallet error types.

use baseline_core::error::{AddressError, AmountError, CryptoError, KeyError};
use thiserror::Error;

/// Coarse error classes used to decide how a caller recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input; correct it and retry.
    Validation,
    /// Decryption or signing failed; the operation was not applied.
    Crypto,
    /// Not enough value; lower the amount or add funds.
    InsufficientFunds,
    /// UTXO set and key ring disagree; surfaced, not retried.
    Integrity,
    /// Durable storage unavailable.
    Storage,
    /// Operation not valid in the current session state.
    State,
    /// The remote node failed or returned garbage.
    Chain,
}

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Mnemonic failed word-list or checksum validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Raw seed is not exactly 32 bytes of hex.
    #[error("invalid seed: {0}")]
    InvalidSeedFormat(String),

    /// Encoded private key has a bad checksum, version or length.
    #[error("invalid encoded key: {0}")]
    InvalidEncodedKey(#[from] KeyError),

    /// Backup file is not valid JSON.
    #[error("malformed backup: {0}")]
    MalformedBackup(String),

    /// Backup file is itself encrypted.
    #[error("encrypted backups are not supported; decrypt it with the node wallet first")]
    EncryptedBackupUnsupported,

    /// Backup file has no usable seed.
    #[error("backup is missing a 64-character hex seed")]
    MissingSeed,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Fee rate could not be determined.
    #[error("invalid fee rate: {0}")]
    InvalidFeeRate(String),

    /// Hierarchical key derivation failed.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Wrong passphrase or corrupted blob. Deliberately indistinguishable.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Signing or signature encoding failed.
    #[error("signing: {0}")]
    Signing(#[from] CryptoError),

    /// Insufficient funds to cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Value of every UTXO considered, in liners.
        have: u64,
        /// Amount plus the fee at the last estimate, in liners.
        need: u64,
    },

    /// A selected UTXO's address has no key in the key ring.
    #[error("missing signing key for address {0}")]
    MissingSigningKey(String),

    /// Address does not decode to a P2PKH script on this network.
    #[error("unresolvable address {address}: {source}")]
    UnresolvableAddress {
        /// The offending address string.
        address: String,
        /// Why it failed to decode.
        source: AddressError,
    },

    /// Imported raw keys cannot derive further addresses.
    #[error("cannot derive additional addresses for imported keys")]
    CannotExtendImportedKey,

    /// Operation is not valid in the current session state.
    #[error("invalid state: {operation} requires {expected}, session is {actual}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// States in which it is allowed.
        expected: &'static str,
        /// The current state.
        actual: &'static str,
    },

    /// Unlock was attempted but no wallet is stored.
    #[error("no stored wallet")]
    NoStoredWallet,

    /// Durable storage error.
    #[error("storage: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Chain source (remote node) error.
    #[error("chain source: {0}")]
    Chain(String),

    /// Background worker failed to complete.
    #[error("worker: {0}")]
    Worker(String),
}

impl WalletError {
    /// Classify this error for recovery decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidMnemonic(_)
            | WalletError::InvalidSeedFormat(_)
            | WalletError::InvalidEncodedKey(_)
            | WalletError::MalformedBackup(_)
            | WalletError::EncryptedBackupUnsupported
            | WalletError::MissingSeed
            | WalletError::InvalidAmount(_)
            | WalletError::InvalidFeeRate(_) => ErrorKind::Validation,
            WalletError::KeyDerivation(_)
            | WalletError::DecryptionFailed
            | WalletError::Encryption(_)
            | WalletError::Signing(_) => ErrorKind::Crypto,
            WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WalletError::MissingSigningKey(_) | WalletError::UnresolvableAddress { .. } => {
                ErrorKind::Integrity
            }
            WalletError::Storage(_) | WalletError::Serialization(_) => ErrorKind::Storage,
            WalletError::CannotExtendImportedKey
            | WalletError::InvalidState { .. }
            | WalletError::NoStoredWallet
            | WalletError::Worker(_) => ErrorKind::State,
            WalletError::Chain(_) => ErrorKind::Chain,
        }
    }

    pub(crate) fn unresolvable(address: &str, source: AddressError) -> Self {
        WalletError::UnresolvableAddress {
            address: address.to_string(),
            source,
        }
    }
}

impl From<AmountError> for WalletError {
    fn from(e: AmountError) -> Self {
        WalletError::InvalidAmount(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds {
            have: 100,
            need: 200,
        };
        assert_eq!(e.to_string(), "insufficient funds: have 100, need 200");
    }

    #[test]
    fn display_decryption_failed_is_generic() {
        assert_eq!(WalletError::DecryptionFailed.to_string(), "decryption failed");
    }

    #[test]
    fn display_unresolvable_address() {
        let e = WalletError::unresolvable("1abc", AddressError::UnsupportedVersion(0));
        assert_eq!(
            e.to_string(),
            "unresolvable address 1abc: unsupported version byte: 0x00"
        );
    }

    #[test]
    fn from_key_error() {
        let e: WalletError = KeyError::InvalidEncoding.into();
        assert_eq!(e, WalletError::InvalidEncodedKey(KeyError::InvalidEncoding));
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn from_amount_error() {
        let e: WalletError = AmountError::Empty.into();
        assert_eq!(e, WalletError::InvalidAmount("empty amount".into()));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(WalletError::DecryptionFailed.kind(), ErrorKind::Crypto);
        assert_eq!(
            WalletError::InsufficientFunds { have: 0, need: 1 }.kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(WalletError::MissingSigningKey("N".into()).kind(), ErrorKind::Integrity);
        assert_eq!(WalletError::Storage("disk".into()).kind(), ErrorKind::Storage);
        assert_eq!(WalletError::CannotExtendImportedKey.kind(), ErrorKind::State);
        assert_eq!(WalletError::Chain("timeout".into()).kind(), ErrorKind::Chain);
    }

    #[test]
    fn clone_and_eq() {
        let e1 = WalletError::InvalidAmount("zero".into());
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }
}
