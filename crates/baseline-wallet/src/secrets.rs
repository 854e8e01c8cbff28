//! Live wallet secrets and their persisted form.
//!
//! [`WalletSecrets`] is what an unlocked session holds. [`PersistedWallet`]
//! is what gets encrypted to disk: for the derivable variants only the
//! phrase or seed and the next index are stored, and the keys are derived
//! again on every unlock so they always match the authoritative secret.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use baseline_core::constants::NetworkParams;

use crate::error::WalletError;
use crate::keys::{derive_from_mnemonic, derive_from_seed, DerivedKey, Seed};

/// Secrets of an unlocked wallet. Exactly one variant is live per session.
///
/// For `Mnemonic` and `SeedBackup`, deriving indices `0..next_index` from
/// the secret reproduces `keys` exactly.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum WalletSecrets {
    /// BIP-39 phrase with BIP-32 derivation.
    Mnemonic {
        phrase: String,
        next_index: u32,
        keys: Vec<DerivedKey>,
    },
    /// Imported keys. Not derivable; `keys` is the only source of truth.
    RawPrivateKeys { keys: Vec<DerivedKey> },
    /// Raw 32-byte seed from a node wallet backup.
    SeedBackup {
        seed: Seed,
        next_index: u32,
        keys: Vec<DerivedKey>,
    },
}

impl WalletSecrets {
    /// Every live key, in derivation or import order.
    pub fn keys(&self) -> &[DerivedKey] {
        match self {
            WalletSecrets::Mnemonic { keys, .. }
            | WalletSecrets::RawPrivateKeys { keys }
            | WalletSecrets::SeedBackup { keys, .. } => keys,
        }
    }

    /// Next derivation index, `None` for imported keys.
    pub fn next_index(&self) -> Option<u32> {
        match self {
            WalletSecrets::Mnemonic { next_index, .. }
            | WalletSecrets::SeedBackup { next_index, .. } => Some(*next_index),
            WalletSecrets::RawPrivateKeys { .. } => None,
        }
    }

    /// Stable name of the variant, matching the persisted `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WalletSecrets::Mnemonic { .. } => "mnemonic",
            WalletSecrets::RawPrivateKeys { .. } => "wif",
            WalletSecrets::SeedBackup { .. } => "baseline-json",
        }
    }

    /// The form written to durable storage.
    pub fn to_persisted(&self) -> PersistedWallet {
        match self {
            WalletSecrets::Mnemonic {
                phrase, next_index, ..
            } => PersistedWallet::Mnemonic {
                mnemonic: phrase.clone(),
                next_index: *next_index,
            },
            WalletSecrets::RawPrivateKeys { keys } => PersistedWallet::Wif { keys: keys.clone() },
            WalletSecrets::SeedBackup {
                seed, next_index, ..
            } => PersistedWallet::BaselineJson {
                seed_hex: seed.to_hex().to_string(),
                next_index: *next_index,
            },
        }
    }

    /// Rebuild live secrets from their persisted form.
    ///
    /// Derivable variants get at least `batch` keys; stored key lists are
    /// never trusted for them.
    pub fn from_persisted(
        persisted: &PersistedWallet,
        batch: u32,
        account: u32,
        params: &NetworkParams,
    ) -> Result<Self, WalletError> {
        match persisted {
            PersistedWallet::Mnemonic {
                mnemonic,
                next_index,
            } => {
                let count = (*next_index).max(batch);
                let keys = derive_from_mnemonic(mnemonic, count, 0, account, params)?;
                let next_index = (*next_index).max(keys.len() as u32);
                Ok(WalletSecrets::Mnemonic {
                    phrase: mnemonic.clone(),
                    next_index,
                    keys,
                })
            }
            PersistedWallet::Wif { keys } => {
                Ok(WalletSecrets::RawPrivateKeys { keys: keys.clone() })
            }
            PersistedWallet::BaselineJson {
                seed_hex,
                next_index,
            } => {
                let seed = Seed::from_hex(seed_hex)?;
                let count = batch.max(*next_index);
                let keys = derive_from_seed(&seed, count, 0, params)?;
                Ok(WalletSecrets::SeedBackup {
                    seed,
                    next_index: count,
                    keys,
                })
            }
        }
    }

    /// A copy with one more key derived at `next_index`.
    ///
    /// Returns the new secrets and the key that was added. Fails with
    /// [`WalletError::CannotExtendImportedKey`] for imported keys.
    pub fn extended(
        &self,
        account: u32,
        params: &NetworkParams,
    ) -> Result<(WalletSecrets, DerivedKey), WalletError> {
        let mut next = self.clone();
        let new_key = match &mut next {
            WalletSecrets::Mnemonic {
                phrase,
                next_index,
                keys,
            } => {
                let key = take_single(derive_from_mnemonic(phrase, 1, *next_index, account, params)?)?;
                keys.push(key.clone());
                *next_index += 1;
                key
            }
            WalletSecrets::SeedBackup {
                seed,
                next_index,
                keys,
            } => {
                let key = take_single(derive_from_seed(seed, 1, *next_index, params)?)?;
                keys.push(key.clone());
                *next_index += 1;
                key
            }
            WalletSecrets::RawPrivateKeys { .. } => {
                return Err(WalletError::CannotExtendImportedKey);
            }
        };
        Ok((next, new_key))
    }
}

fn take_single(mut keys: Vec<DerivedKey>) -> Result<DerivedKey, WalletError> {
    keys.pop()
        .ok_or_else(|| WalletError::KeyDerivation("no key derived".into()))
}

impl fmt::Debug for WalletSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSecrets")
            .field("kind", &self.kind())
            .field("next_index", &self.next_index())
            .field("keys", &self.keys().len())
            .finish_non_exhaustive()
    }
}

/// Decrypted payload of the storage slot, tagged by `kind`.
///
/// ```json
/// {"kind":"mnemonic","mnemonic":"...","nextIndex":5}
/// {"kind":"wif","keys":[{"address":"N...","wif":"K..."}]}
/// {"kind":"baseline-json","seedHex":"...","nextIndex":5}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "kind")]
pub enum PersistedWallet {
    #[serde(rename = "mnemonic")]
    Mnemonic {
        mnemonic: String,
        #[serde(rename = "nextIndex")]
        next_index: u32,
    },
    #[serde(rename = "wif")]
    Wif { keys: Vec<DerivedKey> },
    #[serde(rename = "baseline-json")]
    BaselineJson {
        #[serde(rename = "seedHex")]
        seed_hex: String,
        #[serde(rename = "nextIndex")]
        next_index: u32,
    },
}

impl fmt::Debug for PersistedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PersistedWallet::Mnemonic { .. } => "mnemonic",
            PersistedWallet::Wif { .. } => "wif",
            PersistedWallet::BaselineJson { .. } => "baseline-json",
        };
        f.debug_struct("PersistedWallet")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}
