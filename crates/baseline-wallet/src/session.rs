//! Wallet session state machine.
//!
//! A [`WalletSession`] owns the only live copy of the private keys:
//!
//! ```text
//!   Empty --create/import--> Ready
//!  Locked --import---------> Ready
//!  Locked --unlock---------> Ready
//!   Ready --lock-----------> Locked
//!   Ready --add_address----> Ready
//!     any --clear----------> Empty
//! ```
//!
//! Every mutation is encrypted and persisted before the in-memory state
//! changes, so a failed transition leaves the session exactly as it was.

use std::fmt;
use std::sync::Arc;

use tracing::info;
use zeroize::Zeroizing;

use baseline_core::constants::NetworkParams;

use crate::backup::{export_backup, parse_seed_backup};
use crate::encryption::{self, DEFAULT_KDF_ITERATIONS};
use crate::error::WalletError;
use crate::keys::{
    derive_from_mnemonic, derive_from_seed, key_from_encoded, DerivedKey, KeyRing, Seed,
    DEFAULT_ADDRESS_BATCH,
};
use crate::mnemonic::{generate_mnemonic, normalize_phrase};
use crate::secrets::{PersistedWallet, WalletSecrets};
use crate::storage::SecretStore;

/// Session parameters, fixed for the life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Addresses derived on create, import and unlock.
    pub address_batch: u32,
    /// PBKDF2 iterations for newly written blobs.
    pub kdf_iterations: u32,
    /// BIP-44 account for mnemonic wallets.
    pub account: u32,
    pub params: NetworkParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address_batch: DEFAULT_ADDRESS_BATCH,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            account: 0,
            params: NetworkParams::BASELINE,
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stored wallet.
    Empty,
    /// A wallet is stored but not decrypted.
    Locked,
    /// Decrypted; keys are live in memory.
    Ready,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Empty => "empty",
            SessionState::Locked => "locked",
            SessionState::Ready => "ready",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret to import.
#[derive(Clone)]
pub enum ImportSource {
    /// BIP-39 phrase.
    Mnemonic(Zeroizing<String>),
    /// One WIF-encoded private key.
    EncodedKey(Zeroizing<String>),
    /// Text of a node wallet `wallet.json`.
    SeedBackup(Zeroizing<String>),
}

impl ImportSource {
    fn kind(&self) -> &'static str {
        match self {
            ImportSource::Mnemonic(_) => "mnemonic",
            ImportSource::EncodedKey(_) => "wif",
            ImportSource::SeedBackup(_) => "baseline-json",
        }
    }
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImportSource::{}([REDACTED])", self.kind())
    }
}

struct LiveWallet {
    secrets: WalletSecrets,
    key_ring: KeyRing,
    passphrase: Zeroizing<String>,
}

/// The wallet session. Holds decrypted keys only while `Ready`.
pub struct WalletSession {
    store: Arc<dyn SecretStore>,
    config: SessionConfig,
    state: SessionState,
    live: Option<LiveWallet>,
}

impl WalletSession {
    /// Open a session over `store`: `Locked` if a wallet is stored, else `Empty`.
    pub fn open(store: Arc<dyn SecretStore>, config: SessionConfig) -> Result<Self, WalletError> {
        let state = if store.load()?.is_some() {
            SessionState::Locked
        } else {
            SessionState::Empty
        };
        info!(%state, "wallet session opened");
        Ok(Self {
            store,
            config,
            state,
            live: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The live secrets, `None` unless `Ready`.
    pub fn secrets(&self) -> Option<&WalletSecrets> {
        self.live.as_ref().map(|l| &l.secrets)
    }

    /// Live keys in order; empty unless `Ready`.
    pub fn keys(&self) -> &[DerivedKey] {
        self.secrets().map(WalletSecrets::keys).unwrap_or_default()
    }

    /// Addresses of the live keys.
    pub fn addresses(&self) -> Vec<String> {
        self.keys().iter().map(|k| k.address.clone()).collect()
    }

    /// Signing keys. Requires `Ready`.
    pub fn key_ring(&self) -> Result<&KeyRing, WalletError> {
        self.live
            .as_ref()
            .map(|l| &l.key_ring)
            .ok_or_else(|| self.invalid_state("sign", "ready"))
    }

    /// Create a fresh mnemonic wallet and derive the default batch.
    ///
    /// Only valid when `Empty`. The new phrase is available via
    /// [`secrets`](Self::secrets) for the user to write down.
    pub fn create(&mut self, passphrase: &str) -> Result<&WalletSecrets, WalletError> {
        self.require(&[SessionState::Empty], "create", "empty")?;
        let phrase = generate_mnemonic()?;
        let keys = derive_from_mnemonic(
            &phrase,
            self.config.address_batch,
            0,
            self.config.account,
            &self.config.params,
        )?;
        let secrets = WalletSecrets::Mnemonic {
            phrase: phrase.to_string(),
            next_index: self.config.address_batch,
            keys,
        };
        self.install(secrets, passphrase, "create")
    }

    /// Import a secret, replacing any stored wallet. Valid when `Empty` or `Locked`.
    ///
    /// The secret is fully validated before anything is written.
    pub fn import(
        &mut self,
        source: &ImportSource,
        passphrase: &str,
    ) -> Result<&WalletSecrets, WalletError> {
        self.require(&[SessionState::Empty, SessionState::Locked], "import", "empty or locked")?;
        let batch = self.config.address_batch;
        let params = &self.config.params;

        let secrets = match source {
            ImportSource::Mnemonic(phrase) => {
                let normalized = normalize_phrase(phrase);
                let keys = derive_from_mnemonic(&normalized, batch, 0, self.config.account, params)?;
                WalletSecrets::Mnemonic {
                    phrase: normalized.to_string(),
                    next_index: batch,
                    keys,
                }
            }
            ImportSource::EncodedKey(wif) => WalletSecrets::RawPrivateKeys {
                keys: vec![key_from_encoded(wif.trim(), None, params)?],
            },
            ImportSource::SeedBackup(json) => {
                let info = parse_seed_backup(json)?;
                let seed = Seed::from_hex(&info.seed_hex)?;
                let declared = if info.next_index == 0 {
                    batch
                } else {
                    info.next_index
                };
                let count = batch.max(declared);
                let keys = derive_from_seed(&seed, count, 0, params)?;
                WalletSecrets::SeedBackup {
                    seed,
                    next_index: count,
                    keys,
                }
            }
        };
        self.install(secrets, passphrase, "import")
    }

    /// Import a BIP-39 phrase.
    pub fn import_mnemonic(
        &mut self,
        phrase: &str,
        passphrase: &str,
    ) -> Result<&WalletSecrets, WalletError> {
        self.import(&ImportSource::Mnemonic(Zeroizing::new(phrase.to_string())), passphrase)
    }

    /// Import a single WIF key.
    pub fn import_encoded_key(
        &mut self,
        encoded_key: &str,
        passphrase: &str,
    ) -> Result<&WalletSecrets, WalletError> {
        self.import(&ImportSource::EncodedKey(Zeroizing::new(encoded_key.to_string())), passphrase)
    }

    /// Import a node wallet `wallet.json`.
    pub fn import_seed_backup(
        &mut self,
        json_text: &str,
        passphrase: &str,
    ) -> Result<&WalletSecrets, WalletError> {
        self.import(&ImportSource::SeedBackup(Zeroizing::new(json_text.to_string())), passphrase)
    }

    /// Decrypt the stored wallet and derive its keys again.
    ///
    /// If the slot turns out to be empty the session becomes `Empty` and
    /// [`WalletError::NoStoredWallet`] is returned.
    pub fn unlock(&mut self, passphrase: &str) -> Result<(), WalletError> {
        self.require(&[SessionState::Locked], "unlock", "locked")?;
        let Some(blob) = self.store.load()? else {
            self.state = SessionState::Empty;
            return Err(WalletError::NoStoredWallet);
        };

        let persisted: PersistedWallet = encryption::open(passphrase, &blob)?;
        let secrets = WalletSecrets::from_persisted(
            &persisted,
            self.config.address_batch,
            self.config.account,
            &self.config.params,
        )?;
        let key_ring = KeyRing::from_keys(secrets.keys(), &self.config.params)?;

        info!(kind = secrets.kind(), keys = secrets.keys().len(), "wallet unlocked");
        self.live = Some(LiveWallet {
            secrets,
            key_ring,
            passphrase: Zeroizing::new(passphrase.to_string()),
        });
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Drop keys and passphrase from memory. A no-op unless `Ready`.
    pub fn lock(&mut self) {
        if self.state != SessionState::Ready {
            return;
        }
        self.live = None;
        self.state = SessionState::Locked;
        info!("wallet locked");
    }

    /// Derive one more address and persist.
    ///
    /// Fails with [`WalletError::CannotExtendImportedKey`] for imported keys.
    pub fn add_address(&mut self) -> Result<DerivedKey, WalletError> {
        self.require(&[SessionState::Ready], "add_address", "ready")?;
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| self.invalid_state("add_address", "ready"))?;

        let (secrets, new_key) = live.secrets.extended(self.config.account, &self.config.params)?;
        let blob = encryption::seal(live.passphrase.as_str(), &secrets.to_persisted(), self.config.kdf_iterations)?;
        self.store.persist(&blob)?;

        if let Some(live) = self.live.as_mut() {
            live.key_ring.insert(&new_key, &self.config.params)?;
            live.secrets = secrets;
        }
        info!(address = %new_key.address, "address added");
        Ok(new_key)
    }

    /// Erase the stored wallet and all in-memory state.
    ///
    /// Memory is wiped even if the store fails; the store error is then
    /// returned.
    pub fn clear(&mut self) -> Result<(), WalletError> {
        self.live = None;
        self.state = SessionState::Empty;
        self.store.clear()?;
        info!("wallet cleared");
        Ok(())
    }

    /// Render the backup file for the live secrets. Requires `Ready`.
    pub fn export_backup(&self) -> Result<Zeroizing<String>, WalletError> {
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| self.invalid_state("export_backup", "ready"))?;
        export_backup(&live.secrets)
    }

    fn install(
        &mut self,
        secrets: WalletSecrets,
        passphrase: &str,
        operation: &'static str,
    ) -> Result<&WalletSecrets, WalletError> {
        let key_ring = KeyRing::from_keys(secrets.keys(), &self.config.params)?;
        let blob = encryption::seal(passphrase, &secrets.to_persisted(), self.config.kdf_iterations)?;
        self.store.persist(&blob)?;

        info!(operation, kind = secrets.kind(), keys = secrets.keys().len(), "wallet ready");
        self.state = SessionState::Ready;
        let live = self.live.insert(LiveWallet {
            secrets,
            key_ring,
            passphrase: Zeroizing::new(passphrase.to_string()),
        });
        Ok(&live.secrets)
    }

    fn require(
        &self,
        allowed: &[SessionState],
        operation: &'static str,
        expected: &'static str,
    ) -> Result<(), WalletError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(operation, expected))
        }
    }

    fn invalid_state(&self, operation: &'static str, expected: &'static str) -> WalletError {
        WalletError::InvalidState {
            operation,
            expected,
            actual: self.state.as_str(),
        }
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("state", &self.state)
            .field("keys", &self.keys().len())
            .finish_non_exhaustive()
    }
}
