//! # baseline-wallet
//! Non-custodial light wallet engine.
//!
//! Derives keys from a BIP-39 phrase, a raw node-wallet seed or imported WIF
//! keys, keeps them encrypted at rest, selects coins, and builds and signs
//! legacy P2PKH transactions. Chain data comes in through [`ChainSource`].
//!
//! # Modules
//!
//! - [`error`]: `WalletError` and its recovery classes
//! - [`mnemonic`]: BIP-39 generation and validation
//! - [`keys`]: BIP-44 and raw-seed derivation, `KeyRing`
//! - [`secrets`]: live secrets and their persisted form
//! - [`encryption`]: PBKDF2 + AES-256-GCM blobs
//! - [`storage`]: the single encrypted slot
//! - [`backup`]: node wallet backup parsing and export
//! - [`coin_selection`]: largest-first selection with dust absorption
//! - [`builder`]: transaction assembly and signing
//! - [`fees`]: fee presets and the relay floor
//! - [`chain`]: remote node contract and UTXO paging
//! - [`send`]: end-to-end payment preparation
//! - [`session`]: the wallet state machine
//! - [`worker`]: blocking-pool offload and `AsyncSession`

pub mod backup;
pub mod builder;
pub mod chain;
pub mod coin_selection;
pub mod encryption;
pub mod error;
pub mod fees;
pub mod keys;
pub mod mnemonic;
pub mod secrets;
pub mod send;
pub mod session;
pub mod storage;
pub mod worker;

// Re-exports for convenient access
pub use backup::{export_backup, parse_seed_backup, SeedBackupInfo};
pub use builder::{build_and_sign, BuildRequest, SignedTransaction, TransactionBuilder};
pub use chain::{collect_utxos_for_spend, ChainSource, FeeEstimate};
pub use coin_selection::{select_utxos, CoinSelector, SpendPlan};
pub use encryption::{decrypt, encrypt, EncryptedBlob};
pub use error::{ErrorKind, WalletError};
pub use fees::{effective_fee_rate, FeeDecision, FeeMode, FeePolicy, FeePreset};
pub use keys::{DerivedKey, KeyRing, Seed};
pub use secrets::{PersistedWallet, WalletSecrets};
pub use send::{broadcast, prepare_send, prepare_send_shared, PreparedSend, SendPolicy, SendRequest};
pub use session::{ImportSource, SessionConfig, SessionState, WalletSession};
pub use storage::{FileStore, MemoryStore, SecretStore};
pub use worker::{offload, AsyncSession};
