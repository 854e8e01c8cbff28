//! # baseline-core
//! Foundation types and primitives for the Baseline light wallet.
//!
//! Everything here is a pure function of its inputs and the immutable
//! [`NetworkParams`](constants::NetworkParams) table. Wallet state, storage and
//! networking live in `baseline-wallet`.

pub mod address;
pub mod amount;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;

pub use address::Address;
pub use constants::{NetworkParams, COIN};
pub use crypto::KeyPair;
pub use types::SpendableUtxo;
