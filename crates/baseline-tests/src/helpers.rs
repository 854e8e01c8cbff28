//! Shared test helpers for E2E and integration tests.

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize;
use bitcoin::Transaction;
use parking_lot::Mutex;

use baseline_core::address::script_for_address;
use baseline_core::constants::NetworkParams;
use baseline_core::types::SpendableUtxo;
use baseline_wallet::chain::{ChainSource, FeeEstimate};
use baseline_wallet::session::SessionConfig;
use baseline_wallet::WalletError;

pub const PARAMS: NetworkParams = NetworkParams::BASELINE;

/// The all-`abandon` BIP-39 test phrase.
pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

/// A fixed node wallet seed.
pub const SEED_HEX: &str = "0f0e0d0c0b0a090807060504030201000102030405060708090a0b0c0d0e0f00";

/// Session config with a cheap KDF.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        kdf_iterations: 1_000,
        ..SessionConfig::default()
    }
}

/// A UTXO paying `address`, with a distinct txid per `n`.
pub fn utxo(n: u32, value: u64, address: &str) -> SpendableUtxo {
    let script = script_for_address(address, &PARAMS).unwrap();
    SpendableUtxo::from_hex_parts(
        &format!("{:064x}", u64::from(n) + 1),
        n,
        value,
        &hex::encode(script.as_bytes()),
        address,
    )
    .unwrap()
}

/// Sum of UTXO values.
pub fn total(utxos: &[SpendableUtxo]) -> u64 {
    utxos.iter().map(|u| u.value).sum()
}

/// A minimal node: an address-indexed UTXO set that applies broadcasts.
///
/// Broadcast transactions spend their inputs and credit outputs paying a
/// watched address. Nothing checks signatures; tests do that themselves.
#[derive(Default)]
pub struct SimulatedNode {
    utxos: Mutex<Vec<SpendableUtxo>>,
    watched: Mutex<Vec<String>>,
    fee_rate: Mutex<Option<u64>>,
    broadcasts: Mutex<Vec<Transaction>>,
    queries: Mutex<Vec<(usize, usize)>>,
    next_funding: Mutex<u32>,
}

impl SimulatedNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a fresh UTXO to `address` and watch it.
    pub fn fund(&self, address: &str, value: u64) -> SpendableUtxo {
        let mut n = self.next_funding.lock();
        *n += 1;
        let u = utxo(0x1000_0000 + *n, value, address);
        self.utxos.lock().push(u.clone());
        self.watch(address);
        u
    }

    /// Credit future outputs paying `address`.
    pub fn watch(&self, address: &str) {
        let mut watched = self.watched.lock();
        if !watched.iter().any(|a| a == address) {
            watched.push(address.to_string());
        }
    }

    pub fn set_fee_rate(&self, rate: Option<u64>) {
        *self.fee_rate.lock() = rate;
    }

    pub fn utxos_for(&self, address: &str) -> Vec<SpendableUtxo> {
        self.utxos
            .lock()
            .iter()
            .filter(|u| u.address == address)
            .cloned()
            .collect()
    }

    pub fn balance(&self, address: &str) -> u64 {
        total(&self.utxos_for(address))
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().clone()
    }

    /// `(limit, offset)` of every UTXO query.
    pub fn queries(&self) -> Vec<(usize, usize)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ChainSource for SimulatedNode {
    async fn get_utxos(
        &self,
        addresses: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SpendableUtxo>, WalletError> {
        self.queries.lock().push((limit, offset));
        Ok(self
            .utxos
            .lock()
            .iter()
            .filter(|u| addresses.contains(&u.address))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn broadcast_transaction(&self, hex: &str) -> Result<String, WalletError> {
        let bytes = hex::decode(hex).map_err(|e| WalletError::Chain(e.to_string()))?;
        let tx: Transaction = deserialize(&bytes).map_err(|e| WalletError::Chain(e.to_string()))?;
        let txid = tx.compute_txid();

        let mut utxos = self.utxos.lock();
        for input in &tx.input {
            let before = utxos.len();
            utxos.retain(|u| u.outpoint() != input.previous_output);
            if utxos.len() == before {
                return Err(WalletError::Chain("bad-txns-inputs-missingorspent".into()));
            }
        }
        let watched = self.watched.lock();
        for (vout, output) in tx.output.iter().enumerate() {
            let owner = watched.iter().find(|a| {
                script_for_address(a, &PARAMS).is_ok_and(|s| s == output.script_pubkey)
            });
            if let Some(address) = owner {
                utxos.push(SpendableUtxo {
                    txid,
                    vout: vout as u32,
                    value: output.value.to_sat(),
                    script_pubkey: output.script_pubkey.clone(),
                    address: address.clone(),
                });
            }
        }
        drop(watched);
        drop(utxos);

        self.broadcasts.lock().push(tx);
        Ok(txid.to_string())
    }

    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<FeeEstimate, WalletError> {
        let rate = *self.fee_rate.lock();
        Ok(FeeEstimate {
            feerate_liners_per_kb: rate,
            blocks: target_blocks,
            errors: if rate.is_none() {
                vec!["Insufficient data or no feerate found".into()]
            } else {
                vec![]
            },
        })
    }
}
