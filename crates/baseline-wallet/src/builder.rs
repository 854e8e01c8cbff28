//! Legacy P2PKH transaction assembly and signing.
//!
//! Building happens in two steps:
//! 1. [`TransactionBuilder::build`] runs coin selection and lays out inputs
//!    and outputs with empty unlocking scripts.
//! 2. [`TransactionBuilder::sign`] signs every input with the key owning the
//!    spent UTXO's address and serializes the result.
//!
//! Nothing here touches the network; the output is a pure function of the
//! supplied UTXOs and keys.

use baseline_core::address::script_for_address;
use baseline_core::constants::NetworkParams;
use baseline_core::crypto::p2pkh_script_sig;
use baseline_core::types::SpendableUtxo;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tracing::debug;

use crate::coin_selection::{CoinSelector, SpendPlan};
use crate::error::WalletError;
use crate::keys::KeyRing;

/// What to pay, where change goes and which UTXOs may fund it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Candidate UTXOs; coin selection picks from these.
    pub utxos: Vec<SpendableUtxo>,
    pub to_address: String,
    /// Amount to pay in liners.
    pub amount: u64,
    pub change_address: String,
    pub fee_rate_per_kb: u64,
    /// When set, every input opts into lock time with sequence `0xfffffffe`.
    pub lock_time: Option<u32>,
}

/// A fully signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Consensus-serialized transaction, lowercase hex.
    pub hex: String,
    pub txid: Txid,
    /// `sum(inputs) - sum(outputs)` in liners.
    pub fee: u64,
    /// Virtual size in bytes.
    pub vsize: usize,
    /// Change output value, 0 if none.
    pub change: u64,
    pub inputs_used: usize,
    pub lock_time: Option<u32>,
    pub tx: Transaction,
}

/// A transaction with inputs and outputs laid out but not yet signed.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub tx: Transaction,
    /// The coin selection behind the inputs.
    pub plan: SpendPlan,
    /// Amount paid to the recipient.
    pub amount: u64,
    pub lock_time: Option<u32>,
}

/// Builds and signs legacy P2PKH transactions for one network.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    params: NetworkParams,
}

impl TransactionBuilder {
    pub fn new(params: NetworkParams) -> Self {
        Self { params }
    }

    /// Select coins and lay out the transaction.
    ///
    /// Fails with [`WalletError::UnresolvableAddress`] if the recipient (or
    /// the change address, when change is produced) is not a P2PKH address
    /// on this network.
    pub fn build(&self, request: &BuildRequest) -> Result<UnsignedTransaction, WalletError> {
        let to_script = self.resolve(&request.to_address)?;
        let plan = CoinSelector::new(&self.params).select(
            &request.utxos,
            request.amount,
            request.fee_rate_per_kb,
        )?;

        let sequence = if request.lock_time.is_some() {
            Sequence::ENABLE_LOCKTIME_NO_RBF
        } else {
            Sequence::MAX
        };
        let input = plan
            .selected
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::default(),
            })
            .collect();

        let mut output = Vec::with_capacity(plan.output_count());
        output.push(TxOut {
            value: Amount::from_sat(request.amount),
            script_pubkey: to_script,
        });
        if plan.change > 0 {
            output.push(TxOut {
                value: Amount::from_sat(plan.change),
                script_pubkey: self.resolve(&request.change_address)?,
            });
        }

        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::from_consensus(request.lock_time.unwrap_or(0)),
            input,
            output,
        };
        checked_fee(&plan, &tx)?;

        Ok(UnsignedTransaction {
            tx,
            plan,
            amount: request.amount,
            lock_time: request.lock_time,
        })
    }

    /// Sign every input and serialize.
    ///
    /// Each input is signed by the key owning its UTXO's address. The
    /// previous output script is the UTXO's own script, or the address's
    /// P2PKH script when the chain source supplied none. Fails without
    /// partial output if any key is missing.
    pub fn sign(
        &self,
        unsigned: UnsignedTransaction,
        key_ring: &KeyRing,
    ) -> Result<SignedTransaction, WalletError> {
        let UnsignedTransaction {
            mut tx,
            plan,
            amount,
            lock_time,
        } = unsigned;

        let mut script_sigs = Vec::with_capacity(plan.selected.len());
        for (index, utxo) in plan.selected.iter().enumerate() {
            let keypair = key_ring
                .get(&utxo.address)
                .ok_or_else(|| WalletError::MissingSigningKey(utxo.address.clone()))?;
            let prev_script = if utxo.script_pubkey.is_empty() {
                self.resolve(&utxo.address)?
            } else {
                utxo.script_pubkey.clone()
            };
            script_sigs.push(p2pkh_script_sig(&tx, index, &prev_script, keypair)?);
        }
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        let fee = checked_fee(&plan, &tx)?;
        debug_assert_eq!(fee, plan.fee);
        debug_assert_eq!(tx.output[0].value.to_sat(), amount);

        let signed = SignedTransaction {
            hex: serialize_hex(&tx),
            txid: tx.compute_txid(),
            fee,
            vsize: tx.vsize(),
            change: plan.change,
            inputs_used: plan.selected.len(),
            lock_time,
            tx,
        };
        debug!(
            txid = %signed.txid,
            inputs = signed.inputs_used,
            fee = signed.fee,
            vsize = signed.vsize,
            "signed transaction"
        );
        Ok(signed)
    }

    fn resolve(&self, address: &str) -> Result<ScriptBuf, WalletError> {
        script_for_address(address, &self.params).map_err(|e| WalletError::unresolvable(address, e))
    }
}

/// `sum(inputs) - sum(outputs)`, rejecting values that overflow a `u64`.
fn checked_fee(plan: &SpendPlan, tx: &Transaction) -> Result<u64, WalletError> {
    let total_in = plan
        .selected
        .iter()
        .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.value));
    let total_out = tx
        .output
        .iter()
        .try_fold(0u64, |acc, out| acc.checked_add(out.value.to_sat()));
    total_in
        .zip(total_out)
        .and_then(|(total_in, total_out)| total_in.checked_sub(total_out))
        .ok_or_else(|| WalletError::InvalidAmount("transaction value out of range".into()))
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new(NetworkParams::BASELINE)
    }
}

/// Select, build and sign in one step on the Baseline network.
pub fn build_and_sign(
    request: &BuildRequest,
    key_ring: &KeyRing,
) -> Result<SignedTransaction, WalletError> {
    let builder = TransactionBuilder::default();
    let unsigned = builder.build(request)?;
    builder.sign(unsigned, key_ring)
}
