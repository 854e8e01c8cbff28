//! Greedy largest-first coin selection for legacy P2PKH transactions.
//!
//! UTXOs are taken in descending value order until the inputs cover the
//! amount plus the fee for the transaction size at that point. Change below
//! the dust threshold is not emitted; it is absorbed into the fee. The result
//! is deterministic and minimizes input count, at the cost of occasionally
//! overpaying the fee by less than one dust unit.

use baseline_core::constants::NetworkParams;
use baseline_core::types::SpendableUtxo;
use tracing::debug;

use crate::error::WalletError;

/// Fixed transaction overhead in bytes (version, counts, lock time).
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Size of one signed P2PKH input.
pub const P2PKH_INPUT_BYTES: u64 = 148;

/// Size of one P2PKH output.
pub const P2PKH_OUTPUT_BYTES: u64 = 34;

/// Estimated size of a legacy P2PKH transaction in bytes.
pub fn estimate_legacy_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES + P2PKH_INPUT_BYTES * inputs as u64 + P2PKH_OUTPUT_BYTES * outputs as u64
}

/// Fee for `size` bytes at `rate` liners per kB, rounded up.
pub fn fee_for_size(size: u64, fee_rate_per_kb: u64) -> u64 {
    let product = u128::from(size) * u128::from(fee_rate_per_kb);
    u64::try_from(product.div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Inputs chosen for a spend and how their value divides up.
///
/// `sum(selected.value) == amount + change + fee` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    /// Selected UTXOs in the order they become inputs.
    pub selected: Vec<SpendableUtxo>,
    /// Change output value; 0 means no change output.
    pub change: u64,
    /// Fee in liners, including any absorbed sub-dust change.
    pub fee: u64,
}

impl SpendPlan {
    /// Total value of the selected inputs, saturating at `u64::MAX`.
    pub fn total_in(&self) -> u64 {
        self.selected.iter().fold(0, |acc, u| acc.saturating_add(u.value))
    }

    /// Number of outputs the transaction will have.
    pub fn output_count(&self) -> usize {
        if self.change > 0 { 2 } else { 1 }
    }
}

/// Largest-first coin selector.
#[derive(Debug, Clone, Copy)]
pub struct CoinSelector {
    dust_threshold: u64,
}

impl CoinSelector {
    /// Selector using the network's dust threshold.
    pub fn new(params: &NetworkParams) -> Self {
        Self {
            dust_threshold: params.dust_threshold,
        }
    }

    /// Select UTXOs to pay `amount` at `fee_rate_per_kb`.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] when every UTXO together
    /// cannot cover the amount plus fee; no partial plan is returned.
    pub fn select(
        &self,
        utxos: &[SpendableUtxo],
        amount: u64,
        fee_rate_per_kb: u64,
    ) -> Result<SpendPlan, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }

        let mut sorted: Vec<&SpendableUtxo> = utxos.iter().collect();
        sorted.sort_by(|a, b| b.value.cmp(&a.value));

        let dust = i128::from(self.dust_threshold);
        let target = i128::from(amount);
        let mut total: i128 = 0;
        let mut last_fee = fee_for_size(estimate_legacy_size(1, 1), fee_rate_per_kb);

        for (taken, utxo) in sorted.iter().enumerate() {
            let inputs = taken + 1;
            total += i128::from(utxo.value);

            let single_fee = fee_for_size(estimate_legacy_size(inputs, 1), fee_rate_per_kb);
            let tentative_change = total - target - i128::from(single_fee);
            let outputs = if tentative_change >= dust { 2 } else { 1 };

            let fee = fee_for_size(estimate_legacy_size(inputs, outputs), fee_rate_per_kb);
            last_fee = fee;
            let change = total - target - i128::from(fee);
            if change < 0 {
                continue;
            }

            let change = if change >= dust { change } else { 0 };
            let plan = SpendPlan {
                selected: sorted[..inputs].iter().map(|u| (*u).clone()).collect(),
                change: to_liners(change)?,
                fee: to_liners(total - target - change)?,
            };
            debug!(
                inputs,
                change = plan.change,
                fee = plan.fee,
                "coin selection complete"
            );
            return Ok(plan);
        }

        let have = to_liners(total)?;
        Err(WalletError::InsufficientFunds {
            have,
            need: amount.saturating_add(last_fee),
        })
    }
}

fn to_liners(value: i128) -> Result<u64, WalletError> {
    u64::try_from(value).map_err(|_| WalletError::InvalidAmount("value out of range".into()))
}

/// Select with the default network parameters.
pub fn select_utxos(
    utxos: &[SpendableUtxo],
    amount: u64,
    fee_rate_per_kb: u64,
) -> Result<SpendPlan, WalletError> {
    CoinSelector::new(&NetworkParams::BASELINE).select(utxos, amount, fee_rate_per_kb)
}
