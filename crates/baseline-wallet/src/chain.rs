//! The remote node as seen by the wallet.
//!
//! [`ChainSource`] is the only way UTXOs, fee estimates and broadcasts reach
//! the wallet. Implementations own their transport, timeouts and retries.

use async_trait::async_trait;
use tracing::debug;

use baseline_core::constants::NetworkParams;
use baseline_core::types::SpendableUtxo;

use crate::coin_selection::CoinSelector;
use crate::error::WalletError;

/// Page size used when collecting UTXOs for a spend.
pub const DEFAULT_UTXO_PAGE_SIZE: usize = 500;

/// Result of a fee estimate request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    /// Estimated rate in liners per kB, `None` if the node had no estimate.
    pub feerate_liners_per_kb: Option<u64>,
    /// Confirmation target the estimate applies to.
    pub blocks: u32,
    /// Warnings reported by the node.
    pub errors: Vec<String>,
}

/// A provider of chain data and a broadcast sink.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// UTXOs paying `addresses`, paginated by `limit` and `offset`.
    async fn get_utxos(
        &self,
        addresses: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SpendableUtxo>, WalletError>;

    /// Submit a serialized transaction; returns its txid.
    async fn broadcast_transaction(&self, hex: &str) -> Result<String, WalletError>;

    /// Fee rate estimate for confirmation within `target_blocks`.
    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<FeeEstimate, WalletError>;
}

/// Fetch UTXO pages until coin selection succeeds.
///
/// After each page the accumulated set is run through selection. Paging
/// continues only while selection reports insufficient funds and the page
/// was full; any other outcome ends the loop. Returns every UTXO fetched.
pub async fn collect_utxos_for_spend(
    source: &dyn ChainSource,
    addresses: &[String],
    amount: u64,
    fee_rate_per_kb: u64,
    page_size: usize,
    params: &NetworkParams,
) -> Result<Vec<SpendableUtxo>, WalletError> {
    let page_size = page_size.max(1);
    let selector = CoinSelector::new(params);
    let mut offset = 0;
    let mut all = Vec::new();

    loop {
        let page = source.get_utxos(addresses, page_size, offset).await?;
        let fetched = page.len();
        all.extend(page);
        debug!(offset, fetched, total = all.len(), "fetched utxo page");

        match selector.select(&all, amount, fee_rate_per_kb) {
            Ok(_) => return Ok(all),
            Err(WalletError::InsufficientFunds { .. }) if fetched == page_size => {
                offset += page_size;
            }
            Err(e) => return Err(e),
        }
    }
}
