//! Send flow: fee resolution, UTXO collection, signing and broadcast.
//!
//! [`prepare_send`] produces a signed transaction for review without
//! touching the network beyond reads; [`broadcast`] submits it.

use std::sync::Arc;

use tracing::{info, warn};

use baseline_core::constants::NetworkParams;

use crate::builder::{BuildRequest, SignedTransaction};
use crate::chain::{collect_utxos_for_spend, ChainSource, FeeEstimate, DEFAULT_UTXO_PAGE_SIZE};
use crate::error::WalletError;
use crate::fees::{effective_fee_rate, FeeDecision, FeeMode, FeePolicy};
use crate::keys::KeyRing;
use crate::worker::sign_transaction;

/// Knobs for the send flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    /// Confirmation target passed to the fee estimator.
    pub fee_target_blocks: u32,
    /// UTXO page size.
    pub page_size: usize,
    pub fees: FeePolicy,
    pub params: NetworkParams,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            fee_target_blocks: 6,
            page_size: DEFAULT_UTXO_PAGE_SIZE,
            fees: FeePolicy::default(),
            params: NetworkParams::BASELINE,
        }
    }
}

/// A payment to prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub to_address: String,
    /// Amount in liners.
    pub amount: u64,
    /// Spend only from this address instead of every wallet address.
    pub from_address: Option<String>,
    /// Defaults to the wallet's first address.
    pub change_address: Option<String>,
    pub fee_mode: FeeMode,
    pub lock_time: Option<u32>,
}

/// A signed transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSend {
    pub signed: SignedTransaction,
    pub fee: FeeDecision,
    /// The node's estimate the rate was derived from, if any.
    pub base_fee_rate: Option<u64>,
    pub to_address: String,
    pub amount: u64,
}

/// Build and sign a payment from the wallet's UTXOs.
///
/// A failed fee estimate falls back to the policy's fallback rate. UTXOs
/// reported for addresses the key ring cannot sign for are dropped. Signing
/// runs on the blocking pool against a copy of `key_ring`.
pub async fn prepare_send(
    source: &dyn ChainSource,
    key_ring: &KeyRing,
    request: &SendRequest,
    policy: &SendPolicy,
) -> Result<PreparedSend, WalletError> {
    prepare_send_shared(source, Arc::new(key_ring.clone()), request, policy).await
}

/// [`prepare_send`] over a key ring the caller already shares.
pub async fn prepare_send_shared(
    source: &dyn ChainSource,
    key_ring: Arc<KeyRing>,
    request: &SendRequest,
    policy: &SendPolicy,
) -> Result<PreparedSend, WalletError> {
    if request.amount == 0 {
        return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
    }
    let change_address = match &request.change_address {
        Some(address) if !address.trim().is_empty() => address.trim().to_string(),
        _ => key_ring
            .first_address()
            .map(str::to_string)
            .ok_or_else(|| WalletError::InsufficientFunds {
                have: 0,
                need: request.amount,
            })?,
    };

    let base_fee_rate = refresh_estimate(source, policy.fee_target_blocks).await;
    let fee = effective_fee_rate(base_fee_rate, request.fee_mode, &policy.fees)?;

    let addresses: Vec<String> = match &request.from_address {
        Some(from) if !from.trim().is_empty() => vec![from.trim().to_string()],
        _ => key_ring.addresses().map(str::to_string).collect(),
    };
    let utxos = collect_utxos_for_spend(
        source,
        &addresses,
        request.amount,
        fee.rate,
        policy.page_size,
        &policy.params,
    )
    .await?;

    let fetched = utxos.len();
    let spendable: Vec<_> = utxos
        .into_iter()
        .filter(|u| key_ring.contains(&u.address))
        .collect();
    if spendable.is_empty() {
        return Err(WalletError::InsufficientFunds {
            have: 0,
            need: request.amount,
        });
    }
    if spendable.len() < fetched {
        warn!(
            dropped = fetched - spendable.len(),
            "ignoring utxos without a signing key"
        );
    }

    let build = BuildRequest {
        utxos: spendable,
        to_address: request.to_address.trim().to_string(),
        amount: request.amount,
        change_address,
        fee_rate_per_kb: fee.rate,
        lock_time: request.lock_time,
    };
    let to_address = build.to_address.clone();
    let signed = sign_transaction(build, key_ring, policy.params).await?;

    Ok(PreparedSend {
        signed,
        fee,
        base_fee_rate,
        to_address,
        amount: request.amount,
    })
}

/// Broadcast a prepared transaction; returns the node's txid.
pub async fn broadcast(source: &dyn ChainSource, prepared: &PreparedSend) -> Result<String, WalletError> {
    let txid = source.broadcast_transaction(&prepared.signed.hex).await?;
    info!(%txid, amount = prepared.amount, fee = prepared.signed.fee, "transaction broadcast");
    Ok(txid)
}

/// Query the fee estimator, logging and discarding failures.
pub async fn refresh_estimate(source: &dyn ChainSource, target_blocks: u32) -> Option<u64> {
    match source.estimate_fee_rate(target_blocks).await {
        Ok(FeeEstimate {
            feerate_liners_per_kb: Some(rate),
            ..
        }) => Some(rate),
        Ok(FeeEstimate { errors, .. }) => {
            warn!(errors = ?errors, "no fee estimate, using fallback");
            None
        }
        Err(e) => {
            warn!(error = %e, "fee estimate failed, using fallback");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{utxo, MockChain};
    use crate::fees::FeePreset;
    use crate::keys::derive_from_raw_seed;
    use baseline_core::address::script_for_address;
    use baseline_core::crypto::verify_p2pkh_input;

    const PARAMS: NetworkParams = NetworkParams::BASELINE;
    const SEED_HEX: &str = "0f0e0d0c0b0a090807060504030201000102030405060708090a0b0c0d0e0f00";
    const RECIPIENT: &str = "Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8";

    fn ring() -> (KeyRing, Vec<String>) {
        let keys = derive_from_raw_seed(SEED_HEX, 3, 0, &PARAMS).unwrap();
        let addresses = keys.iter().map(|k| k.address.clone()).collect();
        (KeyRing::from_keys(&keys, &PARAMS).unwrap(), addresses)
    }

    fn request(amount: u64) -> SendRequest {
        SendRequest {
            to_address: RECIPIENT.into(),
            amount,
            from_address: None,
            change_address: None,
            fee_mode: FeeMode::Auto(FeePreset::Standard),
            lock_time: None,
        }
    }

    fn estimate(rate: u64) -> Option<Result<FeeEstimate, WalletError>> {
        Some(Ok(FeeEstimate {
            feerate_liners_per_kb: Some(rate),
            blocks: 6,
            errors: vec![],
        }))
    }

    #[tokio::test]
    async fn prepares_signed_transaction_with_estimate() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 1_000_000, &addrs[1])],
            estimate: estimate(10_000),
            ..MockChain::default()
        };
        let prepared = prepare_send(&chain, &ring, &request(400_000), &SendPolicy::default())
            .await
            .unwrap();
        assert_eq!(prepared.base_fee_rate, Some(10_000));
        assert_eq!(prepared.fee, FeeDecision { rate: 10_000, clamped: false });
        assert_eq!(prepared.signed.fee, 2_260);

        let tx = &prepared.signed.tx;
        assert_eq!(tx.output[1].script_pubkey, script_for_address(&addrs[0], &PARAMS).unwrap());
        verify_p2pkh_input(tx, 0, &script_for_address(&addrs[1], &PARAMS).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn failed_estimate_falls_back_and_clamps() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 1_000_000, &addrs[0])],
            estimate: Some(Err(WalletError::Chain("timeout".into()))),
            ..MockChain::default()
        };
        let mut req = request(400_000);
        req.fee_mode = FeeMode::Auto(FeePreset::Eco);
        let prepared = prepare_send(&chain, &ring, &req, &SendPolicy::default()).await.unwrap();
        assert_eq!(prepared.base_fee_rate, None);
        assert_eq!(prepared.fee, FeeDecision { rate: 5_000, clamped: true });
    }

    #[tokio::test]
    async fn from_address_restricts_query() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 900_000, &addrs[0]), utxo(1, 500_000, &addrs[2])],
            ..MockChain::default()
        };
        let mut req = request(100_000);
        req.from_address = Some(addrs[2].clone());
        let prepared = prepare_send(&chain, &ring, &req, &SendPolicy::default()).await.unwrap();
        assert_eq!(chain.calls.lock()[0].0, vec![addrs[2].clone()]);
        assert_eq!(prepared.signed.tx.input[0].previous_output, utxo(1, 0, "").outpoint());
    }

    #[tokio::test]
    async fn utxos_without_signing_key_are_dropped() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 5_000_000, RECIPIENT), utxo(1, 900_000, &addrs[0])],
            ..MockChain::default()
        };
        let mut req = request(100_000);
        req.from_address = Some(RECIPIENT.into());
        let err = prepare_send(&chain, &ring, &req, &SendPolicy::default()).await.unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 0, need: 100_000 });
    }

    #[tokio::test]
    async fn custom_change_address_and_lock_time() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 1_000_000, &addrs[0])],
            ..MockChain::default()
        };
        let mut req = request(100_000);
        req.change_address = Some(addrs[2].clone());
        req.lock_time = Some(777);
        req.fee_mode = FeeMode::Custom { liners_per_kb: 20_000 };
        let prepared = prepare_send(&chain, &ring, &req, &SendPolicy::default()).await.unwrap();
        let tx = &prepared.signed.tx;
        assert_eq!(tx.output[1].script_pubkey, script_for_address(&addrs[2], &PARAMS).unwrap());
        assert_eq!(tx.lock_time.to_consensus_u32(), 777);
        assert_eq!(prepared.fee.rate, 20_000);
    }

    #[tokio::test]
    async fn insufficient_funds_surface() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 10_000, &addrs[0])],
            ..MockChain::default()
        };
        let err = prepare_send(&chain, &ring, &request(50_000), &SendPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { have: 10_000, .. }));
    }

    #[tokio::test]
    async fn broadcast_submits_hex() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 1_000_000, &addrs[0])],
            broadcast_result: Some(Ok("ab".repeat(32))),
            ..MockChain::default()
        };
        let prepared = prepare_send(&chain, &ring, &request(100_000), &SendPolicy::default())
            .await
            .unwrap();
        let txid = broadcast(&chain, &prepared).await.unwrap();
        assert_eq!(txid, "ab".repeat(32));
        assert_eq!(chain.broadcasts.lock().as_slice(), [prepared.signed.hex.clone()]);
    }

    #[tokio::test]
    async fn broadcast_rejection_propagates() {
        let (ring, addrs) = ring();
        let chain = MockChain {
            utxos: vec![utxo(0, 1_000_000, &addrs[0])],
            broadcast_result: Some(Err(WalletError::Chain("bad-txns-inputs-missingorspent".into()))),
            ..MockChain::default()
        };
        let prepared = prepare_send(&chain, &ring, &request(100_000), &SendPolicy::default())
            .await
            .unwrap();
        assert!(matches!(broadcast(&chain, &prepared).await, Err(WalletError::Chain(_))));
    }
}
