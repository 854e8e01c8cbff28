//! Adversarial property-based test suite for the Baseline light wallet.
//!
//! These tests try to break wallet invariants under randomized inputs:
//!
//! - Selection conserves value exactly and never emits dust change
//! - Selection takes the largest UTXOs first and never returns a partial plan
//! - Signed transactions pay exactly the planned fee and every input verifies
//! - Encryption round-trips and rejects wrong passphrases and tampering
//! - Key derivation is deterministic and independent of batch boundaries
//! - Backup parsing never panics on arbitrary input

use proptest::prelude::*;

use baseline_core::constants::{COIN, DUST_THRESHOLD};
use baseline_core::crypto::verify_p2pkh_input;
use baseline_tests::helpers::*;
use baseline_wallet::builder::{build_and_sign, BuildRequest};
use baseline_wallet::coin_selection::{estimate_legacy_size, fee_for_size, select_utxos};
use baseline_wallet::encryption::{decrypt, encrypt};
use baseline_wallet::fees::{effective_fee_rate, FeeMode, FeePolicy, FeePreset};
use baseline_wallet::keys::{derive_from_seed, KeyRing, Seed};
use baseline_wallet::{parse_seed_backup, WalletError};

const OWNER: &str = "Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8";

fn utxo_set(values: &[u64]) -> Vec<baseline_core::SpendableUtxo> {
    values
        .iter()
        .enumerate()
        .map(|(n, v)| utxo(n as u32, *v, OWNER))
        .collect()
}

// ---------------------------------------------------------------------------
// Coin selection
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn selection_conserves_value(
        values in prop::collection::vec(1u64..5 * COIN, 1..25),
        amount in 1u64..20 * COIN,
        rate in 1u64..100_000,
    ) {
        let utxos = utxo_set(&values);
        match select_utxos(&utxos, amount, rate) {
            Ok(plan) => {
                prop_assert_eq!(plan.total_in(), amount + plan.change + plan.fee);
                prop_assert!(plan.change == 0 || plan.change >= DUST_THRESHOLD);

                let n = plan.selected.len();
                let floor = fee_for_size(estimate_legacy_size(n, plan.output_count()), rate);
                prop_assert!(plan.fee >= floor);
                if plan.change > 0 {
                    prop_assert_eq!(plan.fee, floor);
                } else {
                    // Only sub-dust change is ever absorbed.
                    let two_output_fee = fee_for_size(estimate_legacy_size(n, 2), rate);
                    prop_assert!(plan.fee < two_output_fee + DUST_THRESHOLD);
                }
            }
            Err(WalletError::InsufficientFunds { have, need }) => {
                prop_assert_eq!(have, values.iter().sum::<u64>());
                prop_assert!(need > amount);
                // Even a change-bearing layout over every UTXO came up short.
                let widest_fee = fee_for_size(estimate_legacy_size(values.len(), 2), rate);
                prop_assert!(have < amount + widest_fee);
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn selection_takes_largest_first(
        values in prop::collection::vec(1u64..COIN, 1..25),
        amount in 1u64..5 * COIN,
    ) {
        let utxos = utxo_set(&values);
        if let Ok(plan) = select_utxos(&utxos, amount, 1_000) {
            let mut sorted = values.clone();
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            let picked: Vec<u64> = plan.selected.iter().map(|u| u.value).collect();
            prop_assert_eq!(&picked[..], &sorted[..picked.len()]);

            // One fewer input would not have covered the amount.
            let without_last: u64 = picked[..picked.len() - 1].iter().sum();
            prop_assert!(without_last < amount + fee_for_size(estimate_legacy_size(picked.len() - 1, 2), 1_000));
        }
    }

    #[test]
    fn selection_is_order_independent(
        mut values in prop::collection::vec(1u64..COIN, 1..15),
        amount in 1u64..3 * COIN,
    ) {
        let forward = select_utxos(&utxo_set(&values), amount, 2_000);
        values.reverse();
        let reversed = select_utxos(&utxo_set(&values), amount, 2_000);
        match (forward, reversed) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.fee, b.fee);
                prop_assert_eq!(a.change, b.change);
                prop_assert_eq!(a.selected.len(), b.selected.len());
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "diverged: {a:?} vs {b:?}"),
        }
    }

    #[test]
    fn fee_rates_never_below_relay_floor(
        base in prop::option::of(0u64..1_000_000),
        preset_index in 0usize..4,
        custom in 1u64..1_000_000,
    ) {
        let policy = FeePolicy::default();
        let auto = effective_fee_rate(base, FeeMode::Auto(FeePreset::ALL[preset_index]), &policy).unwrap();
        prop_assert!(auto.rate >= policy.min_relay_fee_rate);
        let custom_rate = effective_fee_rate(base, FeeMode::Custom { liners_per_kb: custom }, &policy).unwrap();
        prop_assert_eq!(custom_rate.rate, custom.max(policy.min_relay_fee_rate));
        prop_assert_eq!(custom_rate.clamped, custom < policy.min_relay_fee_rate);
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn signed_transactions_pay_planned_fee(
        seed in any::<[u8; 32]>(),
        values in prop::collection::vec(10_000u64..COIN, 1..8),
        amount in 1_000u64..2 * COIN,
        rate in 1_000u64..50_000,
        lock_time in prop::option::of(1u32..500_000_000),
    ) {
        let keys = derive_from_seed(&Seed::from_bytes(seed), 3, 0, &PARAMS).unwrap();
        let ring = KeyRing::from_keys(&keys, &PARAMS).unwrap();
        let utxos: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(n, v)| utxo(n as u32, *v, &keys[n % keys.len()].address))
            .collect();
        let request = BuildRequest {
            utxos: utxos.clone(),
            to_address: OWNER.into(),
            amount,
            change_address: keys[0].address.clone(),
            fee_rate_per_kb: rate,
            lock_time,
        };

        let plan = select_utxos(&utxos, amount, rate);
        let signed = build_and_sign(&request, &ring);
        match (plan, signed) {
            (Ok(plan), Ok(signed)) => {
                prop_assert_eq!(signed.fee, plan.fee);
                prop_assert_eq!(signed.change, plan.change);
                prop_assert_eq!(signed.tx.input.len(), plan.selected.len());
                prop_assert_eq!(signed.tx.output[0].value.to_sat(), amount);

                let total_out: u64 = signed.tx.output.iter().map(|o| o.value.to_sat()).sum();
                prop_assert_eq!(plan.total_in() - total_out, signed.fee);
                prop_assert_eq!(signed.tx.lock_time.to_consensus_u32(), lock_time.unwrap_or(0));
                // Real signature sizes never exceed the size estimate.
                prop_assert!(signed.vsize as u64 <= estimate_legacy_size(plan.selected.len(), plan.output_count()));

                for (index, input) in signed.tx.input.iter().enumerate() {
                    let spent = utxos.iter().find(|u| u.outpoint() == input.previous_output).unwrap();
                    prop_assert!(verify_p2pkh_input(&signed.tx, index, &spent.script_pubkey).is_ok());
                }
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "builder and selector disagree: {:?} / {:?}", a.map(|p| p.fee), b.map(|s| s.fee)),
        }
    }

    #[test]
    fn derivation_is_deterministic_and_batch_independent(
        seed in any::<[u8; 32]>(),
        start in 0u32..1_000,
        count in 1u32..6,
    ) {
        let seed = Seed::from_bytes(seed);
        let batch = derive_from_seed(&seed, count, start, &PARAMS).unwrap();
        let again = derive_from_seed(&seed, count, start, &PARAMS).unwrap();
        prop_assert_eq!(&batch, &again);
        for (offset, key) in batch.iter().enumerate() {
            let single = derive_from_seed(&seed, 1, start + offset as u32, &PARAMS).unwrap();
            prop_assert_eq!(&single[0], key);
        }
        let ring = KeyRing::from_keys(&batch, &PARAMS).unwrap();
        prop_assert_eq!(ring.len(), batch.len());
    }
}

// ---------------------------------------------------------------------------
// Encryption and backups
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn encryption_round_trips(
        passphrase in "[ -~]{1,32}",
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let blob = encrypt(&passphrase, &plaintext, 10).unwrap();
        prop_assert_eq!(blob.iterations, 10);
        let decrypted = decrypt(&passphrase, &blob).unwrap();
        prop_assert_eq!(decrypted.as_slice(), plaintext.as_slice());

        let wrong = format!("{passphrase}!");
        prop_assert_eq!(decrypt(&wrong, &blob).unwrap_err(), WalletError::DecryptionFailed);
    }

    #[test]
    fn tampered_ciphertext_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 1..128),
        flip in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut blob = encrypt("pw", &plaintext, 10).unwrap();
        let i = flip.index(blob.ciphertext.len());
        blob.ciphertext[i] ^= 1 << bit;
        prop_assert_eq!(decrypt("pw", &blob).unwrap_err(), WalletError::DecryptionFailed);

        let json = encrypt("pw", &plaintext, 10).unwrap().to_json().unwrap();
        let reparsed = baseline_wallet::EncryptedBlob::from_json(&json).unwrap();
        let decrypted = decrypt("pw", &reparsed).unwrap();
        prop_assert_eq!(decrypted.as_slice(), plaintext.as_slice());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn backup_parser_never_panics(input in ".{0,200}") {
        let _ = parse_seed_backup(&input);
    }

    #[test]
    fn backup_index_is_at_least_address_count(
        declared in 0u32..50,
        listed in 0usize..50,
        as_string in any::<bool>(),
    ) {
        let addresses: Vec<String> = (0..listed).map(|i| format!("\"N{i}\":{{}}")).collect();
        let index = if as_string { format!("\"{declared}\"") } else { declared.to_string() };
        let json = format!(
            "{{\"seed\":\"{SEED_HEX}\",\"nextIndex\":{index},\"addresses\":{{{}}}}}",
            addresses.join(",")
        );
        let info = parse_seed_backup(&json).unwrap();
        prop_assert_eq!(info.next_index, declared.max(listed as u32));
        prop_assert_eq!(info.seed_hex.as_str(), SEED_HEX);
    }
}
