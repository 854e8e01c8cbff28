//! End-to-end tests for the Baseline light wallet.
//!
//! Each test drives real sessions through create/import/unlock and pays
//! between wallets on a [`SimulatedNode`], checking balances on the node and
//! every input signature on the wire.

use std::sync::Arc;

use baseline_core::address::script_for_address;
use baseline_core::constants::COIN;
use baseline_core::crypto::verify_p2pkh_input;
use baseline_tests::helpers::*;
use baseline_wallet::fees::{FeeMode, FeePreset};
use baseline_wallet::send::{broadcast, prepare_send, PreparedSend, SendPolicy, SendRequest};
use baseline_wallet::session::{ImportSource, SessionState, WalletSession};
use baseline_wallet::storage::{FileStore, MemoryStore, SecretStore};
use baseline_wallet::worker::AsyncSession;
use baseline_wallet::{ErrorKind, WalletError};
use zeroize::Zeroizing;

const WIF: &str = "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf";

/// A well-formed address outside every wallet in these tests.
const SINK: &str = "Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8";

fn memory_session() -> WalletSession {
    WalletSession::open(Arc::new(MemoryStore::new()), fast_config()).unwrap()
}

fn seed_backup_json(next_index: u32) -> String {
    format!(
        r#"{{"version":1,"encrypted":false,"seed":"{SEED_HEX}","next_index":{next_index},"addresses":{{}}}}"#
    )
}

fn pay(to: &str, amount: u64) -> SendRequest {
    SendRequest {
        to_address: to.to_string(),
        amount,
        from_address: None,
        change_address: None,
        fee_mode: FeeMode::Auto(FeePreset::Standard),
        lock_time: None,
    }
}

/// Check value conservation and every input signature of a prepared send.
fn assert_valid(prepared: &PreparedSend, spent: &[baseline_core::SpendableUtxo]) {
    let tx = &prepared.signed.tx;
    let mut total_in = 0;
    for (index, input) in tx.input.iter().enumerate() {
        let utxo = spent
            .iter()
            .find(|u| u.outpoint() == input.previous_output)
            .expect("input spends a known utxo");
        total_in += utxo.value;
        verify_p2pkh_input(tx, index, &utxo.script_pubkey).unwrap();
    }
    let total_out: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
    assert_eq!(total_in - total_out, prepared.signed.fee);
}

#[tokio::test]
async fn wallets_pay_each_other() {
    let node = SimulatedNode::new();
    node.set_fee_rate(Some(10_000));

    let mut alice = memory_session();
    alice.import_mnemonic(ABANDON, "alice-pw").unwrap();
    let mut bob = memory_session();
    bob.import_seed_backup(&seed_backup_json(2), "bob-pw").unwrap();
    let alice_addrs = alice.addresses();
    let bob_addrs = bob.addresses();
    assert_eq!(bob_addrs.len(), 5);
    for a in alice_addrs.iter().chain(&bob_addrs) {
        node.watch(a);
    }

    let funding = node.fund(&alice_addrs[1], 2 * COIN);
    let prepared = prepare_send(
        &node,
        alice.key_ring().unwrap(),
        &pay(&bob_addrs[0], COIN / 2),
        &SendPolicy::default(),
    )
    .await
    .unwrap();
    assert_eq!(prepared.fee.rate, 10_000);
    assert_eq!(prepared.signed.fee, 2_260);
    assert_valid(&prepared, &[funding]);

    let txid = broadcast(&node, &prepared).await.unwrap();
    assert_eq!(txid, prepared.signed.txid.to_string());
    assert_eq!(node.balance(&bob_addrs[0]), COIN / 2);
    assert_eq!(node.balance(&alice_addrs[0]), 2 * COIN - COIN / 2 - 2_260);
    assert_eq!(node.balance(&alice_addrs[1]), 0);

    // Bob spends the output he just received; change returns to his first address.
    let received = node.utxos_for(&bob_addrs[0]);
    let back = prepare_send(
        &node,
        bob.key_ring().unwrap(),
        &pay(&alice_addrs[2], COIN / 4),
        &SendPolicy::default(),
    )
    .await
    .unwrap();
    assert_valid(&back, &received);
    broadcast(&node, &back).await.unwrap();
    assert_eq!(node.balance(&alice_addrs[2]), COIN / 4);
    assert_eq!(node.balance(&bob_addrs[0]), COIN / 2 - COIN / 4 - 2_260);

    // Replaying the first payment spends a UTXO that no longer exists.
    let replay = broadcast(&node, &prepared).await.unwrap_err();
    assert_eq!(replay.kind(), ErrorKind::Chain);
    assert_eq!(node.broadcasts().len(), 2);
}

#[tokio::test]
async fn pages_through_many_small_utxos() {
    let node = SimulatedNode::new();
    let mut wallet = memory_session();
    wallet.import_mnemonic(ABANDON, "pw").unwrap();
    let addr = wallet.addresses()[0].clone();
    let funded: Vec<_> = (0..12).map(|_| node.fund(&addr, 100_000)).collect();

    let policy = SendPolicy {
        page_size: 5,
        ..SendPolicy::default()
    };
    let prepared = prepare_send(&node, wallet.key_ring().unwrap(), &pay(SINK, 1_000_000), &policy)
        .await
        .unwrap();

    assert_eq!(node.queries(), [(5, 0), (5, 5), (5, 10)]);
    assert_eq!(prepared.base_fee_rate, None);
    assert_eq!(prepared.fee.rate, 5_000);
    assert_eq!(prepared.signed.inputs_used, 11);
    assert_eq!(prepared.signed.fee, 8_530);
    assert_valid(&prepared, &funded);
}

#[tokio::test]
async fn insufficient_funds_reports_totals() {
    let node = SimulatedNode::new();
    let mut wallet = memory_session();
    wallet.import_encoded_key(WIF, "pw").unwrap();
    let addr = wallet.addresses()[0].clone();
    node.fund(&addr, 40_000);
    node.fund(&addr, 30_000);

    let err = prepare_send(
        &node,
        wallet.key_ring().unwrap(),
        &pay(SINK, 70_000),
        &SendPolicy::default(),
    )
    .await
    .unwrap_err();
    match err {
        WalletError::InsufficientFunds { have, need } => {
            assert_eq!(have, 70_000);
            assert!(need > 70_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(node.broadcasts().is_empty());
}

#[test]
fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));

    let mut session = WalletSession::open(store.clone(), fast_config()).unwrap();
    let phrase = match session.create("correct horse").unwrap() {
        baseline_wallet::WalletSecrets::Mnemonic { phrase, .. } => phrase.clone(),
        other => panic!("unexpected secrets: {other:?}"),
    };
    session.add_address().unwrap();
    let before = session.addresses();
    assert_eq!(before.len(), 6);
    drop(session);

    let mut reopened = WalletSession::open(Arc::new(FileStore::new(dir.path())), fast_config()).unwrap();
    assert_eq!(reopened.state(), SessionState::Locked);
    assert_eq!(reopened.unlock("battery staple"), Err(WalletError::DecryptionFailed));
    assert_eq!(reopened.state(), SessionState::Locked);

    reopened.unlock("correct horse").unwrap();
    assert_eq!(reopened.addresses(), before);
    match reopened.secrets() {
        Some(baseline_wallet::WalletSecrets::Mnemonic { phrase: p, next_index, .. }) => {
            assert_eq!(p, &phrase);
            assert_eq!(*next_index, 6);
        }
        other => panic!("unexpected secrets: {other:?}"),
    }

    reopened.clear().unwrap();
    assert!(store.load().unwrap().is_none());
}

#[test]
fn seed_backup_export_reimports() {
    let mut original = memory_session();
    original.import_seed_backup(&seed_backup_json(7), "pw").unwrap();
    assert_eq!(original.addresses().len(), 7);

    let exported = original.export_backup().unwrap();
    let json: serde_json::Value = serde_json::from_str(&exported).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["encrypted"], false);
    assert_eq!(json["seed"], SEED_HEX);
    assert_eq!(json["next_index"], 7);
    let addresses = json["addresses"].as_object().unwrap();
    assert_eq!(addresses.len(), 7);
    for (index, address) in original.addresses().iter().enumerate() {
        assert_eq!(addresses[address]["index"], index);
        assert_eq!(addresses[address]["watch_only"], false);
    }

    let mut restored = memory_session();
    restored.import(&ImportSource::SeedBackup(exported), "other-pw").unwrap();
    assert_eq!(restored.addresses(), original.addresses());
}

#[test]
fn mnemonic_and_key_exports_have_their_own_shapes() {
    let mut m = memory_session();
    m.import_mnemonic(&ABANDON.to_uppercase(), "pw").unwrap();
    let json: serde_json::Value = serde_json::from_str(&m.export_backup().unwrap()).unwrap();
    assert_eq!(json["kind"], "mnemonic");
    assert_eq!(json["mnemonic"], ABANDON.split_whitespace().collect::<Vec<_>>().join(" "));
    assert_eq!(json["next_index"], 5);
    assert_eq!(json["addresses"][0]["path"], "m/44'/0'/0'/0/0");

    let mut k = memory_session();
    k.import_encoded_key(WIF, "pw").unwrap();
    let json: serde_json::Value = serde_json::from_str(&k.export_backup().unwrap()).unwrap();
    assert_eq!(json["kind"], "wif");
    assert_eq!(json["keys"][0]["wif"], WIF);
    assert_eq!(json["keys"][0]["address"], k.addresses()[0].as_str());
    assert_eq!(k.add_address(), Err(WalletError::CannotExtendImportedKey));
    assert_eq!(k.state(), SessionState::Ready);
}

#[test]
fn rejected_imports_leave_store_untouched() {
    let store = Arc::new(MemoryStore::new());
    let mut session = WalletSession::open(store.clone(), fast_config()).unwrap();

    let bad_checksum = ABANDON.replace("about", "abandon");
    assert!(matches!(
        session.import_mnemonic(&bad_checksum, "pw"),
        Err(WalletError::InvalidMnemonic(_))
    ));
    assert_eq!(
        session.import_seed_backup(r#"{"encrypted":true,"seed":"00"}"#, "pw").unwrap_err(),
        WalletError::EncryptedBackupUnsupported
    );
    assert_eq!(
        session.import_seed_backup(r#"{"seed":"abc"}"#, "pw").unwrap_err(),
        WalletError::MissingSeed
    );
    assert_eq!(session.state(), SessionState::Empty);
    assert!(!store.is_occupied());
}

#[tokio::test]
async fn async_session_pays_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let node = SimulatedNode::new();
    let session = AsyncSession::open(Arc::new(FileStore::new(dir.path())), fast_config())
        .await
        .unwrap();
    session
        .import(
            ImportSource::Mnemonic(Zeroizing::new(ABANDON.to_string())),
            Zeroizing::new("pw".to_string()),
        )
        .await
        .unwrap();
    let addresses = session.addresses().await;
    let funding = node.fund(&addresses[3], COIN);

    let mut request = pay(SINK, 10_000_000);
    request.change_address = Some(addresses[4].clone());
    request.lock_time = Some(50_000);
    let prepared = session
        .prepare_send(&node, &request, &SendPolicy::default())
        .await
        .unwrap();
    assert_valid(&prepared, &[funding]);
    assert_eq!(prepared.signed.lock_time, Some(50_000));
    assert_eq!(
        prepared.signed.tx.output[1].script_pubkey,
        script_for_address(&addresses[4], &PARAMS).unwrap()
    );

    broadcast(&node, &prepared).await.unwrap();
    assert_eq!(node.balance(&addresses[3]), 0);

    session.lock().await;
    let err = session
        .prepare_send(&node, &request, &SendPolicy::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}
