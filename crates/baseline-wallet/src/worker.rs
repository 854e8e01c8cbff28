//! Blocking-pool offload for CPU-bound wallet work.
//!
//! Key derivation, PBKDF2 and signing take from milliseconds to a few hundred
//! milliseconds. Async callers hand them to [`offload`], which runs the job on
//! Tokio's blocking pool and returns its result or a [`WalletError::Worker`].
//! [`AsyncSession`] does the same for every session transition.

use std::sync::Arc;

use tokio::sync::Mutex;
use zeroize::Zeroizing;

use baseline_core::constants::NetworkParams;

use crate::builder::{BuildRequest, SignedTransaction, TransactionBuilder};
use crate::chain::ChainSource;
use crate::encryption::{self, EncryptedBlob};
use crate::error::WalletError;
use crate::keys::{derive_from_mnemonic, derive_from_seed, DerivedKey, KeyRing, Seed};
use crate::secrets::WalletSecrets;
use crate::send::{prepare_send_shared, PreparedSend, SendPolicy, SendRequest};
use crate::session::{ImportSource, SessionConfig, SessionState, WalletSession};
use crate::storage::SecretStore;

/// Run `job` on the blocking pool.
pub async fn offload<T, F>(job: F) -> Result<T, WalletError>
where
    F: FnOnce() -> Result<T, WalletError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| WalletError::Worker(e.to_string()))?
}

/// [`derive_from_mnemonic`] on the blocking pool.
pub async fn derive_mnemonic_keys(
    phrase: Zeroizing<String>,
    count: u32,
    start_index: u32,
    account: u32,
    params: NetworkParams,
) -> Result<Vec<DerivedKey>, WalletError> {
    offload(move || derive_from_mnemonic(&phrase, count, start_index, account, &params)).await
}

/// [`derive_from_seed`] on the blocking pool.
pub async fn derive_seed_keys(
    seed: Seed,
    count: u32,
    start_index: u32,
    params: NetworkParams,
) -> Result<Vec<DerivedKey>, WalletError> {
    offload(move || derive_from_seed(&seed, count, start_index, &params)).await
}

/// [`encryption::encrypt`] on the blocking pool.
pub async fn encrypt_payload(
    passphrase: Zeroizing<String>,
    plaintext: Zeroizing<Vec<u8>>,
    iterations: u32,
) -> Result<EncryptedBlob, WalletError> {
    offload(move || encryption::encrypt(&passphrase, &plaintext, iterations)).await
}

/// [`encryption::decrypt`] on the blocking pool.
pub async fn decrypt_payload(
    passphrase: Zeroizing<String>,
    blob: EncryptedBlob,
) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    offload(move || encryption::decrypt(&passphrase, &blob)).await
}

/// Build and sign `request` for `params` on the blocking pool.
pub async fn sign_transaction(
    request: BuildRequest,
    key_ring: Arc<KeyRing>,
    params: NetworkParams,
) -> Result<SignedTransaction, WalletError> {
    offload(move || {
        let builder = TransactionBuilder::new(params);
        builder.sign(builder.build(&request)?, &key_ring)
    })
    .await
}

/// A [`WalletSession`] shared between tasks.
///
/// Each transition takes the session lock and runs on the blocking pool, so
/// concurrent callers are serialized in arrival order.
#[derive(Clone, Debug)]
pub struct AsyncSession {
    inner: Arc<Mutex<WalletSession>>,
}

impl AsyncSession {
    pub fn new(session: WalletSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Open a session over `store` without blocking the runtime.
    pub async fn open(store: Arc<dyn SecretStore>, config: SessionConfig) -> Result<Self, WalletError> {
        let session = offload(move || WalletSession::open(store, config)).await?;
        Ok(Self::new(session))
    }

    async fn run<T, F>(&self, job: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut WalletSession) -> Result<T, WalletError> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.inner.clone().lock_owned().await;
        offload(move || job(&mut *guard)).await
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state()
    }

    /// Addresses of the live keys; empty unless `Ready`.
    pub async fn addresses(&self) -> Vec<String> {
        self.inner.lock().await.addresses()
    }

    /// A copy of the live keys; empty unless `Ready`.
    pub async fn keys(&self) -> Vec<DerivedKey> {
        self.inner.lock().await.keys().to_vec()
    }

    /// See [`WalletSession::create`]. Returns a copy of the new secrets.
    pub async fn create(&self, passphrase: Zeroizing<String>) -> Result<WalletSecrets, WalletError> {
        self.run(move |s| s.create(&passphrase).cloned()).await
    }

    /// See [`WalletSession::import`].
    pub async fn import(
        &self,
        source: ImportSource,
        passphrase: Zeroizing<String>,
    ) -> Result<WalletSecrets, WalletError> {
        self.run(move |s| s.import(&source, &passphrase).cloned()).await
    }

    /// See [`WalletSession::unlock`].
    pub async fn unlock(&self, passphrase: Zeroizing<String>) -> Result<(), WalletError> {
        self.run(move |s| s.unlock(&passphrase)).await
    }

    pub async fn lock(&self) {
        self.inner.lock().await.lock();
    }

    /// See [`WalletSession::add_address`].
    pub async fn add_address(&self) -> Result<DerivedKey, WalletError> {
        self.run(WalletSession::add_address).await
    }

    /// See [`WalletSession::clear`].
    pub async fn clear(&self) -> Result<(), WalletError> {
        self.run(WalletSession::clear).await
    }

    /// See [`WalletSession::export_backup`].
    pub async fn export_backup(&self) -> Result<Zeroizing<String>, WalletError> {
        self.run(|s| s.export_backup()).await
    }

    /// Prepare a payment from the live keys. Requires `Ready`.
    ///
    /// The session lock is held only to copy the key ring; chain queries and
    /// signing run without it, so a slow node never stalls `lock` or other
    /// transitions. A send already past the copy completes with the old keys.
    pub async fn prepare_send(
        &self,
        source: &dyn ChainSource,
        request: &SendRequest,
        policy: &SendPolicy,
    ) -> Result<PreparedSend, WalletError> {
        let key_ring = {
            let session = self.inner.lock().await;
            Arc::new(session.key_ring()?.clone())
        };
        prepare_send_shared(source, key_ring, request, policy).await
    }
}
