//! secp256k1 key handling and legacy P2PKH signing for Baseline.
//!
//! Keys are plain secp256k1 scalars. Private keys travel as WIF strings
//! (Base58Check of `wif_version || secret || 0x01?`), public keys are hashed
//! with HASH160 into addresses.
//!
//! # Signing scheme
//!
//! Inputs are signed with the legacy (pre-SegWit) signature hash and
//! `SIGHASH_ALL`. The unlocking script is:
//!
//! ```text
//! <DER signature || 0x01> <public key>
//! ```

use std::fmt;
use std::sync::OnceLock;

use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, PublicKey, Script, ScriptBuf, Transaction};
use zeroize::Zeroizing;

use crate::address::Address;
use crate::constants::NetworkParams;
use crate::error::{CryptoError, KeyError};

/// WIF payload length for an uncompressed key (version + secret).
const WIF_UNCOMPRESSED_LEN: usize = 33;

/// WIF payload length for a compressed key (version + secret + flag).
const WIF_COMPRESSED_LEN: usize = 34;

/// Shared signing and verification context.
pub fn secp_context() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// A secp256k1 keypair.
///
/// The secret scalar is erased when the keypair is dropped.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Wrap a secret key, producing a compressed public key.
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public = PublicKey::new(secret.public_key(secp_context()));
        Self { secret, public }
    }

    /// Create a keypair from 32 bytes of secret material.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecret)?;
        Ok(Self::from_secret_key(secret))
    }

    /// Decode a WIF string whose version byte is `params.wif_version`.
    pub fn from_wif(wif: &str, params: &NetworkParams) -> Result<Self, KeyError> {
        let payload = Zeroizing::new(
            bs58::decode(wif.trim())
                .with_check(None)
                .into_vec()
                .map_err(|_| KeyError::InvalidEncoding)?,
        );

        let compressed = match payload.len() {
            WIF_UNCOMPRESSED_LEN => false,
            WIF_COMPRESSED_LEN => match payload[33] {
                0x01 => true,
                flag => return Err(KeyError::InvalidCompressionFlag(flag)),
            },
            len => return Err(KeyError::InvalidLength(len)),
        };
        if payload[0] != params.wif_version {
            return Err(KeyError::UnsupportedVersion(payload[0]));
        }

        let secret = SecretKey::from_slice(&payload[1..33]).map_err(|_| KeyError::InvalidSecret)?;
        let inner = secret.public_key(secp_context());
        let public = if compressed {
            PublicKey::new(inner)
        } else {
            PublicKey::new_uncompressed(inner)
        };
        Ok(Self { secret, public })
    }

    /// Encode the secret as WIF under `params.wif_version`.
    pub fn to_wif(&self, params: &NetworkParams) -> String {
        let mut payload = Zeroizing::new(Vec::with_capacity(WIF_COMPRESSED_LEN));
        payload.push(params.wif_version);
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.public.compressed {
            payload.push(0x01);
        }
        bs58::encode(payload.as_slice()).with_check().into_string()
    }

    /// The public key, compressed unless decoded from an uncompressed WIF.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The P2PKH address for this keypair.
    pub fn address(&self, params: &NetworkParams) -> Address {
        Address::from_public_key(&self.public, params)
    }

    /// Produce a `SIGHASH_ALL` ECDSA signature over a 32-byte digest.
    pub fn sign_digest(&self, digest: [u8; 32]) -> ecdsa::Signature {
        let msg = Message::from_digest(digest);
        ecdsa::Signature {
            signature: secp_context().sign_ecdsa(&msg, &self.secret),
            sighash_type: EcdsaSighashType::All,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public)
            .finish_non_exhaustive()
    }
}

/// Legacy `SIGHASH_ALL` digest for input `index` spending `script_pubkey`.
pub fn legacy_sighash(
    tx: &Transaction,
    index: usize,
    script_pubkey: &Script,
) -> Result<[u8; 32], CryptoError> {
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(index, script_pubkey, EcdsaSighashType::All.to_u32())
        .map_err(|_| CryptoError::InputIndexOutOfBounds {
            index,
            len: tx.input.len(),
        })?;
    Ok(sighash.to_byte_array())
}

/// Build the P2PKH unlocking script for input `index`.
///
/// The transaction's other unlocking scripts do not affect the legacy
/// sighash, so inputs may be signed in any order.
pub fn p2pkh_script_sig(
    tx: &Transaction,
    index: usize,
    script_pubkey: &Script,
    keypair: &KeyPair,
) -> Result<ScriptBuf, CryptoError> {
    let digest = legacy_sighash(tx, index, script_pubkey)?;
    let signature = keypair.sign_digest(digest);
    let push = PushBytesBuf::try_from(signature.to_vec()).map_err(|_| CryptoError::PushTooLarge)?;
    Ok(Builder::new()
        .push_slice(push)
        .push_key(&keypair.public_key())
        .into_script())
}

/// Verify a P2PKH unlocking script against the previous output script.
///
/// Checks that the pushed public key hashes to the locking script and that
/// the signature is valid for the legacy sighash of this input.
pub fn verify_p2pkh_input(
    tx: &Transaction,
    index: usize,
    script_pubkey: &Script,
) -> Result<(), CryptoError> {
    let input = tx.input.get(index).ok_or(CryptoError::InputIndexOutOfBounds {
        index,
        len: tx.input.len(),
    })?;

    let mut pushes = Vec::with_capacity(2);
    for instruction in input.script_sig.instructions() {
        match instruction {
            Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes().to_vec()),
            _ => return Err(CryptoError::MalformedScriptSig(index)),
        }
    }
    let [sig_bytes, key_bytes] = pushes.as_slice() else {
        return Err(CryptoError::MalformedScriptSig(index));
    };

    let signature = ecdsa::Signature::from_slice(sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    let public = PublicKey::from_slice(key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    if ScriptBuf::new_p2pkh(&public.pubkey_hash()).as_script() != script_pubkey {
        return Err(CryptoError::PubkeyHashMismatch);
    }

    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(index, script_pubkey, signature.sighash_type.to_u32())
        .map_err(|_| CryptoError::InputIndexOutOfBounds {
            index,
            len: tx.input.len(),
        })?;
    let msg = Message::from_digest(sighash.to_byte_array());
    secp_context()
        .verify_ecdsa(&msg, &signature.signature, &public.inner)
        .map_err(|_| CryptoError::VerificationFailed)
}
