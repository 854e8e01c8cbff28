//! Key derivation and the in-memory key ring.
//!
//! Three secret formats produce [`DerivedKey`]s:
//!
//! - **Mnemonic**: BIP-39 seed, then BIP-32 along `m/44'/{account}'/0'/0/{i}`.
//! - **Raw seed**: the Baseline node wallet's own scheme,
//!   `SHA256(seed || be32(i)) mod (n - 1) + 1`, labelled `baseline:{i}`.
//!   It is not BIP-32 and must stay byte-compatible with existing backups.
//! - **Encoded key**: a single WIF string, not re-derivable.
//!
//! Every key is encoded with the version bytes in [`NetworkParams`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use baseline_core::constants::NetworkParams;
use baseline_core::crypto::{secp_context, KeyPair};
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::NetworkKind;
use tracing::debug;

use crate::error::WalletError;
use crate::mnemonic::mnemonic_to_seed;

/// Addresses derived on create, import and unlock.
pub const DEFAULT_ADDRESS_BATCH: u32 = 5;

/// Raw seed length in bytes.
pub const SEED_LEN: usize = 32;

/// secp256k1 group order minus one, big-endian.
const CURVE_ORDER_MINUS_ONE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x40,
];

/// An address with its encoded private key.
///
/// Serializes as `{address, wif, path?, label?}`, the shape stored for
/// imported keys. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    /// P2PKH address.
    pub address: String,
    /// WIF-encoded private key.
    #[serde(rename = "wif")]
    pub encoded_key: String,
    /// Derivation path, absent for imported keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// User label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DerivedKey {
    fn from_keypair(kp: &KeyPair, path: Option<String>, params: &NetworkParams) -> Self {
        Self {
            address: kp.address(params).encode(),
            encoded_key: kp.to_wif(params),
            path,
            label: None,
        }
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("address", &self.address)
            .field("encoded_key", &"[REDACTED]")
            .field("path", &self.path)
            .field("label", &self.label)
            .finish()
    }
}

/// A 32-byte raw seed from a Baseline node wallet backup.
///
/// Secret material is zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse exactly 64 hex characters.
    pub fn from_hex(seed_hex: &str) -> Result<Self, WalletError> {
        let trimmed = seed_hex.trim();
        if trimmed.len() != SEED_LEN * 2 {
            return Err(WalletError::InvalidSeedFormat(format!(
                "expected {} hex characters, got {}",
                SEED_LEN * 2,
                trimmed.len()
            )));
        }
        let mut bytes = [0u8; SEED_LEN];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| WalletError::InvalidSeedFormat(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive `count` keys from a BIP-39 phrase starting at `start_index`.
///
/// Fails with [`WalletError::InvalidMnemonic`] if the checksum is wrong.
pub fn derive_from_mnemonic(
    phrase: &str,
    count: u32,
    start_index: u32,
    account: u32,
    params: &NetworkParams,
) -> Result<Vec<DerivedKey>, WalletError> {
    let seed = mnemonic_to_seed(phrase)?;
    let secp = secp_context();
    let master = Xpriv::new_master(NetworkKind::Main, &seed[..])
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

    let chain_path = format!("m/44'/{account}'/0'/0");
    let chain = DerivationPath::from_str(&chain_path)
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
    let external = master
        .derive_priv(secp, &chain)
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

    let mut keys = Vec::with_capacity(count as usize);
    for index in index_range(start_index, count)? {
        let child_number = ChildNumber::from_normal_idx(index)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let child = external
            .derive_priv(secp, &[child_number])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let kp = KeyPair::from_secret_key(child.private_key);
        keys.push(DerivedKey::from_keypair(
            &kp,
            Some(format!("{chain_path}/{index}")),
            params,
        ));
    }

    debug!(count, start_index, account, "derived mnemonic keys");
    Ok(keys)
}

/// Derive `count` keys from a hex-encoded raw seed.
///
/// Fails with [`WalletError::InvalidSeedFormat`] unless the input is exactly
/// 32 bytes of hex.
pub fn derive_from_raw_seed(
    seed_hex: &str,
    count: u32,
    start_index: u32,
    params: &NetworkParams,
) -> Result<Vec<DerivedKey>, WalletError> {
    let seed = Seed::from_hex(seed_hex)?;
    derive_from_seed(&seed, count, start_index, params)
}

/// Derive `count` keys from a parsed raw seed.
pub fn derive_from_seed(
    seed: &Seed,
    count: u32,
    start_index: u32,
    params: &NetworkParams,
) -> Result<Vec<DerivedKey>, WalletError> {
    let mut keys = Vec::with_capacity(count as usize);
    for index in index_range(start_index, count)? {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(index.to_be_bytes());
        let digest: Zeroizing<[u8; 32]> = Zeroizing::new(hasher.finalize().into());

        let scalar = raw_seed_scalar(&digest);
        let kp = KeyPair::from_secret_bytes(&scalar)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        keys.push(DerivedKey::from_keypair(&kp, Some(format!("baseline:{index}")), params));
    }

    debug!(count, start_index, "derived raw-seed keys");
    Ok(keys)
}

/// Decode a single WIF key into a [`DerivedKey`].
pub fn key_from_encoded(
    encoded_key: &str,
    label: Option<String>,
    params: &NetworkParams,
) -> Result<DerivedKey, WalletError> {
    let kp = KeyPair::from_wif(encoded_key, params)?;
    let mut key = DerivedKey::from_keypair(&kp, None, params);
    key.label = label;
    Ok(key)
}

fn index_range(start_index: u32, count: u32) -> Result<std::ops::Range<u32>, WalletError> {
    let end = start_index
        .checked_add(count)
        .ok_or_else(|| WalletError::KeyDerivation("derivation index overflow".into()))?;
    Ok(start_index..end)
}

/// Reduce a digest to a private scalar in `[1, n - 1]`.
///
/// `2^256 < 2(n - 1)`, so a single conditional subtraction completes
/// `digest mod (n - 1)`.
fn raw_seed_scalar(digest: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut value = Zeroizing::new(*digest);
    if *value >= CURVE_ORDER_MINUS_ONE {
        let mut borrow = 0u16;
        for i in (0..32).rev() {
            let rhs = u16::from(CURVE_ORDER_MINUS_ONE[i]) + borrow;
            let lhs = u16::from(value[i]);
            if lhs >= rhs {
                value[i] = (lhs - rhs) as u8;
                borrow = 0;
            } else {
                value[i] = (lhs + 0x100 - rhs) as u8;
                borrow = 1;
            }
        }
    }
    for byte in value.iter_mut().rev() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            break;
        }
    }
    value
}

/// Signing keys indexed by address, in insertion order.
#[derive(Clone)]
pub struct KeyRing {
    entries: Vec<(String, KeyPair)>,
    by_address: HashMap<String, usize>,
}

impl KeyRing {
    /// Create an empty key ring.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_address: HashMap::new(),
        }
    }

    /// Decode every key. The address is recomputed from the secret.
    pub fn from_keys(keys: &[DerivedKey], params: &NetworkParams) -> Result<Self, WalletError> {
        let mut ring = Self::new();
        for key in keys {
            ring.insert(key, params)?;
        }
        Ok(ring)
    }

    /// Add one key; a duplicate address is ignored.
    pub fn insert(&mut self, key: &DerivedKey, params: &NetworkParams) -> Result<(), WalletError> {
        let kp = KeyPair::from_wif(&key.encoded_key, params)?;
        let address = kp.address(params).encode();
        if !self.by_address.contains_key(&address) {
            self.by_address.insert(address.clone(), self.entries.len());
            self.entries.push((address, kp));
        }
        Ok(())
    }

    /// Look up the keypair owning `address`.
    pub fn get(&self, address: &str) -> Option<&KeyPair> {
        self.by_address.get(address).map(|&i| &self.entries[i].1)
    }

    /// Whether `address` has a signing key.
    pub fn contains(&self, address: &str) -> bool {
        self.by_address.contains_key(address)
    }

    /// Addresses in insertion order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    /// The first address, used as the default change address.
    pub fn first_address(&self) -> Option<&str> {
        self.entries.first().map(|(a, _)| a.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: NetworkParams = NetworkParams::BASELINE;
    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";
    const SEED_HEX: &str = "0f0e0d0c0b0a090807060504030201000102030405060708090a0b0c0d0e0f00";

    #[test]
    fn mnemonic_known_vector() {
        let keys = derive_from_mnemonic(ABANDON, 1, 0, 0, &PARAMS).unwrap();
        assert_eq!(keys[0].address, "Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8");
        assert_eq!(
            keys[0].encoded_key,
            "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf"
        );
        assert_eq!(keys[0].path.as_deref(), Some("m/44'/0'/0'/0/0"));
    }

    #[test]
    fn mnemonic_deterministic_and_offset_consistent() {
        let batch = derive_from_mnemonic(ABANDON, 4, 0, 0, &PARAMS).unwrap();
        let again = derive_from_mnemonic(ABANDON, 4, 0, 0, &PARAMS).unwrap();
        assert_eq!(batch, again);

        let single = derive_from_mnemonic(ABANDON, 1, 3, 0, &PARAMS).unwrap();
        assert_eq!(single[0], batch[3]);
        assert_eq!(single[0].path.as_deref(), Some("m/44'/0'/0'/0/3"));
    }

    #[test]
    fn mnemonic_account_changes_keys() {
        let a0 = derive_from_mnemonic(ABANDON, 1, 0, 0, &PARAMS).unwrap();
        let a1 = derive_from_mnemonic(ABANDON, 1, 0, 1, &PARAMS).unwrap();
        assert_ne!(a0[0].address, a1[0].address);
        assert_eq!(a1[0].path.as_deref(), Some("m/44'/1'/0'/0/0"));
    }

    #[test]
    fn mnemonic_invalid_rejected() {
        let phrase = vec!["abandon"; 12].join(" ");
        assert!(matches!(
            derive_from_mnemonic(&phrase, 1, 0, 0, &PARAMS),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn raw_seed_known_vector() {
        let keys = derive_from_raw_seed(SEED_HEX, 2, 0, &PARAMS).unwrap();
        assert_eq!(keys[0].address, "NbczVeGRYn1NYNvstzcSKpoW8LYeBR8CEt");
        assert_eq!(keys[0].path.as_deref(), Some("baseline:0"));
        assert_eq!(keys[1].path.as_deref(), Some("baseline:1"));
        assert_ne!(keys[0].address, keys[1].address);
    }

    #[test]
    fn raw_seed_offset_consistent() {
        let batch = derive_from_raw_seed(SEED_HEX, 3, 0, &PARAMS).unwrap();
        let tail = derive_from_raw_seed(SEED_HEX, 1, 2, &PARAMS).unwrap();
        assert_eq!(tail[0], batch[2]);
    }

    #[test]
    fn raw_seed_format_enforced() {
        assert!(matches!(
            derive_from_raw_seed(&SEED_HEX[..62], 1, 0, &PARAMS),
            Err(WalletError::InvalidSeedFormat(_))
        ));
        let not_hex = format!("zz{}", &SEED_HEX[2..]);
        assert!(matches!(
            derive_from_raw_seed(&not_hex, 1, 0, &PARAMS),
            Err(WalletError::InvalidSeedFormat(_))
        ));
    }

    #[test]
    fn raw_seed_scalar_reduction_edges() {
        let mut one = [0u8; 32];
        one[31] = 1;

        assert_eq!(*raw_seed_scalar(&[0u8; 32]), one);
        // n - 1 reduces to zero, then becomes one.
        assert_eq!(*raw_seed_scalar(&CURVE_ORDER_MINUS_ONE), one);

        // n - 2 stays, becoming n - 1 (the largest valid scalar).
        let mut n_minus_two = CURVE_ORDER_MINUS_ONE;
        n_minus_two[31] -= 1;
        assert_eq!(*raw_seed_scalar(&n_minus_two), CURVE_ORDER_MINUS_ONE);

        // 2^256 - 1 reduces to 2^256 - n, then + 1.
        let reduced = raw_seed_scalar(&[0xFF; 32]);
        assert_eq!(
            hex::encode(*reduced),
            "000000000000000000000000000000014551231950b75fc4402da1732fc9bec0"
        );
        assert!(KeyPair::from_secret_bytes(&reduced).is_ok());
    }

    #[test]
    fn seed_hex_roundtrip_and_redaction() {
        let seed = Seed::from_hex(SEED_HEX).unwrap();
        assert_eq!(seed.to_hex().as_str(), SEED_HEX);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0f0e"));
    }

    #[test]
    fn encoded_key_import() {
        let key = key_from_encoded(
            " L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf\n",
            Some("cold".into()),
            &PARAMS,
        )
        .unwrap();
        assert_eq!(key.address, "Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8");
        assert_eq!(key.path, None);
        assert_eq!(key.label.as_deref(), Some("cold"));
        assert!(matches!(
            key_from_encoded("5Hx", None, &PARAMS),
            Err(WalletError::InvalidEncodedKey(_))
        ));
    }

    #[test]
    fn derived_key_serializes_as_wif_shape() {
        let key = key_from_encoded("L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf", None, &PARAMS)
            .unwrap();
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["wif"], "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf");
        assert!(json.get("path").is_none());
        assert!(!format!("{key:?}").contains("L4p2"));
    }

    #[test]
    fn key_ring_lookup_and_order() {
        let keys = derive_from_raw_seed(SEED_HEX, 3, 0, &PARAMS).unwrap();
        let ring = KeyRing::from_keys(&keys, &PARAMS).unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.first_address(), Some(keys[0].address.as_str()));
        let order: Vec<&str> = ring.addresses().collect();
        assert_eq!(order, keys.iter().map(|k| k.address.as_str()).collect::<Vec<_>>());
        for key in &keys {
            let kp = ring.get(&key.address).unwrap();
            assert_eq!(kp.to_wif(&PARAMS), key.encoded_key);
        }
        assert!(!ring.contains("Nfk9TC8B9eXypnBLFgjiyKFBEFyYJXTxb8"));
    }

    #[test]
    fn key_ring_ignores_duplicates() {
        let keys = derive_from_raw_seed(SEED_HEX, 1, 0, &PARAMS).unwrap();
        let mut ring = KeyRing::from_keys(&keys, &PARAMS).unwrap();
        ring.insert(&keys[0], &PARAMS).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(format!("{ring:?}"), "KeyRing { keys: 1 }");
    }
}
