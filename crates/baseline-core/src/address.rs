//! Legacy pay-to-pubkey-hash addresses for the Baseline network.
//!
//! An address is the Base58Check encoding of `version || HASH160(pubkey)`:
//!
//! ```text
//! version (1 byte) || pubkey_hash (20 bytes) || checksum (4 bytes)
//! ```
//!
//! The version byte comes from [`NetworkParams::pubkey_hash_version`]
//! (`0x35`, so mainnet addresses start with `N`). Script-hash addresses decode
//! but are rejected, since this wallet only builds and spends P2PKH outputs.

use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, PublicKey, ScriptBuf};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::NetworkParams;
use crate::error::AddressError;

/// Length of the decoded payload (version + hash160).
const PAYLOAD_LEN: usize = 21;

/// A Baseline P2PKH address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    pubkey_hash: PubkeyHash,
}

impl Address {
    /// Create an address from a pubkey hash.
    pub fn from_pubkey_hash(pubkey_hash: PubkeyHash, params: &NetworkParams) -> Self {
        Self {
            version: params.pubkey_hash_version,
            pubkey_hash,
        }
    }

    /// Create an address from a public key, honouring its compression flag.
    pub fn from_public_key(public_key: &PublicKey, params: &NetworkParams) -> Self {
        Self::from_pubkey_hash(public_key.pubkey_hash(), params)
    }

    /// The HASH160 of the public key.
    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.pubkey_hash
    }

    /// The address version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// The locking script paying to this address.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.pubkey_hash)
    }

    /// Encode as a Base58Check string.
    pub fn encode(&self) -> String {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = self.version;
        payload[1..].copy_from_slice(self.pubkey_hash.as_byte_array());
        bs58::encode(payload).with_check().into_string()
    }

    /// Decode a Base58Check string, accepting only P2PKH under `params`.
    pub fn decode(s: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        let payload = bs58::decode(s.trim())
            .with_check(None)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;

        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::InvalidLength(payload.len()));
        }

        let version = payload[0];
        if version != params.pubkey_hash_version {
            if version == params.script_hash_version {
                return Err(AddressError::ScriptHashUnsupported);
            }
            return Err(AddressError::UnsupportedVersion(version));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self {
            version,
            pubkey_hash: PubkeyHash::from_byte_array(hash),
        })
    }
}

/// Resolve an address string to its P2PKH locking script.
pub fn script_for_address(address: &str, params: &NetworkParams) -> Result<ScriptBuf, AddressError> {
    Address::decode(address, params).map(|a| a.script_pubkey())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Parses against [`NetworkParams::BASELINE`].
impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s, &NetworkParams::BASELINE)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
