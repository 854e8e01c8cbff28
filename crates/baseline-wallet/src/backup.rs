//! Backup file formats.
//!
//! Each secrets variant exports to its own JSON shape. The seed variant is
//! the node wallet's `wallet.json`, so it must stay readable by that wallet:
//!
//! ```json
//! {"version":1,"encrypted":false,"seed":"<64 hex>","next_index":5,
//!  "addresses":{"N...":{"index":0,"watch_only":false,"label":""}}}
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::WalletError;
use crate::keys::SEED_LEN;
use crate::secrets::WalletSecrets;

/// Seed and next index recovered from a node wallet backup.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedBackupInfo {
    pub seed_hex: Zeroizing<String>,
    /// `max(declared next index, number of listed addresses)`.
    pub next_index: u32,
}

impl std::fmt::Debug for SeedBackupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedBackupInfo")
            .field("seed_hex", &"[REDACTED]")
            .field("next_index", &self.next_index)
            .finish()
    }
}

/// Parse a node wallet `wallet.json`.
///
/// The declared index is read from `next_index` or `nextIndex`, as an
/// integer or a numeric string, and defaults to 0.
pub fn parse_seed_backup(json_text: &str) -> Result<SeedBackupInfo, WalletError> {
    let data: Value =
        serde_json::from_str(json_text).map_err(|e| WalletError::MalformedBackup(e.to_string()))?;
    if !data.is_object() {
        return Err(WalletError::MalformedBackup("expected a JSON object".into()));
    }
    if data.get("encrypted").is_some_and(is_truthy) {
        return Err(WalletError::EncryptedBackupUnsupported);
    }

    let seed_hex = match data.get("seed").and_then(Value::as_str) {
        Some(s) if s.len() == SEED_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Zeroizing::new(s.to_string())
        }
        _ => return Err(WalletError::MissingSeed),
    };

    let declared = match first_present(&data, &["next_index", "nextIndex"]) {
        Some(value) => index_value(value)?,
        None => 0,
    };
    let address_count = match data.get("addresses") {
        Some(Value::Object(map)) => map.len(),
        Some(Value::Array(list)) => list.len(),
        _ => 0,
    };
    let address_count = u32::try_from(address_count)
        .map_err(|_| WalletError::MalformedBackup("too many addresses".into()))?;

    Ok(SeedBackupInfo {
        seed_hex,
        next_index: declared.max(address_count),
    })
}

fn first_present<'a>(data: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|f| data.get(*f))
        .find(|v| !v.is_null())
}

fn index_value(value: &Value) -> Result<u32, WalletError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| WalletError::MalformedBackup(format!("invalid next index: {value}")))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Serialize)]
struct SeedBackupFile<'a> {
    version: u32,
    encrypted: bool,
    seed: &'a str,
    next_index: u32,
    addresses: AddressMap<'a>,
}

#[derive(Serialize)]
struct SeedBackupAddress<'a> {
    index: usize,
    watch_only: bool,
    label: &'a str,
}

#[derive(Serialize)]
struct MnemonicBackupFile<'a> {
    kind: &'static str,
    mnemonic: &'a str,
    next_index: u32,
    addresses: Vec<MnemonicBackupAddress<'a>>,
}

#[derive(Serialize)]
struct MnemonicBackupAddress<'a> {
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
}

#[derive(Serialize)]
struct WifBackupFile<'a> {
    kind: &'static str,
    keys: Vec<WifBackupKey<'a>>,
}

#[derive(Serialize)]
struct WifBackupKey<'a> {
    address: &'a str,
    wif: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
}

/// Address entries serialized as a JSON object in derivation order.
struct AddressMap<'a>(Vec<(&'a str, SeedBackupAddress<'a>)>);

impl Serialize for AddressMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (address, entry) in &self.0 {
            map.serialize_entry(address, entry)?;
        }
        map.end()
    }
}

/// Render the backup for `secrets` as pretty-printed JSON.
pub fn export_backup(secrets: &WalletSecrets) -> Result<Zeroizing<String>, WalletError> {
    let rendered = match secrets {
        WalletSecrets::SeedBackup {
            seed,
            next_index,
            keys,
        } => {
            let seed_hex = seed.to_hex();
            let file = SeedBackupFile {
                version: 1,
                encrypted: false,
                seed: seed_hex.as_str(),
                next_index: *next_index,
                addresses: AddressMap(
                    keys.iter()
                        .enumerate()
                        .map(|(index, k)| {
                            let entry = SeedBackupAddress {
                                index,
                                watch_only: false,
                                label: k.label.as_deref().unwrap_or(""),
                            };
                            (k.address.as_str(), entry)
                        })
                        .collect(),
                ),
            };
            serde_json::to_string_pretty(&file)
        }
        WalletSecrets::Mnemonic {
            phrase,
            next_index,
            keys,
        } => serde_json::to_string_pretty(&MnemonicBackupFile {
            kind: "mnemonic",
            mnemonic: phrase,
            next_index: *next_index,
            addresses: keys
                .iter()
                .map(|k| MnemonicBackupAddress {
                    address: &k.address,
                    path: k.path.as_deref(),
                    label: k.label.as_deref(),
                })
                .collect(),
        }),
        WalletSecrets::RawPrivateKeys { keys } => serde_json::to_string_pretty(&WifBackupFile {
            kind: "wif",
            keys: keys
                .iter()
                .map(|k| WifBackupKey {
                    address: &k.address,
                    wif: &k.encoded_key,
                    label: k.label.as_deref(),
                })
                .collect(),
        }),
    };
    rendered
        .map(Zeroizing::new)
        .map_err(|e| WalletError::Serialization(e.to_string()))
}
