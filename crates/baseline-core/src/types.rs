//! Chain data supplied to the wallet by an external node.

use std::str::FromStr;

use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::error::UtxoError;

/// An unspent output the wallet may spend.
///
/// Supplied per call by the chain source and never cached by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableUtxo {
    /// Funding transaction id (big-endian display order).
    pub txid: Txid,
    /// Output index within the funding transaction.
    pub vout: u32,
    /// Output value in liners.
    pub value: u64,
    /// Locking script of the output. Empty means "derive from `address`".
    pub script_pubkey: ScriptBuf,
    /// Address owning the output; selects the signing key.
    pub address: String,
}

impl SpendableUtxo {
    /// Build from the hex strings an indexer returns.
    pub fn from_hex_parts(
        txid_hex: &str,
        vout: u32,
        value: u64,
        script_hex: &str,
        address: impl Into<String>,
    ) -> Result<Self, UtxoError> {
        let txid = Txid::from_str(txid_hex).map_err(|e| UtxoError::InvalidTxid(e.to_string()))?;
        let script = hex::decode(script_hex).map_err(|e| UtxoError::InvalidScript(e.to_string()))?;
        Ok(Self {
            txid,
            vout,
            value,
            script_pubkey: ScriptBuf::from_bytes(script),
            address: address.into(),
        })
    }

    /// The outpoint this UTXO occupies; its txid serializes byte-reversed.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::serialize;

    #[test]
    fn outpoint_reverses_txid_on_wire() {
        let txid_hex = format!("{}01", "00".repeat(31));
        let utxo = SpendableUtxo::from_hex_parts(&txid_hex, 3, 10, "", "N").unwrap();
        let wire = serialize(&utxo.outpoint());
        assert_eq!(wire[0], 0x01);
        assert!(wire[1..32].iter().all(|b| *b == 0));
        assert_eq!(&wire[32..], &3u32.to_le_bytes());
        assert_eq!(utxo.txid.to_string(), txid_hex);
    }

    #[test]
    fn empty_script_allowed() {
        let utxo = SpendableUtxo::from_hex_parts(&"ab".repeat(32), 0, 1, "", "N").unwrap();
        assert!(utxo.script_pubkey.is_empty());
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(matches!(
            SpendableUtxo::from_hex_parts("zz", 0, 1, "", "N"),
            Err(UtxoError::InvalidTxid(_))
        ));
        assert!(matches!(
            SpendableUtxo::from_hex_parts(&"ab".repeat(32), 0, 1, "0", "N"),
            Err(UtxoError::InvalidScript(_))
        ));
    }
}
