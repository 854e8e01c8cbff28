//! Error types for the Baseline core primitives.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding")] InvalidEncoding,
    #[error("invalid payload length: {0}")] InvalidLength(usize),
    #[error("pay-to-script-hash addresses are not supported")] ScriptHashUnsupported,
    #[error("unsupported version byte: {0:#04x}")] UnsupportedVersion(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid base58check encoding")] InvalidEncoding,
    #[error("invalid payload length: {0}")] InvalidLength(usize),
    #[error("unsupported version byte: {0:#04x}")] UnsupportedVersion(u8),
    #[error("invalid compression flag: {0:#04x}")] InvalidCompressionFlag(u8),
    #[error("secret is not a valid curve scalar")] InvalidSecret,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("invalid amount: {0}")] InvalidFormat(String),
    #[error("too many decimal places (max {max})")] TooPrecise { max: usize },
    #[error("amount overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match previous output script")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
    #[error("malformed unlocking script on input {0}")] MalformedScriptSig(usize),
    #[error("script push too large")] PushTooLarge,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("invalid txid: {0}")] InvalidTxid(String),
    #[error("invalid output script: {0}")] InvalidScript(String),
}
