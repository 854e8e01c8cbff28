//! Protocol constants. All monetary values in liners (1 coin = 10^8 liners).

pub const COIN: u64 = 100_000_000;

/// Number of fractional digits in a coin amount.
pub const COIN_DECIMALS: usize = 8;

/// Outputs below this value are not economically spendable.
pub const DUST_THRESHOLD: u64 = 550;

/// Version bytes and limits that distinguish the Baseline chain.
///
/// Baseline is a Bitcoin-derived chain with its own pubkey-hash version, so
/// every address or key encoding must read its version bytes from here
/// rather than from Bitcoin mainnet defaults.
///
/// # Examples
///
/// ```
/// use baseline_core::constants::NetworkParams;
/// let params = NetworkParams::BASELINE;
/// assert_eq!(params.pubkey_hash_version, 0x35);
/// assert_eq!(params.wif_version, 0x80);
/// assert_eq!(params.dust_threshold, 550);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    /// Version byte of P2PKH addresses (Base58 prefix `N`).
    pub pubkey_hash_version: u8,
    /// Version byte of P2SH addresses. Recognised but never spendable here.
    pub script_hash_version: u8,
    /// Version byte of WIF-encoded private keys.
    pub wif_version: u8,
    /// BIP-32 extended public key version.
    pub bip32_public_version: u32,
    /// BIP-32 extended private key version.
    pub bip32_private_version: u32,
    /// Prefix for signed messages.
    pub message_prefix: &'static str,
    /// Dust threshold in liners.
    pub dust_threshold: u64,
}

impl NetworkParams {
    /// Baseline mainnet.
    pub const BASELINE: NetworkParams = NetworkParams {
        pubkey_hash_version: 0x35,
        script_hash_version: 0x05,
        wif_version: 0x80,
        bip32_public_version: 0x0488_b21e,
        bip32_private_version: 0x0488_ade4,
        message_prefix: "\x18Baseline Signed Message:\n",
        dust_threshold: DUST_THRESHOLD,
    };
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::BASELINE
    }
}
