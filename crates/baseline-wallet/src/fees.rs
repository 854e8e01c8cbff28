//! Fee-rate policy: presets over the node's estimate, custom rates and the
//! relay floor. All rates are liners per kB.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::WalletError;

/// Lowest rate nodes relay, and the default floor.
pub const MIN_RELAY_FEE_RATE: u64 = 5_000;

/// Rate assumed when the node returns no estimate.
pub const FALLBACK_FEE_RATE: u64 = 5_000;

/// Multipliers applied to the node's estimate, in per-mille.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeePreset {
    /// 0.85x
    Eco,
    /// 1.00x
    Standard,
    /// 1.30x
    #[default]
    Fast,
    /// 1.60x
    Turbo,
}

impl FeePreset {
    pub const ALL: [FeePreset; 4] = [
        FeePreset::Eco,
        FeePreset::Standard,
        FeePreset::Fast,
        FeePreset::Turbo,
    ];

    pub fn multiplier_per_mille(self) -> u64 {
        match self {
            FeePreset::Eco => 850,
            FeePreset::Standard => 1_000,
            FeePreset::Fast => 1_300,
            FeePreset::Turbo => 1_600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeePreset::Eco => "eco",
            FeePreset::Standard => "standard",
            FeePreset::Fast => "fast",
            FeePreset::Turbo => "turbo",
        }
    }
}

impl fmt::Display for FeePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeePreset {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeePreset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WalletError::InvalidFeeRate(format!("unknown fee preset: {s}")))
    }
}

/// How the fee rate is chosen. Defaults to the fast preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    /// Scale the node's estimate by a preset.
    Auto(FeePreset),
    /// Use this rate as given.
    Custom { liners_per_kb: u64 },
}

impl Default for FeeMode {
    fn default() -> Self {
        FeeMode::Auto(FeePreset::default())
    }
}

/// Floor and fallback used when resolving a [`FeeMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub min_relay_fee_rate: u64,
    pub fallback_fee_rate: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            min_relay_fee_rate: MIN_RELAY_FEE_RATE,
            fallback_fee_rate: FALLBACK_FEE_RATE,
        }
    }
}

/// The resolved rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeDecision {
    /// Liners per kB to build with.
    pub rate: u64,
    /// The mode asked for less than the relay floor.
    pub clamped: bool,
}

/// Resolve `mode` against the node's estimate `base` (liners/kB).
pub fn effective_fee_rate(
    base: Option<u64>,
    mode: FeeMode,
    policy: &FeePolicy,
) -> Result<FeeDecision, WalletError> {
    let requested = match mode {
        FeeMode::Auto(preset) => {
            // Only a missing estimate falls back; zero clamps to the floor below.
            let base = base.unwrap_or(policy.fallback_fee_rate);
            let scaled = (u128::from(base) * u128::from(preset.multiplier_per_mille()) + 500) / 1_000;
            u64::try_from(scaled).unwrap_or(u64::MAX).max(1)
        }
        FeeMode::Custom { liners_per_kb: 0 } => {
            return Err(WalletError::InvalidFeeRate("custom fee rate must be positive".into()));
        }
        FeeMode::Custom { liners_per_kb } => liners_per_kb,
    };

    if requested < policy.min_relay_fee_rate {
        warn!(
            requested,
            floor = policy.min_relay_fee_rate,
            "fee rate below relay minimum, clamping"
        );
        Ok(FeeDecision {
            rate: policy.min_relay_fee_rate,
            clamped: true,
        })
    } else {
        Ok(FeeDecision {
            rate: requested,
            clamped: false,
        })
    }
}
