//! CLI configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file, then
//! `BASELINE_*` environment variables (`BASELINE_RPC__URL` sets `rpc.url`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use baseline_wallet::encryption::DEFAULT_KDF_ITERATIONS;
use baseline_wallet::keys::DEFAULT_ADDRESS_BATCH;
use baseline_wallet::send::SendPolicy;
use baseline_wallet::session::SessionConfig;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8832/";
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_FEE_TARGET: u32 = 6;
const APP_DIR: &str = "baseline-light";
const ENV_PREFIX: &str = "BASELINE";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Non-positive values mean the default.
    pub timeout_ms: i64,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        crate::rpc::effective_timeout(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub rpc: RpcConfig,
    /// Confirmation target for fee estimates, in blocks.
    pub fee_target: u32,
    /// Directory holding the encrypted wallet slot.
    pub data_dir: PathBuf,
    pub address_batch: u32,
    pub kdf_iterations: u32,
}

impl CliConfig {
    /// Load from `explicit` if given (which must then exist), else from the
    /// default config file if present, then apply the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };
        Self::layered(path.as_deref(), required, Environment::with_prefix(ENV_PREFIX))
    }

    fn layered(file: Option<&Path>, required: bool, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("rpc.url", DEFAULT_RPC_URL)?
            .set_default("rpc.timeout_ms", DEFAULT_RPC_TIMEOUT_MS as i64)?
            .set_default("fee_target", i64::from(DEFAULT_FEE_TARGET))?
            .set_default("data_dir", default_data_dir().to_string_lossy().into_owned())?
            .set_default("address_batch", i64::from(DEFAULT_ADDRESS_BATCH))?
            .set_default("kdf_iterations", i64::from(DEFAULT_KDF_ITERATIONS))?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(required));
        }
        builder
            .add_source(env.separator("__").try_parsing(true))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address_batch: self.address_batch,
            kdf_iterations: self.kdf_iterations,
            ..SessionConfig::default()
        }
    }

    pub fn send_policy(&self) -> SendPolicy {
        SendPolicy {
            fee_target_blocks: self.fee_target,
            ..SendPolicy::default()
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
