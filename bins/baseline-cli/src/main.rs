//! baseline-cli: command-line light wallet for the Baseline network.
//!
//! Keys stay on this machine, encrypted under a passphrase. Balances, UTXOs
//! and fee estimates come from a node's JSON-RPC interface with the address
//! index enabled.

mod config;
mod rpc;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use baseline_core::amount::{format_coins, parse_coins, parse_rate_per_vbyte};
use baseline_wallet::fees::{effective_fee_rate, FeeMode, FeePreset};
use baseline_wallet::keys::DerivedKey;
use baseline_wallet::send::{broadcast, refresh_estimate, SendPolicy, SendRequest};
use baseline_wallet::{AsyncSession, FileStore, ImportSource, SessionState, WalletSecrets};

use crate::config::CliConfig;
use crate::rpc::RpcClient;

/// Read instead of prompting when set.
const PASSPHRASE_ENV: &str = "BASELINE_PASSPHRASE";

/// Baseline command-line light wallet.
#[derive(Parser)]
#[command(name = "baseline-cli")]
#[command(version, about = "Light wallet for the Baseline network.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file (default: <config dir>/baseline-light/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wallet data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Node RPC endpoint URL.
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet with a fresh recovery phrase.
    Create,
    /// Import a wallet from a phrase, a private key or a node backup.
    Import {
        #[command(subcommand)]
        source: ImportCommand,
    },
    /// List wallet addresses.
    Addresses,
    /// Derive and store one more address.
    NewAddress,
    /// Print or save a backup of the wallet secrets.
    ExportBackup(ExportArgs),
    /// Query the wallet balance from the node.
    Balance,
    /// Show the node's chain status.
    Status,
    /// Show the node's fee estimate and the rate a send would use.
    Fee(FeeArgs),
    /// Send coins.
    Send(SendArgs),
    /// Show confirmations of a transaction.
    TxStatus {
        /// Transaction id.
        txid: String,
    },
    /// Erase the stored wallet.
    Clear(ClearArgs),
}

#[derive(Subcommand)]
enum ImportCommand {
    /// BIP-39 recovery phrase (prompted).
    Mnemonic(ImportArgs),
    /// WIF private key (prompted).
    Key(ImportArgs),
    /// Node wallet backup (`wallet.json`).
    Backup(ImportBackupArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Replace an existing wallet.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ImportBackupArgs {
    /// Path to the backup file.
    file: PathBuf,

    /// Replace an existing wallet.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Write to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct FeeArgs {
    /// Fee preset (eco, standard, fast, turbo).
    #[arg(long, default_value = "fast")]
    fee_preset: FeePreset,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    #[arg(long)]
    to: String,

    /// Amount in coins (e.g. 1.5).
    #[arg(long, value_parser = parse_coins)]
    amount: u64,

    /// Spend only from this wallet address.
    #[arg(long)]
    from: Option<String>,

    /// Change address (default: first wallet address).
    #[arg(long)]
    change: Option<String>,

    /// Fee preset applied to the node's estimate (default: fast).
    #[arg(long, conflicts_with = "fee_rate")]
    fee_preset: Option<FeePreset>,

    /// Explicit fee rate in liners per vbyte.
    #[arg(long, value_parser = parse_rate_per_vbyte)]
    fee_rate: Option<u64>,

    /// Transaction lock time.
    #[arg(long)]
    lock_time: Option<u32>,

    /// Broadcast without asking.
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args)]
struct ClearArgs {
    /// Required; the wallet cannot be recovered without a backup.
    #[arg(long)]
    force: bool,
}

/// Everything a command needs, built once at startup.
struct AppContext {
    config: CliConfig,
    session: AsyncSession,
    rpc: RpcClient,
}

impl AppContext {
    async fn load(global: &GlobalArgs) -> Result<Self> {
        let mut config = CliConfig::load(global.config.as_deref())?;
        if let Some(dir) = &global.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(url) = &global.rpc_url {
            config.rpc.url = url.clone();
        }

        let store = Arc::new(FileStore::new(&config.data_dir));
        let session = AsyncSession::open(store, config.session_config())
            .await
            .context("Failed to open wallet store")?;
        let rpc = RpcClient::new(&config.rpc)?;
        Ok(Self {
            config,
            session,
            rpc,
        })
    }

    fn policy(&self) -> SendPolicy {
        self.config.send_policy()
    }

    /// Bring the session to `Ready`, prompting for the passphrase.
    async fn unlock(&self) -> Result<()> {
        match self.session.state().await {
            SessionState::Ready => Ok(()),
            SessionState::Empty => bail!(
                "No wallet in {}; run `baseline-cli create` or `baseline-cli import` first",
                self.config.data_dir.display()
            ),
            SessionState::Locked => {
                let passphrase = read_passphrase("Wallet passphrase", false)?;
                self.session
                    .unlock(passphrase)
                    .await
                    .context("Failed to unlock wallet (check passphrase)")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level, cli.global.log_format);

    let ctx = AppContext::load(&cli.global).await?;
    let result = match cli.command {
        Commands::Create => cmd_create(&ctx).await,
        Commands::Import { source } => cmd_import(&ctx, source).await,
        Commands::Addresses => cmd_addresses(&ctx).await,
        Commands::NewAddress => cmd_new_address(&ctx).await,
        Commands::ExportBackup(args) => cmd_export_backup(&ctx, args).await,
        Commands::Balance => cmd_balance(&ctx).await,
        Commands::Status => cmd_status(&ctx).await,
        Commands::Fee(args) => cmd_fee(&ctx, args).await,
        Commands::Send(args) => cmd_send(&ctx, args).await,
        Commands::TxStatus { txid } => cmd_tx_status(&ctx, &txid).await,
        Commands::Clear(args) => cmd_clear(&ctx, args).await,
    };
    ctx.session.lock().await;
    result
}

/// Logs go to stderr so stdout stays parseable.
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Create a new mnemonic wallet.
async fn cmd_create(ctx: &AppContext) -> Result<()> {
    if ctx.session.state().await != SessionState::Empty {
        bail!(
            "A wallet already exists in {}; run `baseline-cli clear --force` first",
            ctx.config.data_dir.display()
        );
    }
    let passphrase = read_passphrase("New wallet passphrase", true)?;
    let secrets = ctx
        .session
        .create(passphrase)
        .await
        .context("Failed to create wallet")?;

    println!("\n=== WALLET CREATED ===");
    if let WalletSecrets::Mnemonic { phrase, .. } = &secrets {
        println!("\nRECOVERY PHRASE (12 WORDS):");
        println!("  {phrase}");
        println!("\nWARNING: This phrase will NOT be shown again.");
        println!("Anyone with this phrase can spend your funds.");
    }
    print_keys(secrets.keys());
    println!("\nWallet saved to: {}", ctx.config.data_dir.display());
    Ok(())
}

/// Import a secret, replacing the stored wallet only with `--force`.
async fn cmd_import(ctx: &AppContext, command: ImportCommand) -> Result<()> {
    let (source, force) = match command {
        ImportCommand::Mnemonic(args) => (
            ImportSource::Mnemonic(read_secret("Recovery phrase")?),
            args.force,
        ),
        ImportCommand::Key(args) => (
            ImportSource::EncodedKey(read_secret("Private key (WIF)")?),
            args.force,
        ),
        ImportCommand::Backup(args) => {
            let text = std::fs::read_to_string(&args.file)
                .with_context(|| format!("Failed to read backup: {}", args.file.display()))?;
            (ImportSource::SeedBackup(Zeroizing::new(text)), args.force)
        }
    };

    if ctx.session.state().await != SessionState::Empty && !force {
        bail!("A wallet already exists; pass --force to replace it");
    }
    let passphrase = read_passphrase("New wallet passphrase", true)?;
    let secrets = ctx
        .session
        .import(source, passphrase)
        .await
        .context("Import failed")?;

    println!("\n=== WALLET IMPORTED ===");
    println!("Kind: {}", secrets.kind());
    print_keys(secrets.keys());
    Ok(())
}

async fn cmd_addresses(ctx: &AppContext) -> Result<()> {
    ctx.unlock().await?;
    let keys = ctx.session.keys().await;
    for key in &keys {
        match &key.path {
            Some(path) => println!("{}  {}", key.address, path),
            None => println!("{}", key.address),
        }
    }
    Ok(())
}

async fn cmd_new_address(ctx: &AppContext) -> Result<()> {
    ctx.unlock().await?;
    let key = ctx
        .session
        .add_address()
        .await
        .context("Failed to derive address")?;
    println!("{}", key.address);
    Ok(())
}

async fn cmd_export_backup(ctx: &AppContext, args: ExportArgs) -> Result<()> {
    ctx.unlock().await?;
    let backup = ctx
        .session
        .export_backup()
        .await
        .context("Failed to export backup")?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, backup.as_bytes())
                .with_context(|| format!("Failed to write backup: {}", path.display()))?;
            eprintln!("Backup written to: {}", path.display());
            eprintln!("WARNING: The file is NOT encrypted. Store it securely.");
        }
        None => println!("{}", backup.as_str()),
    }
    Ok(())
}

async fn cmd_balance(ctx: &AppContext) -> Result<()> {
    ctx.unlock().await?;
    let addresses = ctx.session.addresses().await;
    let balance = ctx
        .rpc
        .get_address_balance(&addresses)
        .await
        .context("RPC getaddressbalance failed")?;

    println!("Addresses: {}", addresses.len());
    println!(
        "Balance:   {} ({} liners)",
        format_coins(balance.balance_liners),
        balance.balance_liners
    );
    println!(
        "Received:  {} ({} liners)",
        format_coins(balance.received_liners),
        balance.received_liners
    );
    Ok(())
}

async fn cmd_status(ctx: &AppContext) -> Result<()> {
    let info = ctx
        .rpc
        .get_blockchain_info()
        .await
        .context("RPC getblockchaininfo failed")?;

    println!("Node:       {}", ctx.rpc.endpoint());
    println!("Chain:      {}", info.chain);
    println!("Blocks:     {}", info.blocks);
    println!("Headers:    {}", info.headers);
    println!("Difficulty: {}", info.difficulty);
    println!("Synced:     {:.2}%", info.verificationprogress * 100.0);
    if let Some(size) = info.size_on_disk {
        println!("Disk:       {} bytes{}", size, if info.pruned == Some(true) { " (pruned)" } else { "" });
    }
    Ok(())
}

async fn cmd_fee(ctx: &AppContext, args: FeeArgs) -> Result<()> {
    let policy = ctx.policy();
    let base = refresh_estimate(&ctx.rpc, policy.fee_target_blocks).await;
    let decision = effective_fee_rate(base, FeeMode::Auto(args.fee_preset), &policy.fees)?;

    match base {
        Some(rate) => println!(
            "Node estimate: {} liners/kB ({} blocks)",
            rate, policy.fee_target_blocks
        ),
        None => println!(
            "Node estimate: unavailable, using fallback {} liners/kB",
            policy.fees.fallback_fee_rate
        ),
    }
    println!(
        "Effective ({}): {} liners/kB ({} liners/vB){}",
        args.fee_preset,
        decision.rate,
        per_vbyte(decision.rate),
        if decision.clamped { ", raised to relay minimum" } else { "" }
    );
    Ok(())
}

async fn cmd_send(ctx: &AppContext, args: SendArgs) -> Result<()> {
    let fee_mode = match args.fee_rate {
        Some(liners_per_kb) => FeeMode::Custom { liners_per_kb },
        None => FeeMode::Auto(args.fee_preset.unwrap_or_default()),
    };
    let request = SendRequest {
        to_address: args.to,
        amount: args.amount,
        from_address: args.from,
        change_address: args.change,
        fee_mode,
        lock_time: args.lock_time,
    };

    ctx.unlock().await?;
    let prepared = ctx
        .session
        .prepare_send(&ctx.rpc, &request, &ctx.policy())
        .await
        .context("Failed to prepare transaction")?;
    let signed = &prepared.signed;

    println!("\n=== TRANSACTION READY ===");
    println!("To:       {}", prepared.to_address);
    println!("Amount:   {} ({} liners)", format_coins(prepared.amount), prepared.amount);
    println!("Fee:      {} ({} liners)", format_coins(signed.fee), signed.fee);
    println!(
        "Rate:     {} liners/kB{}",
        prepared.fee.rate,
        if prepared.fee.clamped { " (raised to relay minimum)" } else { "" }
    );
    if signed.change > 0 {
        println!("Change:   {} ({} liners)", format_coins(signed.change), signed.change);
    }
    println!("Inputs:   {}", signed.inputs_used);
    println!("Size:     {} vbytes", signed.vsize);
    if let Some(lock_time) = signed.lock_time {
        println!("Locktime: {lock_time}");
    }

    if !args.yes && !confirm("Broadcast this transaction?")? {
        println!("Aborted; nothing was sent.");
        return Ok(());
    }

    let txid = broadcast(&ctx.rpc, &prepared)
        .await
        .context("Broadcast failed")?;
    println!("\n=== TRANSACTION SENT ===");
    println!("TxID: {txid}");
    Ok(())
}

async fn cmd_tx_status(ctx: &AppContext, txid: &str) -> Result<()> {
    let tx = ctx
        .rpc
        .get_raw_transaction(txid)
        .await
        .with_context(|| format!("RPC getrawtransaction failed for {txid}"))?;

    let confirmations = tx["confirmations"].as_u64().unwrap_or(0);
    println!("TxID:          {txid}");
    if confirmations == 0 {
        println!("Status:        unconfirmed");
    } else {
        println!("Status:        confirmed");
        println!("Confirmations: {confirmations}");
        if let Some(block) = tx["blockhash"].as_str() {
            println!("Block:         {block}");
        }
    }
    Ok(())
}

async fn cmd_clear(ctx: &AppContext, args: ClearArgs) -> Result<()> {
    if !args.force {
        bail!("Refusing to erase the wallet without --force");
    }
    ctx.session.clear().await.context("Failed to clear wallet")?;
    println!("Wallet erased from {}", ctx.config.data_dir.display());
    Ok(())
}

fn print_keys(keys: &[DerivedKey]) {
    println!("\nAddresses:");
    for key in keys {
        println!("  {}", key.address);
    }
}

fn per_vbyte(liners_per_kb: u64) -> String {
    format!("{}.{:03}", liners_per_kb / 1_000, liners_per_kb % 1_000)
}

/// Read a passphrase from the environment or the terminal.
fn read_passphrase(prompt: &str, confirm: bool) -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        return Ok(Zeroizing::new(value));
    }
    let passphrase = prompt_password(prompt)?;
    if confirm {
        let again = prompt_password("Confirm passphrase")?;
        if *passphrase != *again {
            bail!("Passphrases do not match");
        }
        if passphrase.is_empty() {
            bail!("Passphrase must not be empty");
        }
    }
    Ok(passphrase)
}

/// Read a secret (phrase or key) without echo.
fn read_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let secret = prompt_password(prompt)?;
    if secret.trim().is_empty() {
        bail!("{prompt} must not be empty");
    }
    Ok(secret)
}

/// Prompt for a password securely (no echo).
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(format!("{}: ", prompt))
        .map(Zeroizing::new)
        .context("Failed to read password")
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush().context("Failed to flush stderr")?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}
