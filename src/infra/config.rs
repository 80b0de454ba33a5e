//! Centralized configuration (environment variables + defaults).

use anyhow::Context;
use solana_program::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LAUNCH_API_BASE_URL: &str = "https://lite-api.jup.ag/studio/v1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Solana RPC URL (required).
    pub solana_rpc_url: String,
    /// Mint of the settlement token (required).
    pub token_mint: Pubkey,
    /// Owner of the treasury token account that collects transfer taxes (required).
    pub treasury: Pubkey,
    /// Base64 AES-256 key for wallet secrets. Settlement fails without it.
    pub wallet_encryption_key: Option<String>,
    /// Postgres URL; when absent the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub launch_api_base_url: String,
    pub bind_addr: String,
    pub notification_batch_delay: Duration,
    pub notification_max_batch_size: usize,
    pub confirm_poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_expiry: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            solana_rpc_url: required("SOLANA_RPC_URL")?,
            token_mint: pubkey_var("SWARMS_TOKEN_ADDRESS")?,
            treasury: pubkey_var("DAO_TREASURY_ADDRESS")?,
            wallet_encryption_key: optional("WALLET_ENCRYPTION_KEY"),
            database_url: optional("DATABASE_URL"),
            launch_api_base_url: optional("LAUNCH_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LAUNCH_API_BASE_URL.to_string()),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            notification_batch_delay: Duration::from_millis(parsed::<u64>("NOTIFICATION_BATCH_DELAY_MS", 5_000)?),
            notification_max_batch_size: parsed::<usize>("NOTIFICATION_MAX_BATCH_SIZE", 50)?.max(1),
            confirm_poll_interval: Duration::from_millis(parsed::<u64>("CONFIRM_POLL_INTERVAL_MS", 500)?),
            reconcile_interval: Duration::from_secs(parsed::<u64>("RECONCILE_INTERVAL_SECS", 30)?.max(1)),
            reconcile_expiry: Duration::from_secs(parsed::<u64>("RECONCILE_EXPIRY_SECS", 300)?),
        })
    }
}

pub fn required(name: &str) -> anyhow::Result<String> {
    optional(name).with_context(|| format!("{} must be set", name))
}

/// Returns the variable when set and non-empty.
pub fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn pubkey_var(name: &str) -> anyhow::Result<Pubkey> {
    let raw = required(name)?;
    Pubkey::from_str(raw.trim()).with_context(|| format!("{} is not a valid Solana address", name))
}

fn parsed<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        None => Ok(default),
    }
}
