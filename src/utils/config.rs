//! Configuration management
//!
//! Settings come from an optional TOML file (every section has defaults),
//! overridden by environment variables, usually loaded from `.env`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{read_keypair_file, write_keypair_file, Keypair},
    signer::Signer,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::block_engine::{RetryPolicy, TransactionLandingMode};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    #[default]
    Mainnet,
    Devnet,
}

impl Cluster {
    /// `?cluster=` suffix for explorer links.
    pub fn explorer_suffix(&self) -> &'static str {
        match self {
            Cluster::Mainnet => "mainnet",
            Cluster::Devnet => "devnet",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub solana: SolanaConfig,
    pub landing: LandingConfig,
    pub retry: RetryConfig,
    pub trading: TradingConfig,
    pub copy_trade: CopyTradeConfig,
    pub logging: LoggingConfig,
}

/// Solana network configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub devnet_rpc_url: String,
    /// Separate endpoint for watching the tracked wallet.
    pub copy_trade_rpc_url: Option<String>,
    pub commitment: String,
    pub request_timeout_secs: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            devnet_rpc_url: "https://api.devnet.solana.com".to_string(),
            copy_trade_rpc_url: None,
            commitment: "confirmed".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Transaction landing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LandingConfig {
    /// Default strategy for swaps.
    pub mode: TransactionLandingMode,
    pub relay_url: String,
    pub relay_api_key: Option<String>,
    /// Relay tip in SOL.
    pub tip_sol: f64,
    pub ack_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub skip_preflight: bool,
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            mode: TransactionLandingMode::Relay,
            relay_url: "https://mainnet.block-engine.jito.wtf/api/v1/transactions".to_string(),
            relay_api_key: None,
            tip_sol: 0.00009,
            ack_timeout_ms: 5_000,
            poll_interval_ms: 2_500,
            skip_preflight: false,
        }
    }
}

/// Bounds of the rebuild loop. `max_attempts = 0` and `max_elapsed_secs = 0`
/// disable the respective bound.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub max_elapsed_secs: u64,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            max_elapsed_secs: 300,
            backoff_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            max_elapsed: (self.max_elapsed_secs > 0).then(|| Duration::from_secs(self.max_elapsed_secs)),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Slippage and compute budget of the trading operations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TradingConfig {
    pub buy_slippage_pct: f64,
    pub sell_slippage_pct: f64,
    pub liquidity_slippage_pct: f64,
    /// Micro-lamports per compute unit on swaps.
    pub swap_unit_price: u64,
    pub volume_unit_limit: u32,
    pub volume_unit_price: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_slippage_pct: 1.0,
            sell_slippage_pct: 0.1,
            liquidity_slippage_pct: 0.5,
            swap_unit_price: 2_000,
            volume_unit_limit: 200_000,
            volume_unit_price: 9_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CopyTradeConfig {
    pub smart_money_wallet: Option<String>,
    pub positions_file: PathBuf,
    pub interval_ms: u64,
}

impl Default for CopyTradeConfig {
    fn default() -> Self {
        Self {
            smart_money_wallet: None,
            positions_file: PathBuf::from("data/bought-tokens.json"),
            interval_ms: 2_500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "raydium-cli.log".to_string(),
            json_file: true,
        }
    }
}

impl Config {
    /// Loads `path` when it exists, defaults otherwise, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parses `path` without environment overrides. Missing files yield defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, normally the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = var("RPC_HTTP") {
            self.solana.rpc_url = url;
        }
        if let Some(url) = var("DEVNET_RPC_HTTP") {
            self.solana.devnet_rpc_url = url;
        }
        if let Some(url) = var("COPY_TRADE_RPC_HTTP") {
            self.solana.copy_trade_rpc_url = Some(url);
        }
        if let Some(url) = var("RELAY_URL") {
            self.landing.relay_url = url;
        }
        if let Some(fee) = var("JITO_FEE") {
            self.landing.tip_sol = fee.trim().parse().map_err(|_| ConfigError::Env {
                key: "JITO_FEE",
                value: fee.clone(),
            })?;
        }
        if let Some(mode) = var("TRANSACTION_LANDING_SERVICE") {
            self.landing.mode = TransactionLandingMode::from_str(&mode).map_err(|_| ConfigError::Env {
                key: "TRANSACTION_LANDING_SERVICE",
                value: mode.clone(),
            })?;
        }
        if let Some(wallet) = var("SMART_MONEY_WALLET") {
            self.copy_trade.smart_money_wallet = Some(wallet);
        }
        if let Some(path) = var("POSITIONS_FILE") {
            self.copy_trade.positions_file = PathBuf::from(path);
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("solana.rpc_url", Some(&self.solana.rpc_url)),
            ("solana.devnet_rpc_url", Some(&self.solana.devnet_rpc_url)),
            ("solana.copy_trade_rpc_url", self.solana.copy_trade_rpc_url.as_ref()),
            ("landing.relay_url", Some(&self.landing.relay_url)),
        ];
        for (key, url) in urls {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!("{} must be an http(s) url, got {}", key, url)));
                }
            }
        }

        for (key, pct) in [
            ("trading.buy_slippage_pct", self.trading.buy_slippage_pct),
            ("trading.sell_slippage_pct", self.trading.sell_slippage_pct),
            ("trading.liquidity_slippage_pct", self.trading.liquidity_slippage_pct),
        ] {
            if !(0.0..100.0).contains(&pct) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 100), got {}", key, pct)));
            }
        }

        // upper bound guards against a tip typed in lamports
        if !(0.0..=0.1).contains(&self.landing.tip_sol) {
            return Err(ConfigError::Invalid(format!(
                "landing.tip_sol must be within [0, 0.1] SOL, got {}",
                self.landing.tip_sol
            )));
        }

        if self.landing.poll_interval_ms == 0 || self.landing.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "landing.poll_interval_ms and landing.ack_timeout_ms must be positive".to_string(),
            ));
        }

        if let Some(wallet) = &self.copy_trade.smart_money_wallet {
            Pubkey::from_str(wallet).map_err(|_| {
                ConfigError::Invalid(format!("copy_trade.smart_money_wallet is not a valid address: {}", wallet))
            })?;
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn rpc_url(&self, cluster: Cluster) -> &str {
        match cluster {
            Cluster::Mainnet => &self.solana.rpc_url,
            Cluster::Devnet => &self.solana.devnet_rpc_url,
        }
    }

    pub fn commitment(&self) -> CommitmentConfig {
        match self.solana.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.solana.request_timeout_secs)
    }

    pub fn smart_money_wallet(&self) -> anyhow::Result<Pubkey> {
        let wallet = self
            .copy_trade
            .smart_money_wallet
            .as_deref()
            .ok_or_else(|| anyhow!("no tracked wallet: pass --wallet or set SMART_MONEY_WALLET"))?;
        Pubkey::from_str(wallet).with_context(|| format!("invalid tracked wallet {}", wallet))
    }
}

/// Keypair from `--payer` when given (generated and saved when the file does
/// not exist yet), otherwise from the base58 `PRIVATE_KEY` variable.
pub fn load_wallet(payer: Option<&Path>) -> anyhow::Result<Keypair> {
    if let Some(path) = payer {
        if path.exists() {
            return read_keypair_file(path)
                .map_err(|e| anyhow!("failed to read keypair {}: {}", path.display(), e));
        }
        let keypair = Keypair::new();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        write_keypair_file(&keypair, path)
            .map_err(|e| anyhow!("failed to write keypair {}: {}", path.display(), e))?;
        warn!(path = %path.display(), pubkey = %keypair.pubkey(), "created new keypair");
        return Ok(keypair);
    }

    let private_key = std::env::var("PRIVATE_KEY")
        .context("no wallet: pass --payer <keypair file> or set PRIVATE_KEY")?;
    keypair_from_base58(private_key.trim())
}

pub fn keypair_from_base58(encoded: &str) -> anyhow::Result<Keypair> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .context("PRIVATE_KEY is not valid base58")?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| anyhow!("PRIVATE_KEY is not a valid keypair: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.landing.mode, TransactionLandingMode::Relay);
        assert_eq!(config.landing.poll_interval_ms, 2_500);
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[trading]\nbuy_slippage_pct = 2.5\n\n[retry]\nmax_attempts = 0\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.trading.buy_slippage_pct, 2.5);
        assert_eq!(config.trading.sell_slippage_pct, 0.1);
        assert_eq!(config.retry.policy().max_attempts, None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.landing.mode, TransactionLandingMode::Relay);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = Config::default();
        let wallet = Pubkey::new_unique().to_string();

        config
            .apply_env(env(&[
                ("RPC_HTTP", "https://rpc.example.org"),
                ("JITO_FEE", "0.0002"),
                ("TRANSACTION_LANDING_SERVICE", "normal"),
                ("SMART_MONEY_WALLET", &wallet),
                ("POSITIONS_FILE", "/tmp/positions.json"),
                ("DEVNET_RPC_HTTP", ""),
            ]))
            .unwrap();

        assert_eq!(config.solana.rpc_url, "https://rpc.example.org");
        assert_eq!(config.solana.devnet_rpc_url, SolanaConfig::default().devnet_rpc_url);
        assert_eq!(config.landing.tip_sol, 0.0002);
        assert_eq!(config.landing.mode, TransactionLandingMode::Direct);
        assert_eq!(config.smart_money_wallet().unwrap().to_string(), wallet);
        assert_eq!(config.copy_trade.positions_file, PathBuf::from("/tmp/positions.json"));
    }

    #[test]
    fn rejects_unparseable_overrides() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("JITO_FEE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "JITO_FEE", .. }));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = Config::default();
        config.landing.tip_sol = 90_000.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.solana.rpc_url = "localhost:8899".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.copy_trade.smart_money_wallet = Some("nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn payer_file_is_created_then_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys/payer.json");

        let created = load_wallet(Some(&path)).unwrap();
        let reloaded = load_wallet(Some(&path)).unwrap();

        assert_eq!(created.pubkey(), reloaded.pubkey());
    }

    #[test]
    fn decodes_base58_private_key() {
        let keypair = Keypair::new();
        let decoded = keypair_from_base58(&keypair.to_base58_string()).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
        assert!(keypair_from_base58("0OIl").is_err());
        // a bare 32-byte secret is not a keypair
        assert!(keypair_from_base58(&bs58::encode([7u8; 32]).into_string()).is_err());
    }
}
