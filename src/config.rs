//! Process configuration loaded from the environment
//!
//! Missing issuer seed or a malformed master key is a configuration error
//! and fatal at boot; everything else has a default.

use std::env;
use std::time::Duration;

/// Environment variable for the durable store connection string
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Environment variable for the AES-256-GCM master key (64 hex chars)
pub const ENV_ENCRYPTION_MASTER_KEY: &str = "ENCRYPTION_MASTER_KEY";

/// Environment variable for the issuer identity seed
pub const ENV_ISSUER_SEED: &str = "ISSUER_SEED";

/// Environment variable for the ledger network selection
pub const ENV_LEDGER_NETWORK: &str = "LEDGER_NETWORK";

/// Environment variable for the credential cache TTL in milliseconds
pub const ENV_SECRET_CACHE_TTL_MS: &str = "SECRET_CACHE_TTL_MS";

/// Environment variable for the inline validation poll interval
pub const ENV_VALIDATION_POLL_INTERVAL_MS: &str = "VALIDATION_POLL_INTERVAL_MS";

/// Environment variable for the inline validation wall-clock budget
pub const ENV_VALIDATION_TIMEOUT_MS: &str = "VALIDATION_TIMEOUT_MS";

/// Environment variable for the background poller sweep interval
pub const ENV_POLLER_SWEEP_INTERVAL_MS: &str = "POLLER_SWEEP_INTERVAL_MS";

/// Default credential cache TTL (1 hour)
const DEFAULT_SECRET_CACHE_TTL_MS: u64 = 3_600_000;

/// Default inline validation poll interval
const DEFAULT_VALIDATION_POLL_INTERVAL_MS: u64 = 2_000;

/// Default inline validation budget
const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 15_000;

/// Default poller sweep interval
const DEFAULT_POLLER_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Ledger network the orchestrator submits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNetwork {
    Testnet,
    Devnet,
    Mainnet,
}

impl LedgerNetwork {
    /// JSON-RPC endpoint for this network.
    pub fn rpc_url(&self) -> &'static str {
        match self {
            LedgerNetwork::Testnet => "https://s.altnet.rippletest.net:51234/",
            LedgerNetwork::Devnet => "https://s.devnet.rippletest.net:51234/",
            LedgerNetwork::Mainnet => "https://xrplcluster.com/",
        }
    }

    /// Faucet endpoint; mainnet has none.
    pub fn faucet_url(&self) -> Option<&'static str> {
        match self {
            LedgerNetwork::Testnet => Some("https://faucet.altnet.rippletest.net/accounts"),
            LedgerNetwork::Devnet => Some("https://faucet.devnet.rippletest.net/accounts"),
            LedgerNetwork::Mainnet => None,
        }
    }
}

impl std::fmt::Display for LedgerNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerNetwork::Testnet => write!(f, "testnet"),
            LedgerNetwork::Devnet => write!(f, "devnet"),
            LedgerNetwork::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl std::str::FromStr for LedgerNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "testnet" => Ok(LedgerNetwork::Testnet),
            "devnet" => Ok(LedgerNetwork::Devnet),
            "mainnet" => Ok(LedgerNetwork::Mainnet),
            _ => Err(format!("Unknown ledger network: {}", s)),
        }
    }
}

/// Errors that make the process unbootable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("ENCRYPTION_MASTER_KEY must be 64 hex characters (32 bytes): {0}")]
    InvalidMasterKey(String),

    #[error("Invalid LEDGER_NETWORK: {0}")]
    InvalidNetwork(String),
}

/// Resolved process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub master_key: [u8; 32],
    pub issuer_seed: String,
    pub network: LedgerNetwork,
    pub secret_cache_ttl: Duration,
    pub validation_poll_interval: Duration,
    pub validation_timeout: Duration,
    pub poller_sweep_interval: Duration,
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var(ENV_DATABASE_URL).map_err(|_| ConfigError::MissingVar(ENV_DATABASE_URL))?;

        let master_key_hex = env::var(ENV_ENCRYPTION_MASTER_KEY)
            .map_err(|_| ConfigError::MissingVar(ENV_ENCRYPTION_MASTER_KEY))?;
        let master_key = parse_master_key(&master_key_hex)?;

        let issuer_seed =
            env::var(ENV_ISSUER_SEED).map_err(|_| ConfigError::MissingVar(ENV_ISSUER_SEED))?;

        let network = match env::var(ENV_LEDGER_NETWORK) {
            Ok(raw) => raw.parse().map_err(ConfigError::InvalidNetwork)?,
            Err(_) => LedgerNetwork::Testnet,
        };

        Ok(Self {
            database_url,
            master_key,
            issuer_seed,
            network,
            secret_cache_ttl: duration_from_env(
                ENV_SECRET_CACHE_TTL_MS,
                DEFAULT_SECRET_CACHE_TTL_MS,
            ),
            validation_poll_interval: duration_from_env(
                ENV_VALIDATION_POLL_INTERVAL_MS,
                DEFAULT_VALIDATION_POLL_INTERVAL_MS,
            ),
            validation_timeout: duration_from_env(
                ENV_VALIDATION_TIMEOUT_MS,
                DEFAULT_VALIDATION_TIMEOUT_MS,
            ),
            poller_sweep_interval: duration_from_env(
                ENV_POLLER_SWEEP_INTERVAL_MS,
                DEFAULT_POLLER_SWEEP_INTERVAL_MS,
            ),
        })
    }
}

/// Decode and length-check the master key.
pub fn parse_master_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw).map_err(|e| ConfigError::InvalidMasterKey(e.to_string()))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidMasterKey(format!("got {} hex chars", raw.len())))?;
    Ok(key)
}

fn duration_from_env(var: &str, default_ms: u64) -> Duration {
    let ms = env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}
