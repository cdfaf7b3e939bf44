//! Configuration file management.
//!
//! Lookup order: `$TEA_STAKING_CONFIG`, then `$TEA_DATA_DIR/config.toml`,
//! then `~/.tea-staking/config.toml`. A missing file means defaults.
//!
//! Identities are 64-char hex strings. An empty identity is replaced by a
//! deterministic development identity derived from the field name, so the
//! default configuration starts a usable local ledger.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tea_staking::lock::LockConfig;
use tea_staking::LedgerParams;
use tea_types::{address, Address, ONE_TOKEN, TOKEN_DECIMALS};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger identities and tokens.
    #[serde(default)]
    pub ledger: LedgerSection,
    /// Lock policy.
    #[serde(default)]
    pub lock: LockSection,
    /// JSON-RPC settings.
    #[serde(default)]
    pub rpc: RpcSection,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Ledger identities and tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    #[serde(default)]
    pub ledger_address: String,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub treasury: String,
    /// Operator verifying keys.
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default)]
    pub vesting_custody: String,
    #[serde(default)]
    pub primary_token: String,
    #[serde(default)]
    pub auxiliary_tokens: Vec<String>,
    /// Relayer allowed to forward signed stake and withdraw requests.
    #[serde(default)]
    pub trusted_forwarder: String,
    /// Decimals registered for every token in the in-memory bank.
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    /// How often the daemon refreshes the reward accumulator. 0 disables.
    #[serde(default = "default_accrual_interval")]
    pub accrual_interval_secs: u64,
}

/// Lock policy. Thresholds in whole tokens, durations in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSection {
    #[serde(default = "default_large_threshold_tokens")]
    pub large_threshold_tokens: u64,
    #[serde(default = "default_standard_hold")]
    pub standard_hold_secs: u64,
    #[serde(default = "default_large_hold")]
    pub large_hold_secs: u64,
    #[serde(default = "default_large_protect")]
    pub large_protect_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: u64,
}

/// JSON-RPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSection {
    /// Socket path. Empty = `$data_dir/tea-staking.sock`.
    #[serde(default)]
    pub socket_path: String,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level for `tea` targets: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_token_decimals() -> u8 {
    TOKEN_DECIMALS
}

fn default_accrual_interval() -> u64 {
    3_600
}

fn default_large_threshold_tokens() -> u64 {
    1_000_000
}

fn default_standard_hold() -> u64 {
    tea_staking::lock::STANDARD_HOLD
}

fn default_large_hold() -> u64 {
    tea_staking::lock::LARGE_HOLD
}

fn default_large_protect() -> u64 {
    tea_staking::lock::LARGE_PROTECT_WINDOW
}

fn default_cooldown() -> u64 {
    tea_staking::lock::WITHDRAW_COOLDOWN
}

fn default_epoch_duration() -> u64 {
    tea_staking::lock::EPOCH_DURATION
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            ledger_address: String::new(),
            admins: Vec::new(),
            treasury: String::new(),
            operators: Vec::new(),
            vesting_custody: String::new(),
            primary_token: String::new(),
            auxiliary_tokens: Vec::new(),
            trusted_forwarder: String::new(),
            token_decimals: default_token_decimals(),
            accrual_interval_secs: default_accrual_interval(),
        }
    }
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            large_threshold_tokens: default_large_threshold_tokens(),
            standard_hold_secs: default_standard_hold(),
            large_hold_secs: default_large_hold(),
            large_protect_secs: default_large_protect(),
            cooldown_secs: default_cooldown(),
            epoch_duration_secs: default_epoch_duration(),
        }
    }
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            socket_path: String::new(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LockSection {
    /// Convert to the ledger's lock policy.
    pub fn to_lock_config(&self) -> LockConfig {
        LockConfig {
            large_threshold: u128::from(self.large_threshold_tokens).saturating_mul(ONE_TOKEN),
            standard_hold: self.standard_hold_secs,
            large_hold: self.large_hold_secs,
            large_protect: self.large_protect_secs,
            cooldown: self.cooldown_secs,
        }
    }
}

impl LedgerSection {
    /// Resolve every identity and build the ledger parameters.
    pub fn to_params(&self, lock: &LockSection) -> anyhow::Result<LedgerParams> {
        let admins = if self.admins.is_empty() {
            vec![dev_identity("admin")]
        } else {
            parse_all(&self.admins, "admins")?
        };
        let mut params = LedgerParams::new(
            identity(&self.ledger_address, "ledger_address")?,
            admins,
            identity(&self.treasury, "treasury")?,
            parse_all(&self.operators, "operators")?,
            identity(&self.vesting_custody, "vesting_custody")?,
            identity(&self.primary_token, "primary_token")?,
            parse_all(&self.auxiliary_tokens, "auxiliary_tokens")?,
        );
        params.trusted_forwarder = Some(identity(&self.trusted_forwarder, "trusted_forwarder")?);
        params.lock = lock.to_lock_config();
        params.epoch_duration = lock.epoch_duration_secs;
        Ok(params)
    }
}

/// Deterministic development identity for an unset field.
pub fn dev_identity(label: &str) -> Address {
    tea_crypto::blake3::hash(format!("tea-staking dev {label}").as_bytes())
}

fn identity(value: &str, field: &str) -> anyhow::Result<Address> {
    if value.is_empty() {
        return Ok(dev_identity(field));
    }
    address::parse(value).with_context(|| format!("invalid identity in [ledger].{field}"))
}

fn parse_all(values: &[String], field: &str) -> anyhow::Result<Vec<Address>> {
    values
        .iter()
        .map(|v| address::parse(v).with_context(|| format!("invalid identity in [ledger].{field}")))
        .collect()
}

impl DaemonConfig {
    /// Load configuration from the first config file found.
    ///
    /// Falls back to defaults if no file exists.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: DaemonConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Data directory (socket location).
    pub fn data_dir(&self) -> PathBuf {
        Self::default_data_dir()
    }

    /// Socket path for the JSON-RPC server.
    pub fn socket_path(&self) -> PathBuf {
        if self.rpc.socket_path.is_empty() {
            self.data_dir().join("tea-staking.sock")
        } else {
            PathBuf::from(&self.rpc.socket_path)
        }
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TEA_STAKING_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TEA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".tea-staking"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/tea-staking"))
    }
}
