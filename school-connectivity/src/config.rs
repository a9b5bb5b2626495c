//! Application configuration
//!
//! Sources, later ones overriding earlier ones:
//! 1. `config/default.toml` when present
//! 2. the file passed with `--config`
//! 3. `CONNECTIVITY__<SECTION>__<KEY>` environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::chain::Network;
use crate::models::{Address, AddressError};
use crate::services::Addresses;
use crate::tx::ReceiptPolling;

pub const ENV_PREFIX: &str = "CONNECTIVITY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkSection,
    pub addresses: AddressSection,
    pub tx: TxSection,
    pub runtime: RuntimeSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_network")]
    pub name: String,
    /// JSON-RPC endpoint of a wallet node, used by `connectivity accounts`
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            name: default_network(),
            rpc_url: None,
        }
    }
}

fn default_network() -> String {
    "ropsten".to_string()
}

/// Well-known contract and wallet addresses, unvalidated
#[derive(Debug, Clone, Deserialize)]
pub struct AddressSection {
    #[serde(default = "default_unicef_passport")]
    pub unicef_passport: String,
    #[serde(default = "default_unicef_wallet")]
    pub unicef_wallet: String,
    #[serde(default = "default_passport_factory")]
    pub passport_factory: String,
}

impl Default for AddressSection {
    fn default() -> Self {
        Self {
            unicef_passport: default_unicef_passport(),
            unicef_wallet: default_unicef_wallet(),
            passport_factory: default_passport_factory(),
        }
    }
}

fn default_unicef_passport() -> String {
    "0x0a13abB8dAB0068E67e264dE1dc4076021F151c1".to_string()
}

fn default_unicef_wallet() -> String {
    "0x8C3F546A89DA0e431Ea2D13a790b199f653cbf01".to_string()
}

fn default_passport_factory() -> String {
    "0xD0d1BeDE01145B62D65Fa7689EBC0261d68EEc07".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxSection {
    #[serde(default = "default_receipt_attempts")]
    pub receipt_attempts: u32,
    #[serde(default = "default_receipt_interval_secs")]
    pub receipt_interval_secs: u64,
}

impl Default for TxSection {
    fn default() -> Self {
        Self {
            receipt_attempts: default_receipt_attempts(),
            receipt_interval_secs: default_receipt_interval_secs(),
        }
    }
}

fn default_receipt_attempts() -> u32 {
    50
}

fn default_receipt_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Capacity of the committed-action channel sagas observe
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Cache timeout of init actions issued by the CLI, -1 meaning forever
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: i64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            cache_timeout_secs: default_cache_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_cache_timeout_secs() -> i64 {
    60
}

fn default_refresh_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    /// Tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Comma-separated action type globs to log
    #[serde(default)]
    pub actions_include: Option<String>,
    #[serde(default)]
    pub actions_exclude: Option<String>,
    #[serde(default = "default_action_log_capacity")]
    pub action_log_capacity: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            actions_include: None,
            actions_exclude: None,
            action_log_capacity: default_action_log_capacity(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_action_log_capacity() -> usize {
    100
}

impl AppConfig {
    pub fn addresses(&self) -> Result<Addresses, AddressError> {
        Ok(Addresses {
            unicef_passport: Address::parse(&self.addresses.unicef_passport)?,
            unicef_wallet: Address::parse(&self.addresses.unicef_wallet)?,
            passport_factory: Address::parse(&self.addresses.passport_factory)?,
        })
    }

    pub fn polling(&self) -> ReceiptPolling {
        ReceiptPolling {
            attempts: self.tx.receipt_attempts,
            interval: Duration::from_secs(self.tx.receipt_interval_secs),
        }
    }

    pub fn network(&self) -> Network {
        Network::from_name(&self.network.name)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.refresh_interval_secs)
    }
}

/// Load configuration from the default file, `config_path` and the environment
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false));

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path));
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
