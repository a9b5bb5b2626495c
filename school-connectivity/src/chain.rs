//! Ledger and wallet collaborators
//!
//! Sagas never talk to a chain directly: reads go through a [`Ledger`],
//! signed transactions through a [`WalletProvider`]. [`crate::memory`] has an
//! in-memory implementation of both, [`crate::rpc`] a JSON-RPC wallet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Address, AddressError};

/// Fact holding a school's metadata on the UNICEF passport
pub const SCHOOL_METADATA: &str = "school_metadata";
/// Fact holding an ISP's metadata on its own passport
pub const ISP_METADATA: &str = "isp_metadata";
/// Fact holding a contract, written by the school on the ISP passport
pub const CONTRACT_METADATA: &str = "contract_metadata";

/// Fact key of a school's speed reports for a contract
pub fn school_report_key(contract_id: &str) -> String {
    format!("school_report_{contract_id}")
}

/// Fact key of an ISP's speed reports for a contract
pub fn isp_report_key(contract_id: &str) -> String {
    format!("isp_report_{contract_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Network request failed: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Transaction has failed")]
    TxFailed { tx_hash: String },
    #[error("Failed to get receipt after {attempts} retries")]
    ReceiptTimeout { attempts: u32 },
    #[error("unknown passport {0}")]
    UnknownPassport(Address),
    #[error("wallet has no accounts")]
    NoAccount,
    #[error("malformed chain data: {0}")]
    Malformed(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("invalid fact data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Unsigned transaction handed to the wallet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxConfig {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
    pub gas_price: Option<u64>,
    pub value: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: bool,
    /// Contract deployed by the transaction (passport creation)
    pub contract_address: Option<Address>,
}

/// One fact update on a passport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub passport: Address,
    pub fact_provider: Address,
    pub key: String,
    pub block_number: u64,
    pub tx_hash: String,
}

/// Restricts [`Ledger::passport_history`]; `None` matches everything
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryFilter {
    pub provider: Option<Address>,
    pub key: Option<String>,
}

impl HistoryFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            provider: None,
            key: Some(key.into()),
        }
    }

    pub fn by(mut self, provider: &Address) -> Self {
        self.provider = Some(provider.clone());
        self
    }

    pub fn matches(&self, event: &HistoryEvent) -> bool {
        self.provider
            .as_ref()
            .is_none_or(|provider| *provider == event.fact_provider)
            && self.key.as_ref().is_none_or(|key| *key == event.key)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassportRef {
    pub address: Address,
    pub owner: Address,
}

/// Read access to passports and their facts, plus transaction builders
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn passport_history(
        &self,
        passport: &Address,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEvent>, ChainError>;

    /// Passports created by `factory`
    async fn passports(&self, factory: &Address) -> Result<Vec<PassportRef>, ChainError>;

    async fn passport_owner(&self, passport: &Address) -> Result<Address, ChainError>;

    /// Latest value of a fact
    async fn read_fact(
        &self,
        passport: &Address,
        provider: &Address,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ChainError>;

    /// Value written by one transaction
    async fn read_fact_by_tx(&self, tx_hash: &str) -> Result<Option<Vec<u8>>, ChainError>;

    async fn write_fact_tx(
        &self,
        passport: &Address,
        key: &str,
        data: Vec<u8>,
        provider: &Address,
    ) -> Result<TxConfig, ChainError>;

    async fn create_passport_tx(
        &self,
        factory: &Address,
        from: &Address,
    ) -> Result<TxConfig, ChainError>;

    async fn claim_ownership_tx(
        &self,
        passport: &Address,
        from: &Address,
    ) -> Result<TxConfig, ChainError>;

    async fn block_date(&self, block_number: u64) -> Result<Option<DateTime<Utc>>, ChainError>;
}

/// Account selection and transaction signing
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask for account access; returns the exposed accounts
    async fn enable(&self) -> Result<Vec<Address>, ChainError>;

    async fn current_account(&self) -> Result<Option<Address>, ChainError>;

    /// Returns the transaction hash
    async fn send_transaction(&self, tx: &TxConfig) -> Result<String, ChainError>;

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError>;
}

/// Which chain the application talks to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ropsten,
    Mainnet,
    Custom(String),
}

impl Network {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "ropsten" => Network::Ropsten,
            "mainnet" => Network::Mainnet,
            other => Network::Custom(other.to_string()),
        }
    }

    fn etherscan_base(&self) -> Option<&'static str> {
        match self {
            Network::Ropsten => Some("https://ropsten.etherscan.io"),
            Network::Mainnet => Some("https://etherscan.io"),
            Network::Custom(_) => None,
        }
    }
}

/// Block explorer page of an address, for the public networks
pub fn etherscan_url(network: &Network, address: &Address) -> Option<String> {
    network
        .etherscan_base()
        .map(|base| format!("{base}/address/{address}"))
}
