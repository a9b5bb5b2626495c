//! In-memory ledger and wallet
//!
//! [`InMemoryLedger`] implements both [`Ledger`] and [`WalletProvider`]:
//! transactions built by the ledger are applied when the wallet sends them,
//! each one mining its own block. Used by the tests and by the CLI, seeded
//! from a JSON fixture.
//!
//! ## Limitations
//!
//! - Single process, no persistence
//! - No gas accounting or signature checks

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::{
    ChainError, HistoryEvent, HistoryFilter, Ledger, PassportRef, TxConfig, TxReceipt,
    WalletProvider,
};
use crate::models::Address;

/// Payload of a transaction built by [`InMemoryLedger`]
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
enum LedgerCall {
    WriteFact {
        passport: Address,
        key: String,
        value: String,
    },
    CreatePassport {
        factory: Address,
    },
    ClaimOwnership {
        passport: Address,
    },
}

#[derive(Debug, Clone)]
struct Passport {
    factory: Option<Address>,
    owner: Address,
}

type FactId = (Address, Address, String);

#[derive(Debug, Default)]
struct Inner {
    passports: BTreeMap<Address, Passport>,
    facts: HashMap<FactId, Vec<u8>>,
    history: Vec<HistoryEvent>,
    tx_values: HashMap<String, Vec<u8>>,
    blocks: Vec<DateTime<Utc>>,
    receipts: HashMap<String, TxReceipt>,
    pending_polls: HashMap<String, u32>,
    accounts: Vec<Address>,
    selected: Option<Address>,
    block_time: Option<DateTime<Utc>>,
    receipt_delay: u32,
    fail_next: bool,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn mine(&mut self) -> u64 {
        let time = self.block_time.unwrap_or_else(Utc::now);
        self.blocks.push(time);
        (self.blocks.len() - 1) as u64
    }

    fn passport(&self, address: &Address) -> Result<&Passport, ChainError> {
        self.passports
            .get(address)
            .ok_or_else(|| ChainError::UnknownPassport(address.clone()))
    }

    fn store_fact(
        &mut self,
        passport: &Address,
        provider: &Address,
        key: &str,
        value: Vec<u8>,
        tx_hash: &str,
        block_number: u64,
    ) {
        self.facts.insert(
            (passport.clone(), provider.clone(), key.to_string()),
            value.clone(),
        );
        self.tx_values.insert(tx_hash.to_string(), value);
        self.history.push(HistoryEvent {
            passport: passport.clone(),
            fact_provider: provider.clone(),
            key: key.to_string(),
            block_number,
            tx_hash: tx_hash.to_string(),
        });
    }

    fn create_passport(
        &mut self,
        factory: Option<&Address>,
        owner: &Address,
    ) -> Result<Address, ChainError> {
        let id = self.next_id();
        let address = Address::parse(&format!("0x{:08x}{:032x}", 0xfeed_0001u32, id))?;
        self.passports.insert(
            address.clone(),
            Passport {
                factory: factory.cloned(),
                owner: owner.clone(),
            },
        );
        Ok(address)
    }

    fn apply(
        &mut self,
        from: &Address,
        call: LedgerCall,
        tx_hash: &str,
        block_number: u64,
    ) -> Result<Option<Address>, ChainError> {
        match call {
            LedgerCall::WriteFact {
                passport,
                key,
                value,
            } => {
                self.passport(&passport)?;
                let value = BASE64
                    .decode(value)
                    .map_err(|e| ChainError::Malformed(e.to_string()))?;
                self.store_fact(&passport, from, &key, value, tx_hash, block_number);
                Ok(None)
            }
            LedgerCall::CreatePassport { factory } => {
                self.create_passport(Some(&factory), from).map(Some)
            }
            LedgerCall::ClaimOwnership { passport } => {
                self.passport(&passport)?;
                if let Some(record) = self.passports.get_mut(&passport) {
                    record.owner = from.clone();
                }
                Ok(None)
            }
        }
    }
}

fn poison_err<T>(_: PoisonError<T>) -> ChainError {
    ChainError::Unavailable("lock poisoned".into())
}

/// In-memory ledger and wallet for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ChainError> {
        self.inner.lock().map_err(poison_err)
    }

    /// Expose an account through the wallet. The first one becomes current.
    pub fn add_account(&self, account: Address) -> Result<(), ChainError> {
        let mut inner = self.lock()?;
        if inner.selected.is_none() {
            inner.selected = Some(account.clone());
        }
        inner.accounts.push(account);
        Ok(())
    }

    /// Switch the wallet's current account, `None` meaning locked
    pub fn select_account(&self, account: Option<Address>) -> Result<(), ChainError> {
        self.lock()?.selected = account;
        Ok(())
    }

    /// Timestamp of blocks mined from now on. `None` uses the wall clock.
    pub fn set_block_time(&self, time: Option<DateTime<Utc>>) -> Result<(), ChainError> {
        self.lock()?.block_time = time;
        Ok(())
    }

    /// Receipts of later transactions stay unavailable for `polls` lookups
    pub fn set_receipt_delay(&self, polls: u32) -> Result<(), ChainError> {
        self.lock()?.receipt_delay = polls;
        Ok(())
    }

    /// Mine the next transaction with a failed status, without applying it
    pub fn fail_next_transaction(&self) -> Result<(), ChainError> {
        self.lock()?.fail_next = true;
        Ok(())
    }

    /// Create a passport directly, as if through `factory`
    pub fn seed_passport(
        &self,
        factory: Option<&Address>,
        owner: &Address,
    ) -> Result<Address, ChainError> {
        self.lock()?.create_passport(factory, owner)
    }

    /// Write a fact directly, in a block of its own. Returns the tx hash.
    pub fn seed_fact(
        &self,
        passport: &Address,
        provider: &Address,
        key: &str,
        value: Vec<u8>,
    ) -> Result<String, ChainError> {
        let mut inner = self.lock()?;
        inner.passport(passport)?;
        let tx_hash = format!("0x{:064x}", inner.next_id());
        let block_number = inner.mine();
        inner.store_fact(passport, provider, key, value, &tx_hash, block_number);
        Ok(tx_hash)
    }

    /// [`InMemoryLedger::seed_fact`] with a JSON-encoded value
    pub fn seed_json<T: Serialize>(
        &self,
        passport: &Address,
        provider: &Address,
        key: &str,
        value: &T,
    ) -> Result<String, ChainError> {
        self.seed_fact(passport, provider, key, serde_json::to_vec(value)?)
    }

    pub fn from_fixture(fixture: LedgerFixture) -> Result<Self, FixtureError> {
        let ledger = Self::new();
        for account in fixture.accounts {
            ledger.add_account(account)?;
        }
        if fixture.selected_account.is_some() {
            ledger.select_account(fixture.selected_account)?;
        }

        for passport in fixture.passports {
            let address = {
                let mut inner = ledger.lock()?;
                inner.passports.insert(
                    passport.address.clone(),
                    Passport {
                        factory: passport.factory,
                        owner: passport.owner,
                    },
                );
                passport.address
            };
            for fact in passport.facts {
                let value = BASE64.decode(&fact.value)?;
                ledger.set_block_time(fact.block_time)?;
                ledger.seed_fact(&address, &fact.provider, &fact.key, value)?;
            }
        }
        ledger.set_block_time(None)?;

        Ok(ledger)
    }

    pub fn load_fixture(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_fixture(serde_json::from_str(&raw)?)
    }
}

/// Initial ledger contents, fact values base64-encoded
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerFixture {
    #[serde(default)]
    pub accounts: Vec<Address>,
    #[serde(default)]
    pub selected_account: Option<Address>,
    #[serde(default)]
    pub passports: Vec<PassportFixture>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PassportFixture {
    pub address: Address,
    pub owner: Address,
    #[serde(default)]
    pub factory: Option<Address>,
    #[serde(default)]
    pub facts: Vec<FactFixture>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FactFixture {
    pub provider: Address,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub block_time: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid fixture: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid fact value: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn passport_history(
        &self,
        passport: &Address,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEvent>, ChainError> {
        let inner = self.lock()?;
        Ok(inner
            .history
            .iter()
            .filter(|event| event.passport == *passport && filter.matches(event))
            .cloned()
            .collect())
    }

    async fn passports(&self, factory: &Address) -> Result<Vec<PassportRef>, ChainError> {
        let inner = self.lock()?;
        Ok(inner
            .passports
            .iter()
            .filter(|(_, passport)| passport.factory.as_ref() == Some(factory))
            .map(|(address, passport)| PassportRef {
                address: address.clone(),
                owner: passport.owner.clone(),
            })
            .collect())
    }

    async fn passport_owner(&self, passport: &Address) -> Result<Address, ChainError> {
        Ok(self.lock()?.passport(passport)?.owner.clone())
    }

    async fn read_fact(
        &self,
        passport: &Address,
        provider: &Address,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ChainError> {
        let inner = self.lock()?;
        inner.passport(passport)?;
        Ok(inner
            .facts
            .get(&(passport.clone(), provider.clone(), key.to_string()))
            .cloned())
    }

    async fn read_fact_by_tx(&self, tx_hash: &str) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.lock()?.tx_values.get(tx_hash).cloned())
    }

    async fn write_fact_tx(
        &self,
        passport: &Address,
        key: &str,
        data: Vec<u8>,
        provider: &Address,
    ) -> Result<TxConfig, ChainError> {
        let call = LedgerCall::WriteFact {
            passport: passport.clone(),
            key: key.to_string(),
            value: BASE64.encode(data),
        };
        Ok(TxConfig {
            from: Some(provider.clone()),
            to: Some(passport.clone()),
            data: serde_json::to_vec(&call)?,
            ..TxConfig::default()
        })
    }

    async fn create_passport_tx(
        &self,
        factory: &Address,
        from: &Address,
    ) -> Result<TxConfig, ChainError> {
        let call = LedgerCall::CreatePassport {
            factory: factory.clone(),
        };
        Ok(TxConfig {
            from: Some(from.clone()),
            to: Some(factory.clone()),
            data: serde_json::to_vec(&call)?,
            ..TxConfig::default()
        })
    }

    async fn claim_ownership_tx(
        &self,
        passport: &Address,
        from: &Address,
    ) -> Result<TxConfig, ChainError> {
        let call = LedgerCall::ClaimOwnership {
            passport: passport.clone(),
        };
        Ok(TxConfig {
            from: Some(from.clone()),
            to: Some(passport.clone()),
            data: serde_json::to_vec(&call)?,
            ..TxConfig::default()
        })
    }

    async fn block_date(&self, block_number: u64) -> Result<Option<DateTime<Utc>>, ChainError> {
        Ok(self.lock()?.blocks.get(block_number as usize).copied())
    }
}

#[async_trait]
impl WalletProvider for InMemoryLedger {
    async fn enable(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self.lock()?.accounts.clone())
    }

    async fn current_account(&self) -> Result<Option<Address>, ChainError> {
        Ok(self.lock()?.selected.clone())
    }

    async fn send_transaction(&self, tx: &TxConfig) -> Result<String, ChainError> {
        let call: LedgerCall = serde_json::from_slice(&tx.data)?;
        let mut inner = self.lock()?;
        let from = tx
            .from
            .clone()
            .or_else(|| inner.selected.clone())
            .ok_or(ChainError::NoAccount)?;

        let tx_hash = format!("0x{:064x}", inner.next_id());
        let block_number = inner.mine();
        let failed = std::mem::take(&mut inner.fail_next);

        let contract_address = if failed {
            None
        } else {
            inner.apply(&from, call, &tx_hash, block_number)?
        };

        inner.receipts.insert(
            tx_hash.clone(),
            TxReceipt {
                tx_hash: tx_hash.clone(),
                block_number,
                status: !failed,
                contract_address,
            },
        );
        let delay = inner.receipt_delay;
        if delay > 0 {
            inner.pending_polls.insert(tx_hash.clone(), delay);
        }

        tracing::debug!(tx = %tx_hash, block = block_number, failed, "Mined in-memory transaction");
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let mut inner = self.lock()?;
        if let Some(polls) = inner.pending_polls.get_mut(tx_hash) {
            *polls -= 1;
            if *polls == 0 {
                inner.pending_polls.remove(tx_hash);
            }
            return Ok(None);
        }
        Ok(inner.receipts.get(tx_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SCHOOL_METADATA;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[tokio::test]
    async fn test_write_fact_through_wallet() {
        let ledger = InMemoryLedger::new();
        let owner = addr(1);
        let school = addr(2);
        ledger.add_account(school.clone()).unwrap();
        let passport = ledger.seed_passport(None, &owner).unwrap();

        let tx = ledger
            .write_fact_tx(&passport, SCHOOL_METADATA, b"{}".to_vec(), &school)
            .await
            .unwrap();
        let hash = ledger.send_transaction(&tx).await.unwrap();

        let receipt = ledger.receipt(&hash).await.unwrap().unwrap();
        assert!(receipt.status);
        assert_eq!(
            ledger.read_fact(&passport, &school, SCHOOL_METADATA).await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(ledger.read_fact_by_tx(&hash).await.unwrap(), Some(b"{}".to_vec()));

        let history = ledger
            .passport_history(&passport, &HistoryFilter::key(SCHOOL_METADATA).by(&school))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].block_number, receipt.block_number);
        assert!(ledger.block_date(receipt.block_number).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_passport() {
        let ledger = InMemoryLedger::new();
        let err = ledger.read_fact(&addr(9), &addr(1), "k").await.unwrap_err();
        assert!(matches!(err, ChainError::UnknownPassport(_)));
    }

    #[tokio::test]
    async fn test_passport_creation_and_claim() {
        let ledger = InMemoryLedger::new();
        let factory = addr(0xf0);
        let isp = addr(3);

        let tx = ledger.create_passport_tx(&factory, &isp).await.unwrap();
        let hash = ledger.send_transaction(&tx).await.unwrap();
        let passport = ledger
            .receipt(&hash)
            .await
            .unwrap()
            .and_then(|r| r.contract_address)
            .unwrap();

        let tx = ledger.claim_ownership_tx(&passport, &isp).await.unwrap();
        ledger.send_transaction(&tx).await.unwrap();

        let listed = ledger.passports(&factory).await.unwrap();
        assert_eq!(listed, vec![PassportRef { address: passport.clone(), owner: isp.clone() }]);
        assert_eq!(ledger.passport_owner(&passport).await.unwrap(), isp);
    }

    #[tokio::test]
    async fn test_receipt_delay_and_failure() {
        let ledger = InMemoryLedger::new();
        let owner = addr(1);
        let passport = ledger.seed_passport(None, &owner).unwrap();
        ledger.set_receipt_delay(2).unwrap();
        ledger.fail_next_transaction().unwrap();

        let tx = ledger.write_fact_tx(&passport, "k", vec![1], &owner).await.unwrap();
        let hash = ledger.send_transaction(&tx).await.unwrap();

        assert!(ledger.receipt(&hash).await.unwrap().is_none());
        assert!(ledger.receipt(&hash).await.unwrap().is_none());
        let receipt = ledger.receipt(&hash).await.unwrap().unwrap();
        assert!(!receipt.status);
        assert_eq!(ledger.read_fact(&passport, &owner, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fixture() {
        let raw = format!(
            r#"{{
                "accounts": ["{a}"],
                "passports": [{{
                    "address": "{p}",
                    "owner": "{a}",
                    "facts": [{{
                        "provider": "{a}",
                        "key": "school_metadata",
                        "value": "{v}",
                        "block_time": "2019-03-01T10:00:00Z"
                    }}]
                }}]
            }}"#,
            a = addr(1),
            p = addr(0x10),
            v = BASE64.encode(br#"{"name":"School 1"}"#),
        );
        let ledger = InMemoryLedger::from_fixture(serde_json::from_str(&raw).unwrap()).unwrap();

        assert_eq!(ledger.current_account().await.unwrap(), Some(addr(1)));
        let value = ledger
            .read_fact(&addr(0x10), &addr(1), SCHOOL_METADATA)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, br#"{"name":"School 1"}"#.to_vec());

        let history = ledger
            .passport_history(&addr(0x10), &HistoryFilter::default())
            .await
            .unwrap();
        let date = ledger.block_date(history[0].block_number).await.unwrap().unwrap();
        assert_eq!(date.to_rfc3339(), "2019-03-01T10:00:00+00:00");
    }
}
