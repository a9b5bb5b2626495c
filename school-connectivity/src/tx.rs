//! Sending transactions and waiting for them to be mined

use std::time::Duration;

use async_dispatch::{BoxError, ErrorCode, FriendlyError};
use chrono::{DateTime, Utc};

use crate::chain::{ChainError, Ledger, TxConfig, TxReceipt, WalletProvider};
use crate::models::Address;

/// How [`wait_receipt`] polls for a receipt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            attempts: 50,
            interval: Duration::from_secs(5),
        }
    }
}

/// Ask the wallet for account access.
pub async fn enable_wallet(wallet: &dyn WalletProvider) -> Result<Vec<Address>, BoxError> {
    match wallet.enable().await {
        Ok(accounts) if !accounts.is_empty() => Ok(accounts),
        Ok(_) | Err(ChainError::NoAccount) => Err(FriendlyError::new(
            ErrorCode::NotSupported,
            "Your browser does not have Ethereum compatible wallet extension",
        )
        .into()),
        Err(err) => Err(FriendlyError::new(
            ErrorCode::InternalError,
            "Could not enable Ethereum wallet",
        )
        .with_detail(err.to_string())
        .into()),
    }
}

/// The wallet's current account, required for signing
pub async fn require_account(wallet: &dyn WalletProvider) -> Result<Address, BoxError> {
    wallet.current_account().await?.ok_or_else(|| {
        FriendlyError::new(
            ErrorCode::ValidationError,
            "Please select account in your wallet provider",
        )
        .into()
    })
}

/// Enable the wallet, then send `tx`. Returns the transaction hash.
pub async fn send_tx(wallet: &dyn WalletProvider, tx: &TxConfig) -> Result<String, BoxError> {
    enable_wallet(wallet).await?;
    let hash = wallet.send_transaction(tx).await?;
    tracing::info!(tx = %hash, "Transaction sent");
    Ok(hash)
}

/// Poll until the transaction is mined.
///
/// A receipt with a failed status is an error, as is running out of attempts.
pub async fn wait_receipt(
    wallet: &dyn WalletProvider,
    tx_hash: &str,
    polling: ReceiptPolling,
) -> Result<TxReceipt, ChainError> {
    for attempt in 1..=polling.attempts {
        match wallet.receipt(tx_hash).await? {
            Some(receipt) if receipt.status => {
                tracing::debug!(tx = %tx_hash, block = receipt.block_number, "Transaction mined");
                return Ok(receipt);
            }
            Some(_) => {
                return Err(ChainError::TxFailed {
                    tx_hash: tx_hash.to_string(),
                })
            }
            None => {
                tracing::debug!(tx = %tx_hash, attempt, "Receipt not available yet");
                tokio::time::sleep(polling.interval).await;
            }
        }
    }
    Err(ChainError::ReceiptTimeout {
        attempts: polling.attempts,
    })
}

/// [`send_tx`] followed by [`wait_receipt`]
pub async fn send_and_wait(
    wallet: &dyn WalletProvider,
    tx: &TxConfig,
    polling: ReceiptPolling,
) -> Result<TxReceipt, BoxError> {
    let hash = send_tx(wallet, tx).await?;
    Ok(wait_receipt(wallet, &hash, polling).await?)
}

/// Mining time of a block, falling back to now when the ledger does not know it
pub async fn block_date(
    ledger: &dyn Ledger,
    block_number: u64,
) -> Result<DateTime<Utc>, ChainError> {
    Ok(ledger.block_date(block_number).await?.unwrap_or_else(Utc::now))
}
