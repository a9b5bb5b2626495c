//! Collaborators shared by the sagas

use std::sync::Arc;

use async_dispatch::ErrorClassifier;

use crate::chain::{Ledger, Network, WalletProvider};
use crate::errors;
use crate::models::Address;
use crate::tx::ReceiptPolling;

/// Well-known contract addresses of a deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Addresses {
    /// Passport holding school metadata facts
    pub unicef_passport: Address,
    pub unicef_wallet: Address,
    pub passport_factory: Address,
}

#[derive(Clone)]
pub struct Services {
    pub ledger: Arc<dyn Ledger>,
    pub wallet: Arc<dyn WalletProvider>,
    pub errors: Arc<ErrorClassifier>,
    pub addresses: Addresses,
    pub network: Network,
    pub polling: ReceiptPolling,
}

impl Services {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        wallet: Arc<dyn WalletProvider>,
        addresses: Addresses,
    ) -> Self {
        Self {
            ledger,
            wallet,
            errors: Arc::new(errors::classifier()),
            addresses,
            network: Network::Ropsten,
            polling: ReceiptPolling::default(),
        }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_polling(mut self, polling: ReceiptPolling) -> Self {
        self.polling = polling;
        self
    }
}
