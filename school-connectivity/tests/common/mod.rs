//! Shared world for the saga integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_dispatch::action::Action;
use async_dispatch::{AsyncActionSet, AsyncOp, FriendlyError, Phases};
use chrono::{DateTime, Utc};

use school_connectivity::chain::{CONTRACT_METADATA, ISP_METADATA, SCHOOL_METADATA};
use school_connectivity::memory::InMemoryLedger;
use school_connectivity::models::{
    Address, ContractMetadata, ContractStatus, IspMetadata, SchoolMetadata,
};
use school_connectivity::tx::ReceiptPolling;
use school_connectivity::{build_runtime, Addresses, AppAction, AppConfig, AppRuntime, Services};

pub const CONTRACT_ID: &str = "1600000000000";

pub fn addr(n: u8) -> Address {
    Address::parse(&format!("0x{:040x}", n)).unwrap()
}

pub fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

pub struct World {
    pub ledger: Arc<InMemoryLedger>,
    pub services: Services,
    pub school: Address,
    pub other_school: Address,
    pub isp: Address,
    pub isp_passport: Address,
    pub stranger: Address,
}

impl World {
    /// One school with a 50 Mbps contract with one ISP; a second school
    /// without a contract. The school account is selected.
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let school = addr(0x11);
        let other_school = addr(0x22);
        let isp = addr(0x33);
        let stranger = addr(0x55);
        let unicef_wallet = addr(0x99);
        let factory = addr(0xfa);

        for account in [&school, &other_school, &isp, &stranger] {
            ledger.add_account(account.clone()).unwrap();
        }

        let unicef_passport = ledger.seed_passport(None, &unicef_wallet).unwrap();
        ledger
            .seed_json(
                &unicef_passport,
                &school,
                SCHOOL_METADATA,
                &SchoolMetadata {
                    name: "Escuela Primaria Rural".into(),
                    country: "Colombia".into(),
                    score: 0.6,
                    physical_address: "Vereda El Carmen".into(),
                },
            )
            .unwrap();

        let isp_passport = ledger.seed_passport(Some(&factory), &isp).unwrap();
        ledger
            .seed_json(
                &isp_passport,
                &isp,
                ISP_METADATA,
                &IspMetadata {
                    name: "Andes Fibra".into(),
                    score: 0.9,
                },
            )
            .unwrap();
        ledger
            .seed_json(
                &isp_passport,
                &school,
                CONTRACT_METADATA,
                &ContractMetadata {
                    id: CONTRACT_ID.into(),
                    speed: 50.0,
                    state: ContractStatus::Active,
                },
            )
            .unwrap();

        let addresses = Addresses {
            unicef_passport,
            unicef_wallet,
            passport_factory: factory,
        };
        let services = Services::new(ledger.clone(), ledger.clone(), addresses).with_polling(
            ReceiptPolling {
                attempts: 5,
                interval: Duration::from_secs(5),
            },
        );

        Self {
            ledger,
            services,
            school,
            other_school,
            isp,
            isp_passport,
            stranger,
        }
    }

    pub fn runtime(&self) -> AppRuntime {
        build_runtime(&self.services, &AppConfig::default())
    }
}

/// Dispatch `action` and run until `op` settles, returning the settling action
pub async fn settle<Req, Res>(
    runtime: &mut AppRuntime,
    op: AsyncOp<Req, Res>,
    action: AppAction,
) -> AppAction {
    runtime.enqueue(action);
    tokio::time::timeout(
        Duration::from_secs(600),
        runtime.run_until(|a| op.matches(a.action_type(), Phases::SETTLED)),
    )
    .await
    .expect("timeout")
    .expect("runtime stopped")
}

/// The friendly error of a failure action
pub fn failure_of(action: &AppAction) -> FriendlyError {
    action
        .async_error()
        .cloned()
        .unwrap_or_else(|| panic!("expected a failure, got {}", action.name()))
}
