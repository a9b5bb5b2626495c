//! Actions of the connectivity application

use async_dispatch::prelude::*;
use async_dispatch::{action_type, subpath, SubPath};
use serde::{Deserialize, Serialize};

use crate::models::{Address, Contract, FactReportEntry, Isp, School};

pub const APP_BOOTSTRAPPED: &str = action_type!("app", "APP_BOOTSTRAPPED");
pub const ISP_CREATION_PROGRESS: &str = action_type!("isp", "ISP_CREATION_PROGRESS");

pub const LOAD_SCHOOLS: AsyncOp<(), ()> = async_op!("school", "LOAD_ALL");
pub const LOAD_SCHOOL: AsyncOp<Address, School> = async_op!("school", "LOAD");
pub const CREATE_SCHOOL: AsyncOp<CreateSchool, School> = async_op!("school", "CREATE_SCHOOL");

pub const LOAD_ISPS: AsyncOp<(), ()> = async_op!("isp", "LOAD_ALL");
pub const LOAD_ISP: AsyncOp<Address, Isp> = async_op!("isp", "LOAD");
pub const CREATE_ISP: AsyncOp<CreateIsp, Isp> = async_op!("isp", "CREATE_ISP");

pub const LOAD_CONTRACTS: AsyncOp<(), ()> = async_op!("contract", "LOAD_ALL");
pub const LOAD_CONTRACT: AsyncOp<LoadContract, Contract> = async_op!("contract", "LOAD");
pub const CREATE_CONTRACT: AsyncOp<CreateContract, ()> = async_op!("contract", "CREATE");
pub const REPORT_FACT: AsyncOp<ReportFact, ()> = async_op!("contract", "REPORT_FACT");
pub const LOAD_REPORTING_HISTORY: AsyncOp<LoadReportingHistory, Vec<FactReportEntry>> =
    async_op!("contract", "LOAD_REPORTING_HISTORY");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSchool {
    pub name: String,
    pub country: String,
    pub score: f64,
    pub physical_address: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateIsp {
    pub name: String,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadContract {
    pub contract_id: String,
    pub isp_passport_address: Address,
    pub school_address: Address,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateContract {
    pub isp_passport_address: Address,
    pub school_address: Address,
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportFact {
    pub contract: Contract,
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadReportingHistory {
    pub contract: Contract,
}

/// Step reached while creating an ISP passport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CreationStep {
    CreatingPassport,
    ClaimingOwnership,
    SubmittingMetadata,
    MetadataSubmitted,
}

impl CreationStep {
    pub fn label(self) -> &'static str {
        match self {
            CreationStep::CreatingPassport => "Creating Passport",
            CreationStep::ClaimingOwnership => "Claiming Ownership",
            CreationStep::SubmittingMetadata => "Submitting Metadata",
            CreationStep::MetadataSubmitted => "Metadata Submitted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IspCreationStatus {
    pub step: CreationStep,
    /// Passport being set up, once created
    pub passport_address: Option<Address>,
}

#[derive(Action, Clone, Debug)]
#[action(infer_categories)]
pub enum AppAction {
    #[action(action_type = "mth/app/APP_BOOTSTRAPPED")]
    AppBootstrapped,

    #[action(async_op)]
    SchoolLoadAll(AsyncAction<(), ()>),
    #[action(async_op)]
    SchoolLoad(AsyncAction<Address, School>),
    #[action(async_op)]
    SchoolCreate(AsyncAction<CreateSchool, School>),

    #[action(async_op)]
    IspLoadAll(AsyncAction<(), ()>),
    #[action(async_op)]
    IspLoad(AsyncAction<Address, Isp>),
    #[action(async_op)]
    IspCreate(AsyncAction<CreateIsp, Isp>),
    #[action(action_type = "mth/isp/ISP_CREATION_PROGRESS")]
    IspCreationProgress(IspCreationStatus),

    #[action(async_op)]
    ContractLoadAll(AsyncAction<(), ()>),
    #[action(async_op)]
    ContractLoad(AsyncAction<LoadContract, Contract>),
    #[action(async_op)]
    ContractCreate(AsyncAction<CreateContract, ()>),
    #[action(async_op)]
    ContractReportFact(AsyncAction<ReportFact, ()>),
    #[action(async_op)]
    ContractLoadReportingHistory(AsyncAction<LoadReportingHistory, Vec<FactReportEntry>>),
}

impl ActionSummary for AppAction {
    fn summary(&self) -> String {
        match self {
            AppAction::ContractLoadReportingHistory(history) => match history.success_payload() {
                Some(entries) => format!("{} ({} days)", self.name(), entries.len()),
                None => format!("{:?}", self),
            },
            AppAction::IspCreationProgress(status) => {
                format!("IspCreationProgress({})", status.step.label())
            }
            _ => format!("{:?}", self),
        }
    }
}

/// Sub-path of an entity addressed by account
pub fn address_path(address: &Address) -> SubPath {
    subpath![address.as_str()]
}

/// Sub-path of a contract
pub fn contract_path(id: &str) -> SubPath {
    subpath![id]
}

impl AppAction {
    /// Id of the entity a request targets: an address or a contract id
    pub fn entity_id(&self) -> Option<String> {
        match self {
            AppAction::SchoolLoad(a) => a.request_payload().map(|addr| addr.to_string()),
            AppAction::IspLoad(a) => a.request_payload().map(|addr| addr.to_string()),
            AppAction::ContractLoad(a) => a.request_payload().map(|req| req.contract_id.clone()),
            AppAction::ContractCreate(a) => {
                a.request_payload().map(|req| req.school_address.to_string())
            }
            AppAction::ContractReportFact(a) => {
                a.request_payload().map(|req| req.contract.id.clone())
            }
            AppAction::ContractLoadReportingHistory(a) => {
                a.request_payload().map(|req| req.contract.id.clone())
            }
            _ => None,
        }
    }
}

/// Task key for keyed watchers: `<type>_<id>`
pub fn task_key(action: &AppAction) -> String {
    match action.entity_id() {
        Some(id) => format!("{}_{}", action.action_type(), id),
        None => action.action_type().to_string(),
    }
}
