//! Application state tree

use async_dispatch::{AsyncMap, AsyncState, PathKey};
use serde::Serialize;

use crate::action::IspCreationStatus;
use crate::models::{Address, Contract, FactReportEntry, Isp, School};

#[derive(Clone, Debug, Default, Serialize)]
pub struct RootState {
    pub app: AppState,
    pub school: SchoolState,
    pub isp: IspState,
    pub contract: ContractState,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AppState {
    pub is_bootstrapped: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SchoolState {
    /// Keyed by school address
    pub loaded: AsyncMap<School>,
    pub all_load_status: AsyncState<()>,
    pub creation_status: AsyncState<School>,
}

impl SchoolState {
    pub fn school(&self, address: &Address) -> Option<&AsyncState<School>> {
        self.loaded.get(&PathKey::from(address.as_str()))
    }

    pub fn schools(&self) -> impl Iterator<Item = &School> {
        self.loaded.values().filter_map(|state| state.data.as_ref())
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IspState {
    /// Keyed by ISP owner address
    pub loaded: AsyncMap<Isp>,
    pub all_load_status: AsyncState<()>,
    pub creation_status: AsyncState<Isp>,
    pub creation_progress: Option<IspCreationStatus>,
}

impl IspState {
    pub fn isp(&self, address: &Address) -> Option<&AsyncState<Isp>> {
        self.loaded.get(&PathKey::from(address.as_str()))
    }

    pub fn isps(&self) -> impl Iterator<Item = &Isp> {
        self.loaded.values().filter_map(|state| state.data.as_ref())
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ContractState {
    /// Keyed by contract id
    pub loaded: AsyncMap<Contract>,
    pub all_load_status: AsyncState<()>,
    pub creation_status: AsyncState<()>,
    pub fact_reporting: AsyncMap<()>,
    pub fact_reporting_history: AsyncMap<Vec<FactReportEntry>>,
}

impl ContractState {
    pub fn contract(&self, id: &str) -> Option<&AsyncState<Contract>> {
        self.loaded.get(&PathKey::from(id))
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.loaded.values().filter_map(|state| state.data.as_ref())
    }

    pub fn history(&self, id: &str) -> Option<&AsyncState<Vec<FactReportEntry>>> {
        self.fact_reporting_history.get(&PathKey::from(id))
    }

    pub fn reporting(&self, id: &str) -> Option<&AsyncState<()>> {
        self.fact_reporting.get(&PathKey::from(id))
    }
}
