//! Reducers of the state slices

use async_dispatch::{BuiltReducer, ReducerBuilder};

use crate::action::{
    address_path, contract_path, AppAction, LoadContract, LoadReportingHistory, ReportFact,
    APP_BOOTSTRAPPED, CREATE_CONTRACT, CREATE_ISP, CREATE_SCHOOL, ISP_CREATION_PROGRESS,
    LOAD_CONTRACT, LOAD_CONTRACTS, LOAD_ISP, LOAD_ISPS, LOAD_REPORTING_HISTORY, LOAD_SCHOOL,
    LOAD_SCHOOLS, REPORT_FACT,
};
use crate::state::{AppState, ContractState, IspState, RootState, SchoolState};

pub fn root_reducer() -> BuiltReducer<RootState, AppAction> {
    ReducerBuilder::<RootState, AppAction>::new()
        .slice(|s| &mut s.app, app_reducer())
        .slice(|s| &mut s.school, school_reducer())
        .slice(|s| &mut s.isp, isp_reducer())
        .slice(|s| &mut s.contract, contract_reducer())
        .build()
}

fn app_reducer() -> ReducerBuilder<AppState, AppAction> {
    ReducerBuilder::<AppState, AppAction>::new().add(APP_BOOTSTRAPPED, |state, _| {
        let changed = !state.is_bootstrapped;
        state.is_bootstrapped = true;
        changed
    })
}

fn school_reducer() -> ReducerBuilder<SchoolState, AppAction> {
    ReducerBuilder::<SchoolState, AppAction>::new()
        .add_async(
            LOAD_SCHOOLS,
            |a| match a {
                AppAction::SchoolLoadAll(x) => Some(x),
                _ => None,
            },
            |s| &mut s.all_load_status,
            None,
        )
        .add_async(
            LOAD_SCHOOL,
            |a| match a {
                AppAction::SchoolLoad(x) => Some(x),
                _ => None,
            },
            |s| &mut s.loaded,
            Some(address_path),
        )
        .add_async(
            CREATE_SCHOOL,
            |a| match a {
                AppAction::SchoolCreate(x) => Some(x),
                _ => None,
            },
            |s| &mut s.creation_status,
            None,
        )
}

fn isp_reducer() -> ReducerBuilder<IspState, AppAction> {
    ReducerBuilder::<IspState, AppAction>::new()
        .add_async(
            LOAD_ISPS,
            |a| match a {
                AppAction::IspLoadAll(x) => Some(x),
                _ => None,
            },
            |s| &mut s.all_load_status,
            None,
        )
        .add_async(
            LOAD_ISP,
            |a| match a {
                AppAction::IspLoad(x) => Some(x),
                _ => None,
            },
            |s| &mut s.loaded,
            Some(address_path),
        )
        .add_async(
            CREATE_ISP,
            |a| match a {
                AppAction::IspCreate(x) => Some(x),
                _ => None,
            },
            |s| &mut s.creation_status,
            None,
        )
        .add(CREATE_ISP.request_type(), |state, _| {
            state.creation_progress = None;
            true
        })
        .add(ISP_CREATION_PROGRESS, |state, action| match action {
            AppAction::IspCreationProgress(status) => {
                state.creation_progress = Some(status.clone());
                true
            }
            _ => false,
        })
}

fn contract_reducer() -> ReducerBuilder<ContractState, AppAction> {
    ReducerBuilder::<ContractState, AppAction>::new()
        .add_async(
            LOAD_CONTRACTS,
            |a| match a {
                AppAction::ContractLoadAll(x) => Some(x),
                _ => None,
            },
            |s| &mut s.all_load_status,
            None,
        )
        .add_async(
            LOAD_CONTRACT,
            |a| match a {
                AppAction::ContractLoad(x) => Some(x),
                _ => None,
            },
            |s| &mut s.loaded,
            Some(|req: &LoadContract| contract_path(&req.contract_id)),
        )
        .add_async(
            CREATE_CONTRACT,
            |a| match a {
                AppAction::ContractCreate(x) => Some(x),
                _ => None,
            },
            |s| &mut s.creation_status,
            None,
        )
        .add_async(
            REPORT_FACT,
            |a| match a {
                AppAction::ContractReportFact(x) => Some(x),
                _ => None,
            },
            |s| &mut s.fact_reporting,
            Some(|req: &ReportFact| contract_path(&req.contract.id)),
        )
        .add_async(
            LOAD_REPORTING_HISTORY,
            |a| match a {
                AppAction::ContractLoadReportingHistory(x) => Some(x),
                _ => None,
            },
            |s| &mut s.fact_reporting_history,
            Some(|req: &LoadReportingHistory| contract_path(&req.contract.id)),
        )
}
