//! Contracts and speed reports
//!
//! A contract is a `contract_metadata` fact written by the school on the ISP
//! passport. Both parties then report measured speeds as
//! `school_report_<id>` / `isp_report_<id>` facts on the same passport.

use std::collections::{BTreeMap, BTreeSet};

use async_dispatch::{
    take_every_latest, take_latest, CacheOptions, DispatchStore, ErrorCode, FriendlyError,
    TaskError,
};
use chrono::{NaiveTime, Utc};

use super::{call, decode, encode, fail, guarded, requested, Ctx, Runtime};
use crate::action::{
    contract_path, task_key, AppAction, LoadReportingHistory, CREATE_CONTRACT, LOAD_CONTRACT,
    LOAD_CONTRACTS, LOAD_ISPS, LOAD_REPORTING_HISTORY, REPORT_FACT,
};
use crate::chain::{
    isp_report_key, school_report_key, HistoryEvent, HistoryFilter, CONTRACT_METADATA,
};
use crate::models::{
    Address, Contract, ContractMetadata, ContractStatus, FactReport, FactReportEntry, Isp,
};
use crate::score::connectivity_score;
use crate::services::Services;
use crate::state::RootState;
use crate::tx::{block_date, require_account, send_and_wait};

pub fn spawn<St: DispatchStore<RootState, AppAction>>(
    runtime: &mut Runtime<St>,
    services: &Services,
) {
    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_latest(ctx, requested(LOAD_CONTRACTS), move |ctx, _| {
            load_all(ctx, s.clone())
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(ctx, requested(LOAD_CONTRACT), task_key, move |ctx, action| {
            load_one(ctx, s.clone(), action)
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(ctx, requested(CREATE_CONTRACT), task_key, move |ctx, action| {
            create(ctx, s.clone(), action)
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(ctx, requested(REPORT_FACT), task_key, move |ctx, action| {
            report_fact(ctx, s.clone(), action)
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(
            ctx,
            requested(LOAD_REPORTING_HISTORY),
            task_key,
            move |ctx, action| load_history(ctx, s.clone(), action),
        )
    });
}

/// Score stored with the school's latest report, if any
async fn latest_score(
    ctx: &Ctx,
    services: &Services,
    contract: &Contract,
) -> Result<Option<f64>, TaskError> {
    let raw = call(
        ctx,
        services.ledger.read_fact(
            &contract.isp_passport_address,
            &contract.school_address,
            &school_report_key(&contract.id),
        ),
    )
    .await?;
    match raw {
        Some(raw) => Ok(decode::<FactReport>(&raw)?.connectivity_score),
        None => Ok(None),
    }
}

/// First `contract_metadata` event of a school on a passport
async fn contract_event(
    ctx: &Ctx,
    services: &Services,
    passport: &Address,
    school: &Address,
) -> Result<Option<HistoryEvent>, TaskError> {
    let events = call(
        ctx,
        services
            .ledger
            .passport_history(passport, &HistoryFilter::key(CONTRACT_METADATA).by(school)),
    )
    .await?;
    Ok(events.into_iter().next())
}

async fn load_isp_contracts(ctx: &Ctx, services: &Services, isp: &Isp) -> Result<usize, TaskError> {
    let passport = &isp.passport_address;
    let events = call(
        ctx,
        services
            .ledger
            .passport_history(passport, &HistoryFilter::key(CONTRACT_METADATA)),
    )
    .await?;

    let mut schools = BTreeSet::new();
    for event in events {
        if !schools.insert(event.fact_provider.clone()) {
            continue;
        }
        let raw = call(
            ctx,
            services
                .ledger
                .read_fact(passport, &event.fact_provider, CONTRACT_METADATA),
        )
        .await?;
        let Some(raw) = raw else { continue };

        let mut contract = decode::<ContractMetadata>(&raw)?
            .into_contract(passport.clone(), event.fact_provider.clone());
        contract.isp_address = Some(isp.address.clone());
        contract.date = Some(call(ctx, block_date(&*services.ledger, event.block_number)).await?);
        contract.connectivity_score = latest_score(ctx, services, &contract).await?;

        let path = contract_path(&contract.id);
        ctx.put(AppAction::ContractLoad(LOAD_CONTRACT.success(contract, Some(path))))?;
    }
    Ok(schools.len())
}

async fn load_all(ctx: Ctx, services: Services) -> Result<(), TaskError> {
    let work = async {
        ctx.put_and_take_async(
            LOAD_ISPS,
            AppAction::IspLoadAll(LOAD_ISPS.init((), CacheOptions::timeout(-1))),
        )
        .await?;

        let isps: Vec<Isp> = ctx.select_state(|s| s.isp.isps().cloned().collect());
        let mut loaded = 0;
        for isp in &isps {
            loaded += load_isp_contracts(&ctx, &services, isp).await?;
        }

        tracing::info!(isps = isps.len(), contracts = loaded, "Contracts loaded");
        ctx.put(AppAction::ContractLoadAll(LOAD_CONTRACTS.success((), None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::ContractLoadAll(LOAD_CONTRACTS.failure(error, Some(()), None))
    })
    .await
}

fn contract_not_found() -> TaskError {
    fail(FriendlyError::new(
        ErrorCode::ResourceNotFound,
        "Specified contract was not found",
    ))
}

async fn load_one(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::ContractLoad(load) = action else {
        return Ok(());
    };
    let Some(req) = load.request_payload().cloned() else {
        return Ok(());
    };
    let path = contract_path(&req.contract_id);

    let work = async {
        let raw = call(
            &ctx,
            services.ledger.read_fact(
                &req.isp_passport_address,
                &req.school_address,
                CONTRACT_METADATA,
            ),
        )
        .await?
        .ok_or_else(contract_not_found)?;

        let metadata = decode::<ContractMetadata>(&raw)?;
        if metadata.id != req.contract_id {
            return Err(contract_not_found());
        }
        let mut contract =
            metadata.into_contract(req.isp_passport_address.clone(), req.school_address.clone());
        contract.isp_address = Some(
            call(&ctx, services.ledger.passport_owner(&req.isp_passport_address)).await?,
        );
        if let Some(event) =
            contract_event(&ctx, &services, &req.isp_passport_address, &req.school_address).await?
        {
            contract.date =
                Some(call(&ctx, block_date(&*services.ledger, event.block_number)).await?);
        }
        contract.connectivity_score = latest_score(&ctx, &services, &contract).await?;

        ctx.put(AppAction::ContractLoad(LOAD_CONTRACT.success(contract, Some(path.clone()))))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::ContractLoad(LOAD_CONTRACT.failure(error, Some(req.clone()), Some(path.clone())))
    })
    .await
}

async fn create(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::ContractCreate(create) = action else {
        return Ok(());
    };
    let Some(req) = create.request_payload().cloned() else {
        return Ok(());
    };

    let work = async {
        let now = Utc::now();
        let metadata = ContractMetadata {
            id: now.timestamp_millis().to_string(),
            speed: req.speed,
            state: ContractStatus::Active,
        };

        let tx = call(
            &ctx,
            services.ledger.write_fact_tx(
                &req.isp_passport_address,
                CONTRACT_METADATA,
                encode(&metadata)?,
                &req.school_address,
            ),
        )
        .await?;
        call(&ctx, send_and_wait(&*services.wallet, &tx, services.polling)).await?;
        let owner = call(&ctx, services.ledger.passport_owner(&req.isp_passport_address)).await?;

        let mut contract =
            metadata.into_contract(req.isp_passport_address.clone(), req.school_address.clone());
        contract.isp_address = Some(owner);
        contract.date = Some(now);

        tracing::info!(
            contract = %contract.id,
            school = %contract.school_address,
            "Contract created"
        );
        let path = contract_path(&contract.id);
        ctx.put(AppAction::ContractLoad(LOAD_CONTRACT.success(contract, Some(path))))?;
        ctx.put(AppAction::ContractCreate(CREATE_CONTRACT.success((), None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::ContractCreate(CREATE_CONTRACT.failure(error, Some(req.clone()), None))
    })
    .await
}

async fn report_fact(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::ContractReportFact(report) = action else {
        return Ok(());
    };
    let Some(req) = report.request_payload().cloned() else {
        return Ok(());
    };
    let contract = &req.contract;
    let path = contract_path(&contract.id);

    let work = async {
        let account = call(&ctx, require_account(&*services.wallet)).await?;
        let by_school = contract.school_address == account;
        let by_isp = contract.isp_address.as_ref() == Some(&account);
        if !by_school && !by_isp {
            return Err(fail(FriendlyError::new(
                ErrorCode::ValidationError,
                "You must select current contract's ISP or school address in your wallet provider",
            )));
        }

        let mut score = None;
        let key = if by_school {
            ctx.put_and_take_async(
                LOAD_REPORTING_HISTORY,
                AppAction::ContractLoadReportingHistory(LOAD_REPORTING_HISTORY.init(
                    LoadReportingHistory {
                        contract: contract.clone(),
                    },
                    CacheOptions::timeout(-1),
                )),
            )
            .await?;
            let history: Vec<FactReportEntry> = ctx.select_state(|s| {
                s.contract
                    .history(&contract.id)
                    .and_then(|h| h.data.clone())
                    .unwrap_or_default()
            });
            score = Some(connectivity_score(
                contract,
                &history,
                Utc::now().date_naive(),
                req.speed,
            ));
            school_report_key(&contract.id)
        } else {
            isp_report_key(&contract.id)
        };

        let fact = FactReport {
            speed: req.speed,
            connectivity_score: score,
        };
        let tx = call(
            &ctx,
            services.ledger.write_fact_tx(
                &contract.isp_passport_address,
                &key,
                encode(&fact)?,
                &account,
            ),
        )
        .await?;
        call(&ctx, send_and_wait(&*services.wallet, &tx, services.polling)).await?;
        tracing::info!(contract = %contract.id, speed = req.speed, ?score, "Speed reported");

        ctx.put(AppAction::ContractLoadReportingHistory(LOAD_REPORTING_HISTORY.init(
            LoadReportingHistory {
                contract: contract.clone(),
            },
            CacheOptions::none(),
        )))?;
        if let Some(score) = score {
            let mut updated = contract.clone();
            updated.connectivity_score = Some(score);
            ctx.put(AppAction::ContractLoad(
                LOAD_CONTRACT.success(updated, Some(path.clone())),
            ))?;
        }
        ctx.put(AppAction::ContractReportFact(
            REPORT_FACT.success((), Some(path.clone())),
        ))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::ContractReportFact(REPORT_FACT.failure(
            error,
            Some(req.clone()),
            Some(path.clone()),
        ))
    })
    .await
}

async fn report_events(
    ctx: &Ctx,
    services: &Services,
    passport: &Address,
    provider: &Address,
    key: &str,
) -> Result<Vec<(chrono::DateTime<Utc>, FactReport)>, TaskError> {
    let events = call(
        ctx,
        services
            .ledger
            .passport_history(passport, &HistoryFilter::key(key).by(provider)),
    )
    .await?;

    let mut reports = Vec::with_capacity(events.len());
    for event in events {
        let Some(raw) = call(ctx, services.ledger.read_fact_by_tx(&event.tx_hash)).await? else {
            continue;
        };
        let date = call(ctx, block_date(&*services.ledger, event.block_number)).await?;
        reports.push((date, decode::<FactReport>(&raw)?));
    }
    Ok(reports)
}

async fn load_history(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::ContractLoadReportingHistory(load) = action else {
        return Ok(());
    };
    let Some(req) = load.request_payload().cloned() else {
        return Ok(());
    };
    let contract = &req.contract;
    let path = contract_path(&contract.id);

    let work = async {
        let passport = &contract.isp_passport_address;
        let mut days: BTreeMap<chrono::NaiveDate, FactReportEntry> = BTreeMap::new();

        let school_reports = report_events(
            &ctx,
            &services,
            passport,
            &contract.school_address,
            &school_report_key(&contract.id),
        )
        .await?;
        for (date, report) in school_reports {
            let entry = day_entry(&mut days, date);
            entry.school_address = Some(contract.school_address.clone());
            entry.school_speed = Some(report.speed);
        }

        if let Some(isp) = &contract.isp_address {
            let isp_reports =
                report_events(&ctx, &services, passport, isp, &isp_report_key(&contract.id))
                    .await?;
            for (date, report) in isp_reports {
                let entry = day_entry(&mut days, date);
                entry.isp_address = Some(isp.clone());
                entry.isp_speed = Some(report.speed);
            }
        }

        let entries: Vec<FactReportEntry> = days.into_values().collect();
        ctx.put(AppAction::ContractLoadReportingHistory(
            LOAD_REPORTING_HISTORY.success(entries, Some(path.clone())),
        ))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::ContractLoadReportingHistory(LOAD_REPORTING_HISTORY.failure(
            error,
            Some(req.clone()),
            Some(path.clone()),
        ))
    })
    .await
}

/// Entry of the calendar day of `date`, dated at midnight UTC
fn day_entry(
    days: &mut BTreeMap<chrono::NaiveDate, FactReportEntry>,
    date: chrono::DateTime<Utc>,
) -> &mut FactReportEntry {
    let day = date.date_naive();
    days.entry(day).or_insert_with(|| FactReportEntry {
        date: day.and_time(NaiveTime::MIN).and_utc(),
        ..FactReportEntry::default()
    })
}
