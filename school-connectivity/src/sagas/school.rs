//! Schools are registered as `school_metadata` facts on the UNICEF passport,
//! one per school account.

use std::collections::BTreeSet;

use async_dispatch::{
    take_every_latest, take_latest, DispatchStore, ErrorCode, FriendlyError, TaskError,
};

use super::{call, decode, encode, fail, guarded, requested, Ctx, Runtime};
use crate::action::{address_path, task_key, AppAction, CREATE_SCHOOL, LOAD_SCHOOL, LOAD_SCHOOLS};
use crate::chain::{HistoryFilter, SCHOOL_METADATA};
use crate::models::SchoolMetadata;
use crate::services::Services;
use crate::state::RootState;
use crate::tx::{require_account, send_and_wait};

pub fn spawn<St: DispatchStore<RootState, AppAction>>(
    runtime: &mut Runtime<St>,
    services: &Services,
) {
    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_latest(ctx, requested(LOAD_SCHOOLS), move |ctx, _| {
            load_all(ctx, s.clone())
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(ctx, requested(LOAD_SCHOOL), task_key, move |ctx, action| {
            load_one(ctx, s.clone(), action)
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_latest(ctx, requested(CREATE_SCHOOL), move |ctx, action| {
            create(ctx, s.clone(), action)
        })
    });
}

async fn load_all(ctx: Ctx, services: Services) -> Result<(), TaskError> {
    let work = async {
        let passport = &services.addresses.unicef_passport;
        let events = call(
            &ctx,
            services
                .ledger
                .passport_history(passport, &HistoryFilter::key(SCHOOL_METADATA)),
        )
        .await?;

        let mut seen = BTreeSet::new();
        for event in events {
            if !seen.insert(event.fact_provider.clone()) {
                continue;
            }
            let raw = call(
                &ctx,
                services
                    .ledger
                    .read_fact(passport, &event.fact_provider, SCHOOL_METADATA),
            )
            .await?;
            let Some(raw) = raw else { continue };

            let school = decode::<SchoolMetadata>(&raw)?.into_school(event.fact_provider.clone());
            ctx.put(AppAction::SchoolLoad(
                LOAD_SCHOOL.success(school, Some(address_path(&event.fact_provider))),
            ))?;
        }

        tracing::info!(schools = seen.len(), "Schools loaded");
        ctx.put(AppAction::SchoolLoadAll(LOAD_SCHOOLS.success((), None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::SchoolLoadAll(LOAD_SCHOOLS.failure(error, Some(()), None))
    })
    .await
}

async fn load_one(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::SchoolLoad(load) = action else {
        return Ok(());
    };
    let Some(address) = load.request_payload().cloned() else {
        return Ok(());
    };
    let path = address_path(&address);

    let work = async {
        let raw = call(
            &ctx,
            services.ledger.read_fact(
                &services.addresses.unicef_passport,
                &address,
                SCHOOL_METADATA,
            ),
        )
        .await?
        .ok_or_else(|| {
            fail(FriendlyError::new(ErrorCode::ResourceNotFound, "School does not exist"))
        })?;

        let school = decode::<SchoolMetadata>(&raw)?.into_school(address.clone());
        ctx.put(AppAction::SchoolLoad(LOAD_SCHOOL.success(school, Some(path.clone()))))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::SchoolLoad(LOAD_SCHOOL.failure(error, Some(address.clone()), Some(path.clone())))
    })
    .await
}

async fn create(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::SchoolCreate(create) = action else {
        return Ok(());
    };
    let Some(input) = create.request_payload().cloned() else {
        return Ok(());
    };

    let work = async {
        let account = call(&ctx, require_account(&*services.wallet)).await?;
        let metadata = SchoolMetadata {
            name: input.name.clone(),
            country: input.country.clone(),
            score: input.score,
            physical_address: input.physical_address.clone(),
        };

        let tx = call(
            &ctx,
            services.ledger.write_fact_tx(
                &services.addresses.unicef_passport,
                SCHOOL_METADATA,
                encode(&metadata)?,
                &account,
            ),
        )
        .await?;
        call(&ctx, send_and_wait(&*services.wallet, &tx, services.polling)).await?;

        let school = metadata.into_school(account.clone());
        tracing::info!(school = %account, name = %school.name, "School registered");
        ctx.put(AppAction::SchoolLoad(
            LOAD_SCHOOL.success(school.clone(), Some(address_path(&account))),
        ))?;
        ctx.put(AppAction::SchoolCreate(CREATE_SCHOOL.success(school, None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::SchoolCreate(CREATE_SCHOOL.failure(error, Some(input.clone()), None))
    })
    .await
}
