//! ISPs own a passport created through the passport factory and describe
//! themselves with an `isp_metadata` fact on it.

use async_dispatch::{
    take_every_latest, take_latest, DispatchStore, ErrorCode, FriendlyError, TaskError,
};

use super::{call, decode, encode, fail, guarded, requested, Ctx, Runtime};
use crate::action::{
    address_path, task_key, AppAction, CreationStep, IspCreationStatus, CREATE_ISP, LOAD_ISP,
    LOAD_ISPS,
};
use crate::chain::{ChainError, ISP_METADATA};
use crate::models::{Address, Isp, IspMetadata};
use crate::services::Services;
use crate::state::RootState;
use crate::tx::{require_account, send_and_wait};

pub fn spawn<St: DispatchStore<RootState, AppAction>>(
    runtime: &mut Runtime<St>,
    services: &Services,
) {
    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_latest(ctx, requested(LOAD_ISPS), move |ctx, _| load_all(ctx, s.clone()))
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_every_latest(ctx, requested(LOAD_ISP), task_key, move |ctx, action| {
            load_one(ctx, s.clone(), action)
        })
    });

    let s = services.clone();
    runtime.spawn(move |ctx| {
        take_latest(ctx, requested(CREATE_ISP), move |ctx, action| {
            create(ctx, s.clone(), action)
        })
    });
}

fn isp_not_found() -> TaskError {
    fail(FriendlyError::new(
        ErrorCode::ResourceNotFound,
        "Specified ISP was not found",
    ))
}

async fn read_isp(
    ctx: &Ctx,
    services: &Services,
    passport: &Address,
    owner: &Address,
) -> Result<Option<Isp>, TaskError> {
    let raw = call(ctx, services.ledger.read_fact(passport, owner, ISP_METADATA)).await?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let metadata = decode::<IspMetadata>(&raw)?;
    Ok(Some(Isp {
        name: metadata.name,
        address: owner.clone(),
        passport_address: passport.clone(),
        score: metadata.score,
    }))
}

async fn load_all(ctx: Ctx, services: Services) -> Result<(), TaskError> {
    let work = async {
        let passports = call(
            &ctx,
            services.ledger.passports(&services.addresses.passport_factory),
        )
        .await?;

        let mut loaded = 0;
        for passport in passports {
            let Some(isp) =
                read_isp(&ctx, &services, &passport.address, &passport.owner).await?
            else {
                tracing::debug!(passport = %passport.address, "Passport without ISP metadata");
                continue;
            };
            ctx.put(AppAction::IspLoad(
                LOAD_ISP.success(isp, Some(address_path(&passport.owner))),
            ))?;
            loaded += 1;
        }

        tracing::info!(isps = loaded, "ISPs loaded");
        ctx.put(AppAction::IspLoadAll(LOAD_ISPS.success((), None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::IspLoadAll(LOAD_ISPS.failure(error, Some(()), None))
    })
    .await
}

async fn load_one(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::IspLoad(load) = action else {
        return Ok(());
    };
    let Some(address) = load.request_payload().cloned() else {
        return Ok(());
    };
    let path = address_path(&address);

    let work = async {
        let passports = call(
            &ctx,
            services.ledger.passports(&services.addresses.passport_factory),
        )
        .await?;
        let passport = passports
            .into_iter()
            .find(|p| p.owner == address)
            .ok_or_else(isp_not_found)?;

        let isp = read_isp(&ctx, &services, &passport.address, &address)
            .await?
            .ok_or_else(isp_not_found)?;
        ctx.put(AppAction::IspLoad(LOAD_ISP.success(isp, Some(path.clone()))))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::IspLoad(LOAD_ISP.failure(error, Some(address.clone()), Some(path.clone())))
    })
    .await
}

fn progress(
    ctx: &Ctx,
    step: CreationStep,
    passport_address: Option<&Address>,
) -> Result<(), TaskError> {
    tracing::info!(step = step.label(), "ISP creation");
    ctx.put(AppAction::IspCreationProgress(IspCreationStatus {
        step,
        passport_address: passport_address.cloned(),
    }))
}

async fn create(ctx: Ctx, services: Services, action: AppAction) -> Result<(), TaskError> {
    let AppAction::IspCreate(create) = action else {
        return Ok(());
    };
    let Some(input) = create.request_payload().cloned() else {
        return Ok(());
    };

    let work = async {
        let wallet = &*services.wallet;
        let account = call(&ctx, require_account(wallet)).await?;

        progress(&ctx, CreationStep::CreatingPassport, None)?;
        let tx = call(
            &ctx,
            services
                .ledger
                .create_passport_tx(&services.addresses.passport_factory, &account),
        )
        .await?;
        let receipt = call(&ctx, send_and_wait(wallet, &tx, services.polling)).await?;
        let passport = receipt.contract_address.ok_or_else(|| {
            TaskError::other(ChainError::Malformed(
                "passport creation receipt has no contract address".into(),
            ))
        })?;

        progress(&ctx, CreationStep::ClaimingOwnership, Some(&passport))?;
        let tx = call(&ctx, services.ledger.claim_ownership_tx(&passport, &account)).await?;
        call(&ctx, send_and_wait(wallet, &tx, services.polling)).await?;

        progress(&ctx, CreationStep::SubmittingMetadata, Some(&passport))?;
        let metadata = IspMetadata {
            name: input.name.clone(),
            score: input.score,
        };
        let tx = call(
            &ctx,
            services
                .ledger
                .write_fact_tx(&passport, ISP_METADATA, encode(&metadata)?, &account),
        )
        .await?;
        call(&ctx, send_and_wait(wallet, &tx, services.polling)).await?;
        progress(&ctx, CreationStep::MetadataSubmitted, Some(&passport))?;

        let isp = Isp {
            name: metadata.name,
            address: account.clone(),
            passport_address: passport,
            score: metadata.score,
        };
        ctx.put(AppAction::IspLoad(
            LOAD_ISP.success(isp.clone(), Some(address_path(&account))),
        ))?;
        ctx.put(AppAction::IspCreate(CREATE_ISP.success(isp, None)))
    };

    guarded(&ctx, &services, work, |error| {
        AppAction::IspCreate(CREATE_ISP.failure(error, Some(input.clone()), None))
    })
    .await
}
