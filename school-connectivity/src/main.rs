//! `connectivity` command line client
//!
//! Runs the sagas against a ledger loaded from a JSON fixture and prints the
//! resulting state as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_dispatch::action::Action;
use async_dispatch::{AsyncActionSet, AsyncOp, CacheOptions, Phases, Subscriptions};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use school_connectivity::action::{
    contract_path, LoadReportingHistory, ReportFact, LOAD_CONTRACTS, LOAD_ISPS,
    LOAD_REPORTING_HISTORY, LOAD_SCHOOLS, REPORT_FACT,
};
use school_connectivity::chain::{etherscan_url, WalletProvider};
use school_connectivity::memory::InMemoryLedger;
use school_connectivity::models::{Address, Contract, ScoreBand};
use school_connectivity::rpc::RpcWallet;
use school_connectivity::{
    build_runtime, load_config, recent_actions, AppAction, AppConfig, AppRuntime, Services,
};

#[derive(Parser, Debug)]
#[command(
    name = "connectivity",
    version,
    about = "School connectivity contracts and speed reports"
)]
struct Cli {
    /// Configuration file layered over config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger contents to run against
    #[arg(long, global = true, default_value = "fixtures/demo.json")]
    fixture: PathBuf,

    /// Wallet account to sign with, instead of the fixture's selected one
    #[arg(long, global = true)]
    account: Option<Address>,

    /// Print the last N dispatched actions to stderr before exiting
    #[arg(long, global = true, value_name = "N")]
    trace_actions: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered schools
    Schools,
    /// List ISPs created through the passport factory
    Isps,
    /// List contracts with their connectivity score
    Contracts,
    /// Daily speed reports of a contract
    History {
        contract: String,
    },
    /// Report a measured speed against a contract
    Report {
        #[arg(long)]
        contract: String,
        #[arg(long)]
        speed: f64,
    },
    /// Accounts exposed by a JSON-RPC wallet node
    Accounts {
        /// Node URL, defaults to `network.rpc_url`
        #[arg(long)]
        wallet_rpc: Option<String>,
    },
    /// Reload contracts periodically
    Watch {
        /// Number of refreshes before exiting
        #[arg(long, default_value_t = 3)]
        ticks: u32,
    },
}

fn init_tracing(config: &AppConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone()).context("loading configuration")?;
    init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    if let Command::Accounts { wallet_rpc } = &cli.command {
        return accounts(wallet_rpc.as_deref(), &config).await;
    }

    let ledger = Arc::new(
        InMemoryLedger::load_fixture(&cli.fixture)
            .with_context(|| format!("loading fixture {}", cli.fixture.display()))?,
    );
    if let Some(account) = &cli.account {
        ledger.select_account(Some(account.clone()))?;
    }
    let services = Services::new(ledger.clone(), ledger, config.addresses()?)
        .with_network(config.network())
        .with_polling(config.polling());

    let mut runtime = build_runtime(&services, &config);
    runtime.enqueue(AppAction::AppBootstrapped);
    let cache = CacheOptions::timeout(config.runtime.cache_timeout_secs);
    let trace_actions = cli.trace_actions;

    let result = match cli.command {
        Command::Schools => {
            settle(
                &mut runtime,
                LOAD_SCHOOLS,
                AppAction::SchoolLoadAll(LOAD_SCHOOLS.init((), cache)),
            )
            .await?;
            let schools: Vec<_> = runtime.state().school.schools().cloned().collect();
            print_json(&schools)
        }
        Command::Isps => {
            settle(
                &mut runtime,
                LOAD_ISPS,
                AppAction::IspLoadAll(LOAD_ISPS.init((), cache)),
            )
            .await?;
            let isps: Vec<_> = runtime.state().isp.isps().cloned().collect();
            print_json(&isps)
        }
        Command::Contracts => {
            load_contracts(&mut runtime, cache).await?;
            let contracts: Vec<_> = runtime
                .state()
                .contract
                .contracts()
                .map(|c| describe(c, &services))
                .collect();
            print_json(&contracts)
        }
        Command::History { contract } => {
            let contract = find_contract(&mut runtime, cache, &contract).await?;
            let path = contract_path(&contract.id);
            let id = contract.id.clone();
            settle(
                &mut runtime,
                LOAD_REPORTING_HISTORY,
                AppAction::ContractLoadReportingHistory(
                    LOAD_REPORTING_HISTORY.request(LoadReportingHistory { contract }, Some(path)),
                ),
            )
            .await?;
            let history = runtime
                .state()
                .contract
                .history(&id)
                .and_then(|h| h.data.clone())
                .unwrap_or_default();
            print_json(&history)
        }
        Command::Report { contract, speed } => {
            let contract = find_contract(&mut runtime, cache, &contract).await?;
            let path = contract_path(&contract.id);
            let id = contract.id.clone();
            settle(
                &mut runtime,
                REPORT_FACT,
                AppAction::ContractReportFact(
                    REPORT_FACT.request(ReportFact { contract, speed }, Some(path)),
                ),
            )
            .await?;
            let updated = runtime.state().contract.contract(&id).and_then(|c| c.data.clone());
            match updated {
                Some(contract) => print_json(&describe(&contract, &services)),
                None => Ok(()),
            }
        }
        Command::Watch { ticks } => watch(&mut runtime, &config, ticks, &services).await,
        Command::Accounts { .. } => Ok(()),
    };

    if let Some(count) = trace_actions {
        for entry in recent_actions(&runtime, count) {
            let changed = match entry.state_changed {
                Some(true) => "changed",
                Some(false) => "unchanged",
                None => "-",
            };
            eprintln!("#{:<4} {:<48} {}", entry.sequence, entry.action_type, changed);
        }
    }

    runtime.shutdown().await;
    result
}

/// Dispatch `action` and run until `op` settles. A failure becomes an error.
async fn settle<Req, Res>(
    runtime: &mut AppRuntime,
    op: AsyncOp<Req, Res>,
    action: AppAction,
) -> Result<AppAction> {
    runtime.enqueue(action);
    let settled = runtime
        .run_until(|a| op.matches(a.action_type(), Phases::SETTLED))
        .await
        .context("runtime stopped before the operation settled")?;

    if let Some(error) = settled.async_error() {
        match &error.detail {
            Some(detail) => bail!("{} ({detail})", error.message),
            None => bail!("{}", error.message),
        }
    }
    Ok(settled)
}

async fn load_contracts(runtime: &mut AppRuntime, cache: CacheOptions) -> Result<()> {
    settle(
        runtime,
        LOAD_CONTRACTS,
        AppAction::ContractLoadAll(LOAD_CONTRACTS.init((), cache)),
    )
    .await?;
    Ok(())
}

async fn find_contract(
    runtime: &mut AppRuntime,
    cache: CacheOptions,
    id: &str,
) -> Result<Contract> {
    load_contracts(runtime, cache).await?;
    let found = runtime.state().contract.contract(id).and_then(|c| c.data.clone());
    match found {
        Some(contract) => Ok(contract),
        None => bail!("Specified contract was not found: {id}"),
    }
}

fn describe(contract: &Contract, services: &Services) -> serde_json::Value {
    let band = ScoreBand::of(contract.connectivity_score);
    json!({
        "contract": contract,
        "score_band": band.to_string(),
        "score_color": band.color(),
        "isp_passport_url": etherscan_url(&services.network, &contract.isp_passport_address),
        "school_url": etherscan_url(&services.network, &contract.school_address),
    })
}

async fn watch(
    runtime: &mut AppRuntime,
    config: &AppConfig,
    ticks: u32,
    services: &Services,
) -> Result<()> {
    let cache = CacheOptions::timeout(config.runtime.cache_timeout_secs);
    let mut subscriptions =
        Subscriptions::with_token(runtime.action_tx(), runtime.cancel_token().clone());
    subscriptions.interval_immediate("refresh_contracts", config.refresh_interval(), move || {
        AppAction::ContractLoadAll(LOAD_CONTRACTS.init((), cache))
    });

    for tick in 1..=ticks {
        let settled = runtime
            .run_until(|a| LOAD_CONTRACTS.matches(a.action_type(), Phases::SETTLED))
            .await
            .context("runtime stopped while watching")?;
        if let Some(error) = settled.async_error() {
            tracing::warn!(tick, error = %error.message, "Refresh failed");
            continue;
        }
        let contracts: Vec<_> = runtime
            .state()
            .contract
            .contracts()
            .map(|c| describe(c, services))
            .collect();
        print_json(&json!({ "tick": tick, "contracts": contracts }))?;
    }

    subscriptions.cancel_all();
    Ok(())
}

async fn accounts(url: Option<&str>, config: &AppConfig) -> Result<()> {
    let Some(url) = url.or(config.network.rpc_url.as_deref()) else {
        bail!("No wallet node configured, pass --wallet-rpc or set network.rpc_url");
    };
    let wallet = RpcWallet::new(url);
    let accounts = wallet.enable().await?;
    let current = wallet.current_account().await?;
    print_json(&json!({ "accounts": accounts, "current": current }))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
