//! Tests for #[derive(Action)]

use async_dispatch::prelude::*;
use async_dispatch::{assert_emitted, assert_not_emitted, count_emitted, TestHarness};
use chrono::Utc;

#[derive(Clone, Debug, PartialEq)]
struct Contract {
    id: String,
    speed: u32,
}

const LOAD_CONTRACT: AsyncOp<String, Contract> = async_op!("contract", "LOAD");
const LOAD_ISPS: AsyncOp<(), ()> = async_op!("isp", "LOAD_ALL");

#[derive(Action, Clone, Debug)]
#[action(infer_categories)]
enum TestAction {
    #[action(action_type = "mth/app/APP_BOOTSTRAPPED")]
    AppBootstrapped,
    #[action(async_op)]
    ContractLoad(AsyncAction<String, Contract>),
    #[action(async_op)]
    IspLoadAll(AsyncAction<(), ()>),
    #[action(category = "isp")]
    ProgressChanged { step: u8 },
    #[action(skip_category)]
    QuitNow,
    Tick,
}

impl ActionSummary for TestAction {}

#[test]
fn test_plain_variant_names_and_types() {
    assert_eq!(TestAction::AppBootstrapped.name(), "AppBootstrapped");
    assert_eq!(
        TestAction::AppBootstrapped.action_type(),
        "mth/app/APP_BOOTSTRAPPED"
    );
    assert_eq!(TestAction::Tick.name(), "Tick");
    assert_eq!(TestAction::Tick.action_type(), "Tick");
    assert_eq!(TestAction::ProgressChanged { step: 1 }.name(), "ProgressChanged");
}

#[test]
fn test_async_variant_names_follow_phase() {
    let init = TestAction::ContractLoad(LOAD_CONTRACT.init("c1".into(), CacheOptions::none()));
    assert_eq!(init.name(), "ContractLoadInit");
    assert_eq!(init.action_type(), "mth/contract/LOAD_INIT");

    let invalidate = TestAction::ContractLoad(LOAD_CONTRACT.invalidate_data("c1".into(), None));
    assert_eq!(invalidate.name(), "ContractLoadInvalidateData");
    assert_eq!(invalidate.action_type(), "mth/contract/LOAD_INVALIDATE_DATA");

    let request = TestAction::IspLoadAll(LOAD_ISPS.request((), None));
    assert_eq!(request.name(), "IspLoadAllRequest");
    assert_eq!(request.action_type(), "mth/isp/LOAD_ALL_REQUEST");
}

#[test]
fn test_async_action_set_routing() {
    let failure = TestAction::ContractLoad(LOAD_CONTRACT.failure(
        FriendlyError::from_code(ErrorCode::ResourceNotFound),
        Some("c1".into()),
        Some(subpath!["c1"]),
    ));
    assert_eq!(failure.subtype(), Some(AsyncSubtype::Failure));
    assert_eq!(failure.subpath(), Some(&subpath!["c1"]));
    assert_eq!(
        failure.async_error().map(|e| e.code),
        Some(ErrorCode::ResourceNotFound)
    );

    assert_eq!(TestAction::Tick.subtype(), None);
    assert!(TestAction::Tick.subpath().is_none());
    assert!(TestAction::Tick.resolve_init(Utc::now()).is_none());
}

#[test]
fn test_resolve_init_rewraps_variant() {
    let init = TestAction::ContractLoad(LOAD_CONTRACT.init("c1".into(), CacheOptions::none()));
    let resolved = init.resolve_init(Utc::now()).expect("resolved");
    assert_eq!(resolved.name(), "ContractLoadRequest");
    assert!(matches!(resolved, TestAction::ContractLoad(_)));
}

#[test]
fn test_categories() {
    let load = TestAction::ContractLoad(LOAD_CONTRACT.request("c1".into(), None));
    assert_eq!(load.category(), Some("contract"));
    assert!(load.is_contract());

    assert_eq!(TestAction::AppBootstrapped.category(), Some("app"));
    assert_eq!(TestAction::ProgressChanged { step: 2 }.category(), Some("isp"));
    assert!(TestAction::ProgressChanged { step: 2 }.is_isp());
    assert_eq!(TestAction::QuitNow.category(), None);
    assert_eq!(TestAction::Tick.category(), None);

    assert_eq!(
        TestAction::QuitNow.category_enum(),
        TestActionCategory::Uncategorized
    );
    assert_eq!(TestActionCategory::Isp.name(), "isp");
    assert_eq!(TestActionCategory::all().len(), 4);
}

#[test]
fn test_harness_with_derived_actions() {
    let mut harness = TestHarness::<(), TestAction>::default();
    harness.emit(TestAction::AppBootstrapped);
    harness.emit(TestAction::ContractLoad(
        LOAD_CONTRACT.success(
            Contract {
                id: "c1".into(),
                speed: 50,
            },
            None,
        ),
    ));

    let isp = harness.drain_category("isp");
    assert!(isp.is_empty());

    let emitted = harness.drain_emitted();
    assert_emitted!(emitted, TestAction::AppBootstrapped);
    assert_emitted!(emitted, TestAction::ContractLoad(a) if a.success_payload().map(|c| c.speed) == Some(50));
    assert_not_emitted!(emitted, TestAction::Tick);
    assert_eq!(count_emitted!(emitted, TestAction::ContractLoad(_)), 1);
}
