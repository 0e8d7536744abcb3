use super::*;
use crate::{
    chain::{account_balance, queue_config, XcmpQueueEvent},
    config::MAX_BLOCK_REF_TIME,
    identity::{descend_origin_from_address, descend_origin_from_address20, sovereign_account_of_sibling},
    injector::{inject_hrmp_message, inject_hrmp_message_and_seal},
    parachains::moonbase::{self, ALITH, BALTHAZAR},
    weight::{expected_deposit, weight_message},
};
use hex_literal::hex;
use sp_core::H160;
use std::sync::Once;
use xcm::{
    v3::{OriginKind, Weight},
    VersionedXcm,
};

static INIT: Once = Once::new();
fn init_tracing() {
    INIT.call_once(|| {
        // filter for harness logs only
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_env_filter("xcm=trace")
            .with_test_writer()
            .try_init();
    });
}

const SIBLING: u32 = 2_000;

fn transfer(amount: u128, beneficiary: H160) -> XcmFragment {
    XcmFragment::new(XcmFragmentConfig {
        assets: vec![FragmentAsset::new(moonbase::native_location(), amount)],
        beneficiary: Some(beneficiary),
        ..Default::default()
    })
}

fn withdraw_buy_deposit(fragment: XcmFragment) -> XcmFragment {
    fragment
        .withdraw_asset()
        .and_then(|f| f.buy_execution(0))
        .and_then(|f| f.deposit_asset())
        .unwrap()
}

#[tokio::test]
async fn half_of_uniform_messages_run_on_initialization() {
    init_tracing();
    let scheduler = SchedulerConfig::from_max_block_weight(MAX_BLOCK_REF_TIME).with_thresholds(0, 0);
    let config = HarnessConfig { scheduler: scheduler.clone(), ..Default::default() };
    let chain = moonbase::new_mock_chain(&config, []);

    // 50 messages, each a twenty-fifth of the budget
    let weight = scheduler.total_xcmp_weight / 25;
    let padding = Weight::from_parts(weight - config.weight_per_instruction, 0);
    let program = XcmFragment::new(Default::default())
        .transact(OriginKind::SovereignAccount, padding, vec![0x11])
        .as_v3();
    assert_eq!(weight_message(&chain, &program).await.unwrap().ref_time(), weight);

    for sender in 0..50 {
        inject_hrmp_message(&chain, SIBLING + sender, &program).await.unwrap();
    }
    chain.produce_block(BlockOptions::default()).await.unwrap();

    let seed = chain.parent_hash().await.unwrap();
    let schedule = SchedulerSimulator::new(chain.scheduler_config()).simulate_uniform(seed.as_bytes(), 50, weight);
    assert_eq!(schedule.count(ExecutionOutcome::ExecutedOnInitialization), 25);
    assert_eq!(schedule.count(ExecutionOutcome::ExecutedOnIdle), 25);
    assert_eq!(schedule.count(ExecutionOutcome::RejectedByBarrier), 0);

    let observed = chain.last_outcomes();
    schedule.verify(&observed).unwrap();
    let on_idle = chain.events().iter().filter(|e| matches!(e, XcmpQueueEvent::ExecutedOnIdle { .. })).count();
    assert_eq!(on_idle, 25);
}

#[tokio::test]
async fn flooded_channel_is_suspended_before_execution() {
    init_tracing();
    let sovereign = sovereign_account_of_sibling(SIBLING);
    let chain = moonbase::new_mock_chain(&HarnessConfig::default(), [(sovereign, 100)]);
    let queue = queue_config(&chain).await.unwrap();
    let program = withdraw_buy_deposit(transfer(1, BALTHAZAR)).as_v3();

    for _ in 0..=queue.suspend_threshold {
        inject_hrmp_message(&chain, SIBLING, &program).await.unwrap();
    }
    chain.produce_block(BlockOptions::default()).await.unwrap();

    assert!(chain.is_suspended(SIBLING));
    assert!(chain
        .events()
        .iter()
        .any(|e| matches!(e, XcmpQueueEvent::ChannelSuspended { sender: SIBLING, pending: 3 })));
    assert_eq!(account_balance(&chain, sovereign).await.unwrap(), 100);

    // pages keep piling up until the drop threshold
    while chain.pending_horizontal(SIBLING) < queue.drop_threshold as usize {
        inject_hrmp_message(&chain, SIBLING, &program).await.unwrap();
    }
    let err = inject_hrmp_message(&chain, SIBLING, &program).await.unwrap_err();
    assert_eq!(err.to_string(), "queue capacity exceeded");
}

#[test]
fn descended_origin_of_all_ones() {
    let origin = H160([1u8; 20]);
    assert_eq!(descend_origin_from_address(origin), H160(hex!("6a6174970cb8b67c05208086405a0c67342625d8")));
    assert_eq!(descend_origin_from_address20(1, origin), H160(hex!("87f93a7a8196beee68c4bd81e1c7f596f9d5d50a")));
}

#[tokio::test]
async fn transfer_credits_amount_minus_fee() {
    init_tracing();
    let config = HarnessConfig::default();
    let sovereign = sovereign_account_of_sibling(SIBLING);
    let beneficiary = H160(hex!("1111111111111111111111111111111111111111"));
    let amount = 10u128.pow(18);
    let chain = moonbase::new_mock_chain(&config, [(sovereign, amount)]);

    let program = withdraw_buy_deposit(transfer(amount, beneficiary)).as_v3();
    let weight = weight_message(&chain, &program).await.unwrap();
    inject_hrmp_message_and_seal(&chain, SIBLING, &program, BlockOptions::from_config(&config)).await.unwrap();

    let expected = expected_deposit(amount, weight, config.fee_per_weight).unwrap();
    assert_eq!(account_balance(&chain, beneficiary).await.unwrap(), expected);
    assert_eq!(account_balance(&chain, sovereign).await.unwrap(), 0);
    assert_eq!(account_balance(&chain, ALITH).await.unwrap(), moonbase::INITIAL_EVM_BALANCE);
}

#[tokio::test]
async fn overridden_weight_passes_barrier() {
    init_tracing();
    let sovereign = sovereign_account_of_sibling(SIBLING);
    let chain = moonbase::new_mock_chain(&HarnessConfig::default(), [(sovereign, 10u128.pow(18))]);
    let underpaid = || {
        let config = XcmFragmentConfig {
            weight_limit: Some(Weight::from_parts(1, 0)),
            ..transfer(10u128.pow(12), BALTHAZAR).config().clone()
        };
        withdraw_buy_deposit(XcmFragment::new(config))
    };

    let program = underpaid().as_v3();
    inject_hrmp_message_and_seal(&chain, SIBLING, &program, BlockOptions::default()).await.unwrap();
    let seed = chain.parent_hash().await.unwrap();
    let weight = weight_message(&chain, &program).await.unwrap();
    let predicted = SchedulerSimulator::new(chain.scheduler_config()).simulate(seed.as_bytes(), &[weight.ref_time()]);
    let err: Error = predicted.verify(&chain.last_outcomes()).unwrap_err().into();
    assert!(matches!(&err, Error::Divergence(d) if d.mismatches.len() == 1));
    assert_eq!(account_balance(&chain, BALTHAZAR).await.unwrap(), moonbase::INITIAL_EVM_BALANCE);

    let program: VersionedXcm<()> = underpaid().override_weight(&chain).await.unwrap().as_v3();
    inject_hrmp_message_and_seal(&chain, SIBLING, &program, BlockOptions::default()).await.unwrap();
    assert!(matches!(chain.events()[..], [XcmpQueueEvent::Success { sender: SIBLING, .. }]));
    assert!(account_balance(&chain, BALTHAZAR).await.unwrap() > moonbase::INITIAL_EVM_BALANCE);
}

#[tokio::test]
async fn override_weight_needs_buy_execution() {
    let chain = MockChain::default();
    let err = XcmFragment::new(Default::default()).clear_origin().override_weight(&chain).await.unwrap_err();
    assert!(matches!(err, Error::NoBuyExecution));
}
