//! End-to-end reorder experiments against a static forked state.

use alloy_primitives::{address, bytes, Address, Bytes, U256};
use replay_engine::{
    test_utils::{block_context, call, transfer, StaticStateSource},
    ForkSchedule, ReplaySession,
};
use revm::bytecode::opcode::{
    ADD, CALLDATASIZE, JUMPDEST, JUMPI, POP, PUSH1, SLOAD, SSTORE, STOP,
};

const ATTACKER: Address = address!("0000000000000000000000000000000000a77ac3");
const VICTIM: Address = address!("000000000000000000000000000000000071c711");
const MARKET: Address = address!("000000000000000000000000000000000033a43e");

const FORK_HEIGHT: u64 = 12_000_001;
const ONE_ETHER: u64 = 1_000_000_000_000_000_000;

/// Contract whose control flow depends on storage slot 0.
///
/// Called with calldata, it stores 1 into slot 0 and stops. Called without
/// calldata, it loads slot 0 and, when non-zero, runs through an extra
/// arithmetic tail before stopping.
fn slot_branching_code() -> Bytes {
    let code = vec![
        CALLDATASIZE,
        PUSH1,
        0x0b,
        JUMPI,
        // read branch: branch again on the stored value
        PUSH1,
        0x00,
        SLOAD,
        PUSH1,
        0x12,
        JUMPI,
        STOP,
        // write branch @ 0x0b
        JUMPDEST,
        PUSH1,
        0x01,
        PUSH1,
        0x00,
        SSTORE,
        STOP,
        // extra tail @ 0x12, only reached when slot 0 is set
        JUMPDEST,
        PUSH1,
        0x01,
        PUSH1,
        0x01,
        ADD,
        POP,
        PUSH1,
        0x01,
        PUSH1,
        0x01,
        ADD,
        POP,
        STOP,
    ];
    code.into()
}

/// Contract that unconditionally writes its own slot 0.
fn plain_writer_code() -> Bytes {
    vec![PUSH1, 0x01, PUSH1, 0x00, SSTORE, STOP].into()
}

fn funded_source() -> StaticStateSource {
    StaticStateSource::default()
        .with_balance(ATTACKER, U256::from(ONE_ETHER))
        .with_balance(VICTIM, U256::from(ONE_ETHER))
}

#[test]
fn storage_dependent_pair_diverges() {
    let source = funded_source().with_code(MARKET, slot_branching_code());

    // A writes slot 0 of the market, B branches on it.
    let tx_a = call(ATTACKER, MARKET, bytes!("01"));
    let tx_b = call(VICTIM, MARKET, Bytes::new());

    let report = ReplaySession::bind(
        ForkSchedule::mainnet(),
        source,
        block_context(FORK_HEIGHT),
        tx_a,
        tx_b,
    )
    .unwrap()
    .run()
    .unwrap();

    assert!(report.divergent);

    // A executes the write branch identically in both orderings.
    assert_eq!(report.trial1.first.global_steps, report.trial2.second.global_steps);

    // B observes the write after A (extra tail) but not before it.
    assert_eq!(report.trial2.first.global_steps, 8);
    assert_eq!(report.trial1.second.global_steps, 17);
    assert!(report.trial1.second.global_steps > report.trial2.first.global_steps);
    assert!(report.trial1.second.gas_used > report.trial2.first.gas_used);
}

#[test]
fn pairs_touching_disjoint_contracts_do_not_diverge() {
    let market_b = address!("00000000000000000000000000000000000baaaa");
    let source = funded_source()
        .with_code(MARKET, plain_writer_code())
        .with_code(market_b, plain_writer_code());

    let tx_a = call(ATTACKER, MARKET, Bytes::new());
    let tx_b = call(VICTIM, market_b, Bytes::new());

    let report = ReplaySession::bind(
        ForkSchedule::mainnet(),
        source,
        block_context(FORK_HEIGHT),
        tx_a,
        tx_b,
    )
    .unwrap()
    .run()
    .unwrap();

    assert!(!report.divergent);
    assert_eq!(report.trial1.first, report.trial2.second);
    assert_eq!(report.trial1.second, report.trial2.first);
}

#[test]
fn value_transfer_pairs_do_not_diverge() {
    let report = ReplaySession::bind(
        ForkSchedule::mainnet(),
        funded_source(),
        block_context(FORK_HEIGHT),
        transfer(ATTACKER, VICTIM, U256::from(1_000)),
        transfer(VICTIM, ATTACKER, U256::from(2_000)),
    )
    .unwrap()
    .run()
    .unwrap();

    assert!(!report.divergent);
    assert_eq!(report.trial1.first.global_steps, 0);
}

#[test]
fn repeated_sessions_are_deterministic() {
    let build = || {
        let source = funded_source().with_code(MARKET, slot_branching_code());
        ReplaySession::bind(
            ForkSchedule::mainnet(),
            source,
            block_context(FORK_HEIGHT),
            call(ATTACKER, MARKET, bytes!("01")),
            call(VICTIM, MARKET, Bytes::new()),
        )
        .unwrap()
    };

    let first = build().run().unwrap();
    let second = build().run().unwrap();
    assert_eq!(first, second);
}

#[test]
fn trial_two_observes_the_pristine_fork_state() {
    let source = funded_source().with_code(MARKET, slot_branching_code());
    let mut session = ReplaySession::bind(
        ForkSchedule::mainnet(),
        source,
        block_context(FORK_HEIGHT),
        call(ATTACKER, MARKET, bytes!("01")),
        call(VICTIM, MARKET, Bytes::new()),
    )
    .unwrap();

    session.run_trial1().unwrap();
    assert_eq!(
        session.overlay_mut().storage_slot(MARKET, U256::ZERO).unwrap(),
        U256::from(1)
    );

    session.reset_to_initial().unwrap();
    assert_eq!(
        session.overlay_mut().storage_slot(MARKET, U256::ZERO).unwrap(),
        U256::ZERO
    );
}
