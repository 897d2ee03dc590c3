//! Data model shared across the replay engine.

use alloy_consensus::Header;
use alloy_primitives::{Address, Bytes, B256, B64, U256};
use revm::context::{
    result::{ExecutionResult, HaltReason},
    BlockEnv,
};
use serde::{Deserialize, Serialize};

/// Read-only header view of the block a session is forked at.
///
/// Supplied once per session and never mutated. Only the executable subset
/// feeds the EVM environment; the remaining header fields are carried so
/// callers can round-trip the context they fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Block number the session executes at.
    pub number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Block difficulty.
    pub difficulty: U256,
    /// Beneficiary of the block reward.
    pub coinbase: Address,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// State root of the block.
    pub state_root: B256,
    /// Receipts root of the block.
    pub receipts_root: B256,
    /// Transactions root of the block.
    pub transactions_root: B256,
    /// Extra data of the block.
    pub extra_data: Bytes,
    /// Mix hash (serves `PREVRANDAO` post-merge).
    pub mix_hash: B256,
    /// Proof-of-work nonce.
    pub nonce: B64,
}

impl BlockContext {
    /// Builds a [`BlockContext`] from a fetched consensus header.
    pub fn from_header(header: &Header) -> Self {
        Self {
            number: header.number,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            difficulty: header.difficulty,
            coinbase: header.beneficiary,
            parent_hash: header.parent_hash,
            state_root: header.state_root,
            receipts_root: header.receipts_root,
            transactions_root: header.transactions_root,
            extra_data: header.extra_data.clone(),
            mix_hash: header.mix_hash,
            nonce: header.nonce,
        }
    }

    /// Maps the executable subset into a revm [`BlockEnv`].
    pub fn to_block_env(&self) -> BlockEnv {
        BlockEnv {
            number: U256::from(self.number),
            beneficiary: self.coinbase,
            timestamp: U256::from(self.timestamp),
            gas_limit: self.gas_limit,
            basefee: 0,
            difficulty: self.difficulty,
            prevrandao: Some(self.mix_hash),
            blob_excess_gas_and_price: None,
        }
    }
}

/// A transaction to replay, as captured from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Sender address.
    pub from: Address,
    /// Callee address; `None` deploys a contract.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit of the transaction.
    pub gas: u64,
    /// Call data.
    pub input: Bytes,
    /// Sender nonce override. `None` uses the sender's current nonce in the
    /// forked state.
    pub nonce: Option<u64>,
}

/// How a single execution ended.
///
/// Reverts and halts are backend-level faults recorded in the trace, not
/// engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecOutcome {
    /// Execution ran to completion.
    Success,
    /// Execution reverted.
    Revert,
    /// Execution halted (out of gas, invalid opcode, ...).
    Halt(HaltReason),
}

impl ExecOutcome {
    /// Extracts the outcome from a backend execution result.
    pub fn from_result(result: &ExecutionResult<HaltReason>) -> Self {
        match result {
            ExecutionResult::Success { .. } => Self::Success,
            ExecutionResult::Revert { .. } => Self::Revert,
            ExecutionResult::Halt { reason, .. } => Self::Halt(reason.clone()),
        }
    }

    /// Returns `true` if the execution did not run to completion.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Step-count summary of one transaction execution.
///
/// Disposable; compared between the two orderings of a pair and handed to
/// downstream heuristics, never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Total instructions executed across all call frames.
    pub global_steps: u64,
    /// Instructions executed per call frame, in frame-entry order.
    pub call_steps: Vec<u64>,
    /// How the execution ended.
    pub outcome: ExecOutcome,
    /// Gas spent by the execution.
    pub gas_used: u64,
}

impl ExecutionTrace {
    /// Returns `true` if this execution observably took a different path
    /// than `other`.
    ///
    /// Identical step counts are only a necessary signal of equivalence; a
    /// fault on one side is always a divergence regardless of counts.
    pub fn diverges_from(&self, other: &Self) -> bool {
        self.global_steps != other.global_steps || self.outcome != other.outcome
    }
}
