//! Reorder-replay sessions.
//!
//! A session binds one forked block context and one transaction pair,
//! executes the pair in both orders against the identical starting state and
//! reports whether execution observably diverged.

use revm::{
    context::{
        result::{EVMError, ResultAndState},
        CfgEnv, TxEnv,
    },
    handler::{MainBuilder, MainContext},
    primitives::{hardfork::SpecId, TxKind},
    Context, DatabaseCommit, InspectEvm,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    BlockContext, Checkpoint, ExecutionTrace, ForkSchedule, ReplayError, Result, StateOverlay,
    StateSource, StepCounter, TxInput,
};

/// Lifecycle of a [`ReplaySession`].
///
/// Transitions are strictly sequential; any fetch, dispatch or execution
/// failure moves the session to [`Phase::Failed`], which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bound to a block context, nothing executed yet.
    Bound,
    /// First ordering (A then B) executed.
    Trial1Done,
    /// Second ordering (B then A) executed.
    Trial2Done,
    /// Verdict produced; the session is spent.
    Reported,
    /// A failure aborted the session.
    Failed,
}

/// The two traces of one ordering trial, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialTraces {
    /// Trace of the transaction executed first.
    pub first: ExecutionTrace,
    /// Trace of the transaction executed second.
    pub second: ExecutionTrace,
}

/// Outcome of a reorder experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Traces of trial 1: A first, B second.
    pub trial1: TrialTraces,
    /// Traces of trial 2: B first, A second.
    pub trial2: TrialTraces,
    /// `true` if any transaction took an observably different path between
    /// the two orderings. Necessary, not sufficient: the caller combines
    /// this with its other heuristics.
    pub divergent: bool,
}

/// One reorder experiment over a transaction pair.
///
/// Owns its overlay, remote source and checkpoints for its whole lifetime;
/// nothing is shared with other sessions. Rebinding is not possible: one
/// session targets exactly one block context and therefore one ruleset.
#[derive(Debug)]
pub struct ReplaySession<S: StateSource> {
    overlay: StateOverlay<S>,
    context: BlockContext,
    spec: SpecId,
    chain_id: u64,
    initial: Option<Checkpoint>,
    restored: bool,
    tx_a: TxInput,
    tx_b: TxInput,
    phase: Phase,
    trial1: Option<TrialTraces>,
    trial2: Option<TrialTraces>,
}

impl<S: StateSource> ReplaySession<S> {
    /// Binds a session: resolves the ruleset for the block height, builds
    /// the overlay over `source` and takes the initial checkpoint.
    ///
    /// Fails with [`ReplayError::UnsupportedHeight`] when no rule of
    /// `schedule` covers the context's height.
    pub fn bind(
        schedule: &ForkSchedule,
        source: S,
        context: BlockContext,
        tx_a: TxInput,
        tx_b: TxInput,
    ) -> Result<Self> {
        let spec = schedule.resolve(context.number)?;
        debug!(height = context.number, spec = ?spec, "Binding replay session");
        let mut overlay = StateOverlay::new(source);
        if context.number > 0 {
            overlay.insert_block_hash(context.number - 1, context.parent_hash);
        }
        let initial = overlay.snapshot();
        Ok(Self {
            overlay,
            context,
            spec,
            chain_id: schedule.chain_id(),
            initial: Some(initial),
            restored: false,
            tx_a,
            tx_b,
            phase: Phase::Bound,
            trial1: None,
            trial2: None,
        })
    }

    /// The session's current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The ruleset the session is bound to.
    pub fn spec(&self) -> SpecId {
        self.spec
    }

    /// The block context the session is bound to.
    pub fn block_context(&self) -> &BlockContext {
        &self.context
    }

    /// The forked state view, usable by embedding backends.
    pub fn overlay(&self) -> &StateOverlay<S> {
        &self.overlay
    }

    /// Mutable access to the forked state view.
    pub fn overlay_mut(&mut self) -> &mut StateOverlay<S> {
        &mut self.overlay
    }

    /// Executes A then B against the bound state.
    pub fn run_trial1(&mut self) -> Result<()> {
        self.expect_phase(Phase::Bound, "run_trial1")?;
        match self.run_pair(false) {
            Ok(traces) => {
                self.trial1 = Some(traces);
                self.phase = Phase::Trial1Done;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    /// Restores the initial checkpoint, guaranteeing trial 2 observes
    /// exactly the starting state trial 1 observed.
    pub fn reset_to_initial(&mut self) -> Result<()> {
        self.expect_phase(Phase::Trial1Done, "reset_to_initial")?;
        if self.restored {
            return Err(ReplayError::InvalidPhase {
                operation: "reset_to_initial (already reset)",
                phase: self.phase,
            });
        }
        let Some(initial) = self.initial.take() else {
            return Err(ReplayError::InvalidCheckpointUse);
        };
        match self.overlay.restore_to(initial) {
            Ok(()) => {
                self.restored = true;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    /// Executes B then A. Refused until [`Self::reset_to_initial`] ran.
    pub fn run_trial2(&mut self) -> Result<()> {
        self.expect_phase(Phase::Trial1Done, "run_trial2")?;
        if !self.restored {
            return Err(ReplayError::InvalidPhase {
                operation: "run_trial2 (reset_to_initial has not run)",
                phase: self.phase,
            });
        }
        match self.run_pair(true) {
            Ok(traces) => {
                self.trial2 = Some(traces);
                self.phase = Phase::Trial2Done;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Failed;
                Err(err)
            }
        }
    }

    /// Produces the divergence verdict and all four traces.
    pub fn report(&mut self) -> Result<ReplayReport> {
        self.expect_phase(Phase::Trial2Done, "report")?;
        let (Some(trial1), Some(trial2)) = (self.trial1.clone(), self.trial2.clone()) else {
            return Err(ReplayError::InvalidPhase { operation: "report", phase: self.phase });
        };
        // Compare each transaction with itself across orderings.
        let divergent = trial1.first.diverges_from(&trial2.second)
            || trial1.second.diverges_from(&trial2.first);
        self.phase = Phase::Reported;
        debug!(divergent, "Replay session reported");
        Ok(ReplayReport { trial1, trial2, divergent })
    }

    /// Drives a full experiment: trial 1, reset, trial 2, report.
    pub fn run(mut self) -> Result<ReplayReport> {
        self.run_trial1()?;
        self.reset_to_initial()?;
        self.run_trial2()?;
        self.report()
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ReplayError::InvalidPhase { operation, phase: self.phase })
        }
    }

    fn run_pair(&mut self, swapped: bool) -> Result<TrialTraces> {
        let (first_tx, second_tx) = if swapped {
            (self.tx_b.clone(), self.tx_a.clone())
        } else {
            (self.tx_a.clone(), self.tx_b.clone())
        };
        let first = self.execute_one(&first_tx)?;
        let second = self.execute_one(&second_tx)?;
        Ok(TrialTraces { first, second })
    }

    /// Executes one transaction against the overlay with a fresh step
    /// counter, committing its state delta so the next transaction of the
    /// trial observes it.
    fn execute_one(&mut self, tx: &TxInput) -> Result<ExecutionTrace> {
        let tx_env = self.tx_env(tx)?;
        let mut counter = StepCounter::new();
        debug!(from = %tx.from, to = ?tx.to, "Executing transaction");
        let ResultAndState { result, state } = {
            let mut cfg = CfgEnv::new_with_spec(self.spec);
            cfg.chain_id = self.chain_id;
            // Replay, not validation: captured transactions carry their
            // historical nonces.
            cfg.disable_nonce_check = true;
            let ctx = Context::mainnet()
                .with_db(&mut self.overlay)
                .with_cfg(cfg)
                .with_block(self.context.to_block_env());
            let mut evm = ctx.build_mainnet_with_inspector(&mut counter);
            evm.inspect_tx(tx_env).map_err(execution_error)?
        };
        self.overlay.commit(state);
        trace!(result = ?result, "Transaction executed");
        Ok(counter.into_trace(&result))
    }

    fn tx_env(&mut self, tx: &TxInput) -> Result<TxEnv> {
        let nonce = match tx.nonce {
            Some(nonce) => nonce,
            None => self.overlay.account(tx.from)?.nonce,
        };
        Ok(TxEnv {
            caller: tx.from,
            kind: tx.to.map_or(TxKind::Create, TxKind::Call),
            value: tx.value,
            gas_price: tx.gas_price,
            gas_limit: tx.gas,
            data: tx.input.clone(),
            nonce,
            chain_id: None,
            ..Default::default()
        })
    }
}

fn execution_error(err: EVMError<ReplayError>) -> ReplayError {
    match err {
        // Remote fetch failures surface through the database error channel.
        EVMError::Database(err) => err,
        other => ReplayError::Execution(format!("{other:?}")),
    }
}
