//! Checkpointing of the overlay's working tier.
//!
//! A checkpoint is an opaque deep copy of the working tier, owned by the
//! call site that took it and valid only for the overlay that produced it.
//! The baseline tier is deliberately not captured: it only ever grows with
//! immutable remote data, so restoring the working tier is enough to roll
//! back every effect of replayed execution.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::{overlay::StateOverlay, ReplayError, Result, StateSource};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one overlay session; checkpoints never cross sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Captured working-tier state of one [`StateOverlay`].
///
/// Deliberately not `Clone`: a checkpoint belongs to the call site that took
/// it and is consumed by the restore.
#[derive(Debug)]
pub struct Checkpoint {
    session: SessionId,
    state: crate::overlay::TierStore,
}

impl<S: StateSource> StateOverlay<S> {
    /// Captures the current working tier as a restorable checkpoint.
    pub fn snapshot(&self) -> Checkpoint {
        debug!(session = ?self.session(), "Capturing checkpoint");
        Checkpoint { session: self.session(), state: self.working_tier().clone() }
    }

    /// Replaces the working tier wholesale with `checkpoint`, discarding
    /// every write made since it was taken.
    ///
    /// Fails fast with [`ReplayError::InvalidCheckpointUse`] when the
    /// checkpoint was taken by a different overlay.
    pub fn restore_to(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.session != self.session() {
            return Err(ReplayError::InvalidCheckpointUse);
        }
        debug!(session = ?self.session(), "Restoring checkpoint");
        *self.working_tier_mut() = checkpoint.state;
        Ok(())
    }

    /// Collapses the working tier back down to the baseline tier, i.e. the
    /// pristine forked state plus everything hydrated so far.
    pub fn commit_baseline(&mut self) {
        debug!(session = ?self.session(), "Resetting working tier to baseline");
        *self.working_tier_mut() = self.baseline_tier().clone();
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, Address, U256};

    use crate::{test_utils::StaticStateSource, ReplayError, StateOverlay};

    const ALICE: Address = address!("00000000000000000000000000000000000a11ce");

    fn overlay() -> StateOverlay<StaticStateSource> {
        StateOverlay::new(StaticStateSource::default().with_balance(ALICE, U256::from(100)))
    }

    #[test]
    fn restore_discards_later_writes() {
        let mut overlay = overlay();
        overlay.account(ALICE).unwrap();

        let checkpoint = overlay.snapshot();
        overlay.set_balance(ALICE, U256::from(1)).unwrap();
        overlay.set_nonce(ALICE, 9).unwrap();

        overlay.restore_to(checkpoint).unwrap();
        let record = overlay.account(ALICE).unwrap();
        assert_eq!(record.balance, U256::from(100));
        assert_eq!(record.nonce, 0);
    }

    #[test]
    fn restore_does_not_refetch_hydrated_state() {
        let mut overlay = overlay();
        let checkpoint = overlay.snapshot();

        overlay.account(ALICE).unwrap();
        overlay.restore_to(checkpoint).unwrap();

        assert_eq!(overlay.account(ALICE).unwrap().balance, U256::from(100));
        assert_eq!(overlay.source().account_fetches, 1);
    }

    #[test]
    fn commit_baseline_resets_to_pristine_fork_state() {
        let mut overlay = overlay();
        overlay.set_balance(ALICE, U256::from(7)).unwrap();

        overlay.commit_baseline();
        assert_eq!(overlay.account(ALICE).unwrap().balance, U256::from(100));
    }

    #[test]
    fn foreign_checkpoint_is_rejected() {
        let mut first = overlay();
        let second = overlay();

        let foreign = second.snapshot();
        drop(second);

        assert!(matches!(first.restore_to(foreign), Err(ReplayError::InvalidCheckpointUse)));
    }
}
