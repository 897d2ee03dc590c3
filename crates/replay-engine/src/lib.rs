//! Forked-state overlay, checkpointing and reorder replay.
//!
//! The engine reconstructs a consistent world-state view forked at an
//! arbitrary historical block, lets a transaction pair be applied in either
//! order against that same starting state and reports whether the execution
//! outcome depends on the ordering — without a full local copy of the chain.
//!
//! Entry point: [`ReplaySession::bind`] with a [`ForkSchedule`], a
//! [`StateSource`] (e.g. [`RpcStateSource`]) and a [`BlockContext`], then
//! [`ReplaySession::run`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod checkpoint;
pub use checkpoint::*;

mod error;
pub use error::*;

mod inspector;
pub use inspector::*;

mod overlay;
pub use overlay::*;

mod remote;
pub use remote::*;

mod replay;
pub use replay::*;

mod schedule;
pub use schedule::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;
