//! Read-only access to chain state at a fixed historical height.

use core::fmt;

use alloy_network::Network;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::Provider;
use auto_impl::auto_impl;
use revm::{
    database::{AlloyDB, WrapDatabaseAsync},
    primitives::{StorageKey, StorageValue},
    DatabaseRef,
};
use tracing::trace;

use crate::{ReplayError, Result};

/// Point-in-time account snapshot answered by a [`StateSource`].
///
/// An address the source has never seen yields the default (empty) account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAccount {
    /// Account nonce at the reference height.
    pub nonce: u64,
    /// Account balance at the reference height.
    pub balance: U256,
    /// Raw contract bytecode; empty for externally owned accounts.
    pub code: Bytes,
}

/// Read-only adapter answering point-in-time state queries at the reference
/// height fixed when the source was constructed.
///
/// Sources are owned by exactly one session; connections are not shared
/// across concurrent sessions. A failed query is fatal to the session and is
/// never retried here.
#[auto_impl(&mut, Box)]
pub trait StateSource {
    /// Fetches the account snapshot (balance, nonce, code) for `address`.
    fn account(&mut self, address: Address) -> Result<RemoteAccount>;

    /// Fetches the value of `slot` for `address`. Absent slots are zero.
    fn storage(&mut self, address: Address, slot: StorageKey) -> Result<StorageValue>;

    /// Balance of `address` at the reference height.
    fn balance(&mut self, address: Address) -> Result<U256> {
        Ok(self.account(address)?.balance)
    }

    /// Nonce of `address` at the reference height.
    fn nonce(&mut self, address: Address) -> Result<u64> {
        Ok(self.account(address)?.nonce)
    }

    /// Bytecode of `address` at the reference height.
    fn code(&mut self, address: Address) -> Result<Bytes> {
        Ok(self.account(address)?.code)
    }
}

/// [`StateSource`] backed by a JSON-RPC provider, pinned to a fork block.
///
/// Built on the async alloy database wrapped for synchronous access, so
/// construction requires an ambient tokio runtime.
pub struct RpcStateSource<N, P>
where
    N: Network,
    P: Provider<N>,
{
    db: WrapDatabaseAsync<AlloyDB<N, P>>,
}

impl<N, P> RpcStateSource<N, P>
where
    N: Network,
    P: Provider<N>,
{
    /// Creates a source answering queries at `height`.
    pub fn new(provider: P, height: u64) -> Result<Self> {
        match WrapDatabaseAsync::new(AlloyDB::new(provider, height.into())) {
            Some(db) => Ok(Self { db }),
            None => Err(ReplayError::RemoteFetch(
                "no tokio runtime available for the RPC state source".to_string(),
            )),
        }
    }
}

impl<N, P> fmt::Debug for RpcStateSource<N, P>
where
    N: Network,
    P: Provider<N>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcStateSource").finish_non_exhaustive()
    }
}

impl<N, P> StateSource for RpcStateSource<N, P>
where
    N: Network,
    P: Provider<N>,
{
    fn account(&mut self, address: Address) -> Result<RemoteAccount> {
        let info = self.db.basic_ref(address).map_err(|e| {
            ReplayError::RemoteFetch(format!("failed to fetch account {}: {:?}", address, e))
        })?;
        trace!(address = %address, account = ?info, "Fetched account from RPC");
        Ok(info
            .map(|info| RemoteAccount {
                nonce: info.nonce,
                balance: info.balance,
                code: info.code.map(|code| code.original_bytes()).unwrap_or_default(),
            })
            .unwrap_or_default())
    }

    fn storage(&mut self, address: Address, slot: StorageKey) -> Result<StorageValue> {
        let value = self.db.storage_ref(address, slot).map_err(|e| {
            ReplayError::RemoteFetch(format!(
                "failed to fetch storage for {} at slot {}: {:?}",
                address, slot, e
            ))
        })?;
        trace!(address = %address, slot = %slot, value = %value, "Fetched storage from RPC");
        Ok(value)
    }
}
