use alloy_primitives::{Address, Bytes, U256};
use revm::primitives::{HashMap, StorageKey, StorageValue};

use crate::{RemoteAccount, ReplayError, Result, StateSource};

/// In-memory [`StateSource`] for testing, with fetch counting.
#[derive(Debug, Clone, Default)]
pub struct StaticStateSource {
    accounts: HashMap<Address, RemoteAccount>,
    storage: HashMap<(Address, StorageKey), StorageValue>,
    /// Number of account fetches served so far.
    pub account_fetches: u64,
    /// Number of storage fetches served so far.
    pub storage_fetches: u64,
}

impl StaticStateSource {
    /// Sets the balance of an account in the source.
    pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.accounts.entry(address).or_default().balance = balance;
        self
    }

    /// Sets the nonce of an account in the source.
    pub fn with_nonce(mut self, address: Address, nonce: u64) -> Self {
        self.accounts.entry(address).or_default().nonce = nonce;
        self
    }

    /// Sets the bytecode of an account in the source.
    pub fn with_code(mut self, address: Address, code: Bytes) -> Self {
        self.accounts.entry(address).or_default().code = code;
        self
    }

    /// Sets a storage slot of an account in the source.
    pub fn with_storage(
        mut self,
        address: Address,
        slot: StorageKey,
        value: StorageValue,
    ) -> Self {
        self.storage.insert((address, slot), value);
        self
    }
}

impl StateSource for StaticStateSource {
    fn account(&mut self, address: Address) -> Result<RemoteAccount> {
        self.account_fetches += 1;
        Ok(self.accounts.get(&address).cloned().unwrap_or_default())
    }

    fn storage(&mut self, address: Address, slot: StorageKey) -> Result<StorageValue> {
        self.storage_fetches += 1;
        Ok(self.storage.get(&(address, slot)).copied().unwrap_or_default())
    }
}

/// [`StateSource`] whose every query fails, for abort-path tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStateSource;

impl StateSource for FailingStateSource {
    fn account(&mut self, address: Address) -> Result<RemoteAccount> {
        Err(ReplayError::RemoteFetch(format!(
            "node unreachable while fetching account {}",
            address
        )))
    }

    fn storage(&mut self, address: Address, slot: StorageKey) -> Result<StorageValue> {
        Err(ReplayError::RemoteFetch(format!(
            "node unreachable while fetching storage {} at {}",
            address, slot
        )))
    }
}
