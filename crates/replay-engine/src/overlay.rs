//! Two-tier forked state store.
//!
//! The baseline tier memoizes everything ever fetched from the remote source
//! at the fork height; the working tier is the mutable view replayed
//! transactions read from and write to. Restoring a checkpoint only ever
//! touches the working tier, so state seen once is never fetched twice.

use alloy_primitives::{keccak256, Address, B256, U256};
use revm::{
    primitives::{HashMap, StorageKey, StorageValue, KECCAK_EMPTY},
    state::{Account, AccountInfo, Bytecode},
    Database, DatabaseCommit,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    checkpoint::SessionId,
    remote::{RemoteAccount, StateSource},
    ReplayError, Result,
};

/// Account-level entry of a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account nonce.
    pub nonce: u64,
    /// Account balance in wei.
    pub balance: U256,
    /// Hash of the account's bytecode; [`KECCAK_EMPTY`] when it has none.
    pub code_hash: B256,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self { nonce: 0, balance: U256::ZERO, code_hash: KECCAK_EMPTY }
    }
}

impl AccountRecord {
    /// Returns `true` if the account has no code, no nonce and no balance.
    pub fn is_empty(&self) -> bool {
        !self.has_code_or_nonce() && self.balance.is_zero()
    }

    /// Returns `true` if the account carries code or a non-zero nonce.
    pub fn has_code_or_nonce(&self) -> bool {
        self.nonce != 0 || self.code_hash != KECCAK_EMPTY
    }
}

/// One tier of the overlay: accounts, per-account storage and
/// content-addressed code.
#[derive(Debug, Clone, Default)]
pub(crate) struct TierStore {
    pub(crate) accounts: HashMap<Address, AccountRecord>,
    pub(crate) storage: HashMap<Address, HashMap<StorageKey, StorageValue>>,
    pub(crate) code: HashMap<B256, Bytecode>,
}

/// Lazily populated world-state view forked at a fixed historical height.
///
/// Reads probe the working tier, then the baseline tier, and only then the
/// remote source; a remote result is memoized into both tiers. All explicit
/// writes land in the working tier only, which is what checkpoints capture.
///
/// Owned exclusively by one replay session for its whole lifetime.
#[derive(Debug)]
pub struct StateOverlay<S> {
    source: S,
    session: SessionId,
    baseline: TierStore,
    working: TierStore,
    block_hashes: HashMap<u64, B256>,
}

impl<S: StateSource> StateOverlay<S> {
    /// Creates an empty overlay over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            session: SessionId::next(),
            baseline: TierStore::default(),
            working: TierStore::default(),
            block_hashes: HashMap::default(),
        }
    }

    /// Registers a known block hash, served to the `BLOCKHASH` opcode.
    pub fn insert_block_hash(&mut self, number: u64, hash: B256) {
        self.block_hashes.insert(number, hash);
    }

    /// Returns the remote source backing this overlay.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn session(&self) -> SessionId {
        self.session
    }

    pub(crate) fn working_tier(&self) -> &TierStore {
        &self.working
    }

    pub(crate) fn working_tier_mut(&mut self) -> &mut TierStore {
        &mut self.working
    }

    pub(crate) fn baseline_tier(&self) -> &TierStore {
        &self.baseline
    }

    /// Returns the account record for `address`, hydrating it on first
    /// access.
    pub fn account(&mut self, address: Address) -> Result<AccountRecord> {
        if let Some(record) = self.working.accounts.get(&address) {
            return Ok(record.clone());
        }
        if let Some(record) = self.baseline.accounts.get(&address).cloned() {
            // Seen before (restore or delete dropped the working copy);
            // re-seed without touching the remote.
            trace!(address = %address, "Account re-seeded from baseline tier");
            self.working.accounts.insert(address, record.clone());
            self.working.storage.entry(address).or_default();
            return Ok(record);
        }
        let remote = self.source.account(address)?;
        Ok(self.insert_cold_account(address, remote))
    }

    /// Memoizes a freshly fetched account into both tiers as the cold-cache
    /// baseline.
    fn insert_cold_account(&mut self, address: Address, remote: RemoteAccount) -> AccountRecord {
        let code_hash = if remote.code.is_empty() {
            KECCAK_EMPTY
        } else {
            let bytecode = Bytecode::new_raw(remote.code);
            let hash = bytecode.hash_slow();
            self.baseline.code.insert(hash, bytecode.clone());
            self.working.code.insert(hash, bytecode);
            hash
        };
        let record =
            AccountRecord { nonce: remote.nonce, balance: remote.balance, code_hash };
        trace!(address = %address, account = ?record, "Account hydrated from remote source");
        self.baseline.accounts.insert(address, record.clone());
        self.working.accounts.insert(address, record.clone());
        self.baseline.storage.entry(address).or_default();
        self.working.storage.entry(address).or_default();
        record
    }

    /// Reads a storage slot, hydrating it on first access. Absent slots are
    /// zero.
    pub fn storage_slot(&mut self, address: Address, slot: StorageKey) -> Result<StorageValue> {
        // Hydrate the owning account first so the tier maps exist.
        self.account(address)?;
        if let Some(value) = self.working.storage.get(&address).and_then(|slots| slots.get(&slot))
        {
            return Ok(*value);
        }
        if let Some(value) =
            self.baseline.storage.get(&address).and_then(|slots| slots.get(&slot)).copied()
        {
            self.working.storage.entry(address).or_default().insert(slot, value);
            return Ok(value);
        }
        let value = self.source.storage(address, slot)?;
        trace!(address = %address, slot = %slot, value = %value, "Storage hydrated from remote source");
        self.baseline.storage.entry(address).or_default().insert(slot, value);
        self.working.storage.entry(address).or_default().insert(slot, value);
        Ok(value)
    }

    /// Returns the bytecode for `address`; empty bytecode if it has none.
    pub fn code(&mut self, address: Address) -> Result<Bytecode> {
        let record = self.account(address)?;
        self.lookup_code(record.code_hash)
    }

    fn lookup_code(&self, code_hash: B256) -> Result<Bytecode> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        self.working
            .code
            .get(&code_hash)
            .or_else(|| self.baseline.code.get(&code_hash))
            .cloned()
            .ok_or(ReplayError::MissingCode(code_hash))
    }

    /// Overwrites the account record for `address`.
    pub fn set_account(&mut self, address: Address, record: AccountRecord) {
        self.working.accounts.insert(address, record);
        self.working.storage.entry(address).or_default();
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<()> {
        let mut record = self.account(address)?;
        record.balance = balance;
        self.working.accounts.insert(address, record);
        Ok(())
    }

    /// Sets the nonce of `address`.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        let mut record = self.account(address)?;
        record.nonce = nonce;
        self.working.accounts.insert(address, record);
        Ok(())
    }

    /// Sets the bytecode of `address`, registering it under its hash.
    pub fn set_code(&mut self, address: Address, code: Bytecode) -> Result<()> {
        let mut record = self.account(address)?;
        record.code_hash = code.hash_slow();
        self.working.code.insert(record.code_hash, code);
        self.working.accounts.insert(address, record);
        Ok(())
    }

    /// Writes a storage slot of `address`.
    pub fn set_storage(&mut self, address: Address, slot: StorageKey, value: StorageValue) {
        self.working.storage.entry(address).or_default().insert(slot, value);
    }

    /// Marks the code of `address` absent. The content-addressed blob stays
    /// available to other accounts referencing it.
    pub fn delete_code(&mut self, address: Address) -> Result<()> {
        let mut record = self.account(address)?;
        record.code_hash = KECCAK_EMPTY;
        self.working.accounts.insert(address, record);
        Ok(())
    }

    /// Drops all working-tier storage of `address`.
    pub fn delete_storage(&mut self, address: Address) {
        self.working.storage.remove(&address);
    }

    /// Removes the account, its storage and its code binding from the
    /// working tier. A later access re-hydrates from the baseline tier.
    pub fn delete_account(&mut self, address: Address) {
        self.working.storage.remove(&address);
        self.working.accounts.remove(&address);
    }

    /// Returns `true` if `address` is materialized in the working tier.
    /// Never triggers a fetch.
    pub fn account_exists(&self, address: Address) -> bool {
        self.working.accounts.contains_key(&address)
    }

    /// Returns `true` if the account has no code, no nonce and no balance.
    pub fn is_empty(&mut self, address: Address) -> Result<bool> {
        Ok(self.account(address)?.is_empty())
    }

    /// Returns `true` if the account carries code or a non-zero nonce.
    pub fn has_code_or_nonce(&mut self, address: Address) -> Result<bool> {
        Ok(self.account(address)?.has_code_or_nonce())
    }

    /// Addresses materialized in the working tier, sorted.
    pub fn cached_accounts(&self) -> Vec<Address> {
        let mut addresses: Vec<_> = self.working.accounts.keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }
}

impl<S: StateSource> Database for StateOverlay<S> {
    type Error = ReplayError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>> {
        let record = self.account(address)?;
        let code = if record.code_hash == KECCAK_EMPTY {
            None
        } else {
            Some(self.lookup_code(record.code_hash)?)
        };
        Ok(Some(AccountInfo {
            balance: record.balance,
            nonce: record.nonce,
            code_hash: record.code_hash,
            code,
        }))
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode> {
        self.lookup_code(code_hash)
    }

    fn storage(&mut self, address: Address, index: StorageKey) -> Result<StorageValue> {
        self.storage_slot(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256> {
        if let Some(hash) = self.block_hashes.get(&number) {
            return Ok(*hash);
        }
        // Fallback for heights outside the bound context, matching EmptyDB.
        Ok(keccak256(number.to_string().as_bytes()))
    }
}

impl<S: StateSource> DatabaseCommit for StateOverlay<S> {
    fn commit(&mut self, changes: HashMap<Address, Account>) {
        for (address, account) in changes {
            if !account.is_touched() {
                continue;
            }
            if account.is_selfdestructed() {
                trace!(address = %address, "Committing selfdestruct");
                self.delete_account(address);
                continue;
            }
            let info = account.info;
            if let Some(code) = info.code {
                if !code.is_empty() {
                    self.working.code.insert(info.code_hash, code);
                }
            }
            self.working.accounts.insert(
                address,
                AccountRecord {
                    nonce: info.nonce,
                    balance: info.balance,
                    code_hash: info.code_hash,
                },
            );
            let slots = self.working.storage.entry(address).or_default();
            for (slot, value) in account.storage {
                slots.insert(slot, value.present_value);
            }
        }
    }
}
