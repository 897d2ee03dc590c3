use alloy_primitives::{Address, Bytes, B256, B64, U256};

use crate::{BlockContext, TxInput};

/// A mainnet-shaped block context at `number`.
pub fn block_context(number: u64) -> BlockContext {
    BlockContext {
        number,
        timestamp: 1_615_191_189,
        gas_limit: 12_500_000,
        difficulty: U256::from(5_000_000_000_000_000u64),
        coinbase: Address::repeat_byte(0xcb),
        parent_hash: B256::repeat_byte(0x11),
        state_root: B256::repeat_byte(0x22),
        receipts_root: B256::repeat_byte(0x33),
        transactions_root: B256::repeat_byte(0x44),
        extra_data: Bytes::new(),
        mix_hash: B256::repeat_byte(0x55),
        nonce: B64::ZERO,
    }
}

/// A plain value transfer using the sender's current nonce.
pub fn transfer(from: Address, to: Address, value: U256) -> TxInput {
    TxInput {
        from,
        to: Some(to),
        value,
        gas_price: 0,
        gas: 100_000,
        input: Bytes::new(),
        nonce: None,
    }
}

/// A contract call carrying `input` data.
pub fn call(from: Address, to: Address, input: Bytes) -> TxInput {
    TxInput {
        from,
        to: Some(to),
        value: U256::ZERO,
        gas_price: 0,
        gas: 1_000_000,
        input,
        nonce: None,
    }
}
