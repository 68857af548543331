#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256, U256};

use txgate_flow_adapters::FlowAdapterConfig;
use txgate_flow_core::{SignedTx, TransactionDraft};

/// Config with every delay zeroed so adapter tests never wait on wall time.
pub fn instant_config() -> FlowAdapterConfig {
    FlowAdapterConfig {
        device_connect_step_ms: 0,
        device_sign_delay_ms: 0,
        device_sign_timeout_ms: 0,
        ..FlowAdapterConfig::default()
    }
}

pub fn draft(value: u64) -> TransactionDraft {
    TransactionDraft {
        to: Address::repeat_byte(0x51),
        value: U256::from(value),
        data: Bytes::new(),
    }
}

pub fn signed(tag: u8) -> SignedTx {
    SignedTx {
        tx_hash: B256::repeat_byte(tag),
        raw: Bytes::from(vec![tag; 4]),
    }
}
