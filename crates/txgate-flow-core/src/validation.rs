use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TransactionDraft;

pub const MAX_TRANSACTIONS_PER_REQUEST: usize = 16;
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("bundle has {count} transactions, limit is {max}")]
    TooManyTransactions { count: usize, max: usize },
    #[error("transaction {index} payload is {len} bytes, limit is {max}")]
    OversizedPayload { index: usize, len: usize, max: usize },
    #[error("transaction {index} transfers no value and carries no payload")]
    NoOpTransfer { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationLimits {
    pub max_transactions: usize,
    pub max_payload_bytes: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_transactions: MAX_TRANSACTIONS_PER_REQUEST,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

/// Checks a candidate bundle before it enters the flow. An empty bundle
/// passes: requests may open as a loading placeholder and receive their
/// transactions through hydration, which runs the same checks.
pub fn validate_drafts(
    drafts: &[TransactionDraft],
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    if drafts.len() > limits.max_transactions {
        return Err(ValidationError::TooManyTransactions {
            count: drafts.len(),
            max: limits.max_transactions,
        });
    }
    for (index, draft) in drafts.iter().enumerate() {
        if draft.data.len() > limits.max_payload_bytes {
            return Err(ValidationError::OversizedPayload {
                index,
                len: draft.data.len(),
                max: limits.max_payload_bytes,
            });
        }
        if draft.value.is_zero() && draft.data.is_empty() {
            return Err(ValidationError::NoOpTransfer { index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, U256};

    fn transfer(value: u64) -> TransactionDraft {
        TransactionDraft {
            to: Address::repeat_byte(0x11),
            value: U256::from(value),
            data: Bytes::new(),
        }
    }

    #[test]
    fn empty_bundle_is_a_valid_loading_placeholder() {
        assert_eq!(validate_drafts(&[], &ValidationLimits::default()), Ok(()));
    }

    #[test]
    fn rejects_oversized_bundle() {
        let drafts = vec![transfer(1); MAX_TRANSACTIONS_PER_REQUEST + 1];
        assert_eq!(
            validate_drafts(&drafts, &ValidationLimits::default()),
            Err(ValidationError::TooManyTransactions {
                count: MAX_TRANSACTIONS_PER_REQUEST + 1,
                max: MAX_TRANSACTIONS_PER_REQUEST,
            })
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let limits = ValidationLimits {
            max_payload_bytes: 8,
            ..ValidationLimits::default()
        };
        let draft = TransactionDraft {
            data: Bytes::from(vec![0xAA; 9]),
            ..transfer(1)
        };
        assert_eq!(
            validate_drafts(&[transfer(1), draft], &limits),
            Err(ValidationError::OversizedPayload {
                index: 1,
                len: 9,
                max: 8,
            })
        );
    }

    #[test]
    fn rejects_zero_value_transfer_without_payload() {
        assert_eq!(
            validate_drafts(&[transfer(0)], &ValidationLimits::default()),
            Err(ValidationError::NoOpTransfer { index: 0 })
        );
    }

    #[test]
    fn zero_value_call_with_payload_is_allowed() {
        let call = TransactionDraft {
            data: Bytes::from(vec![0x01, 0x02, 0x03, 0x04]),
            ..transfer(0)
        };
        assert_eq!(validate_drafts(&[call], &ValidationLimits::default()), Ok(()));
    }
}
