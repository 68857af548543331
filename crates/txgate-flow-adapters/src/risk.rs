use alloy::primitives::{keccak256, U256};
use tracing::debug;

use txgate_flow_core::{RiskPort, TransactionDraft};

/// Call signatures that hand an external party lasting control: token
/// approvals, operator grants, ownership and implementation changes.
const DANGEROUS_SIGNATURES: [&str; 5] = [
    "approve(address,uint256)",
    "increaseAllowance(address,uint256)",
    "setApprovalForAll(address,bool)",
    "transferOwnership(address)",
    "upgradeTo(address)",
];

/// Flags bundles that warrant the hardware warning screen: a known
/// dangerous selector anywhere in the bundle, or a single transfer above
/// the configured value threshold.
#[derive(Debug, Clone)]
pub struct PayloadRiskAdapter {
    selectors: Vec<[u8; 4]>,
    value_threshold: U256,
}

impl PayloadRiskAdapter {
    pub fn new(value_threshold: U256) -> Self {
        let selectors = DANGEROUS_SIGNATURES
            .iter()
            .map(|signature| {
                let hash = keccak256(signature.as_bytes());
                [hash[0], hash[1], hash[2], hash[3]]
            })
            .collect();
        Self {
            selectors,
            value_threshold,
        }
    }
}

impl RiskPort for PayloadRiskAdapter {
    fn is_dangerous(&self, drafts: &[TransactionDraft]) -> bool {
        for (index, draft) in drafts.iter().enumerate() {
            if draft.value > self.value_threshold {
                debug!(index, value = %draft.value, "bundle flagged: value above threshold");
                return true;
            }
            if draft.data.len() >= 4 {
                let selector = &draft.data[..4];
                if self.selectors.iter().any(|known| known == selector) {
                    debug!(index, "bundle flagged: dangerous call selector");
                    return true;
                }
            }
        }
        false
    }
}
