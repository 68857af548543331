use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::ports::{AuthError, HardwareError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

/// Engine-assigned generation number for a confirmation request. Strictly
/// increasing across requests; completions tagged with a superseded id are
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Flat state identifier, also used as the render key by the transition
/// sequencer. `None` means no active request; every other state is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
    None,
    Initial,
    WarningHardware,
    Confirm,
    Password,
    ConnectHardware,
    ConfirmHardware,
}

impl TransferState {
    pub fn is_open(self) -> bool {
        self != TransferState::None
    }
}

/// Authoritative stage of the active request. Each variant carries only the
/// fields valid for that state, so a viewing index cannot outlive `Confirm`
/// and an auth error cannot outlive `Password`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferStage {
    None,
    Initial,
    WarningHardware,
    Confirm {
        viewing_index: usize,
    },
    Password {
        is_loading: bool,
        error: Option<AuthError>,
    },
    ConnectHardware,
    ConfirmHardware {
        is_loading: bool,
        error: Option<HardwareError>,
    },
}

impl TransferStage {
    pub fn state(&self) -> TransferState {
        match self {
            TransferStage::None => TransferState::None,
            TransferStage::Initial => TransferState::Initial,
            TransferStage::WarningHardware => TransferState::WarningHardware,
            TransferStage::Confirm { .. } => TransferState::Confirm,
            TransferStage::Password { .. } => TransferState::Password,
            TransferStage::ConnectHardware => TransferState::ConnectHardware,
            TransferStage::ConfirmHardware { .. } => TransferState::ConfirmHardware,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            TransferStage::Password {
                is_loading: true,
                ..
            } | TransferStage::ConfirmHardware {
                is_loading: true,
                ..
            }
        )
    }

    pub fn viewing_index(&self) -> Option<usize> {
        match self {
            TransferStage::Confirm { viewing_index } => Some(*viewing_index),
            _ => None,
        }
    }

    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            TransferStage::Password { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    pub fn hardware_error(&self) -> Option<&HardwareError> {
        match self {
            TransferStage::ConfirmHardware { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

/// Identity of the application that asked for the transfer. Absent on the
/// request snapshot while connection metadata is still loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappIdentity {
    pub name: String,
    pub url: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Opaque signed envelope produced by an authorization collaborator and
/// handed to settlement for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub tx_hash: B256,
    pub raw: Bytes,
}

/// Hardware device session status, owned by the hardware collaborator and
/// only observed here. `Confirmed` means both the device and its signing
/// application are verified ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareConnectState {
    Disconnected,
    Connecting,
    Connected,
    AppNotOpen,
    Confirmed,
    Rejected,
}

impl HardwareConnectState {
    pub fn is_ready(self) -> bool {
        self == HardwareConnectState::Confirmed
    }
}

/// Input to `FlowHandle::start`. The engine assigns the request id and
/// creation timestamp itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub origin_id: String,
    pub dapp: Option<DappIdentity>,
    pub transactions: Vec<TransactionDraft>,
}

/// Snapshot of the active request published on every mutation. The payload
/// fields are cleared when the request resolves to `None`; the sequencer
/// keeps its own held copy across that gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: RequestId,
    pub origin_id: String,
    pub dapp: Option<DappIdentity>,
    pub transactions: Vec<TransactionDraft>,
    pub stage: TransferStage,
    pub created_at: TimestampMs,
}

impl ConfirmationRequest {
    /// Snapshot published before any request has started.
    pub fn idle() -> Self {
        Self {
            id: RequestId(0),
            origin_id: String::new(),
            dapp: None,
            transactions: Vec::new(),
            stage: TransferStage::None,
            created_at: TimestampMs(0),
        }
    }

    pub fn state(&self) -> TransferState {
        self.stage.state()
    }

    pub fn is_open(&self) -> bool {
        self.stage.is_open()
    }

    pub fn is_loading(&self) -> bool {
        self.stage.is_loading()
    }

    /// The dapp identity is loaded lazily after the request opens.
    pub fn is_dapp_loading(&self) -> bool {
        self.is_open() && self.dapp.is_none()
    }
}
