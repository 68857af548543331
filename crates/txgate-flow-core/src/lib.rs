//! Transaction confirmation workflow engine: the state machine that drives
//! a dapp-initiated transfer request through password or hardware-device
//! authorization, and the transition sequencer that maps authoritative
//! states onto animation-safe render keys.

pub mod domain;
pub mod engine;
pub mod ports;
pub mod sequencer;
pub mod state_machine;
pub mod validation;

pub use domain::{
    ConfirmationRequest, DappIdentity, HardwareConnectState, NewRequest, RequestId, SignedTx,
    TimestampMs, TransactionDraft, TransferStage, TransferState,
};
pub use engine::{ConfirmationEngine, FlowHandle};
pub use ports::{
    AuthError, ClockPort, HardwareError, HardwarePort, PasswordPort, RejectReason, RiskPort,
    SettlementError, SettlementPort,
};
pub use sequencer::{HeldPayload, SequencerAction, TransitionKeys, TransitionSequencer};
pub use state_machine::{next_state, replay, Transition, TransferEvent};
pub use validation::{validate_drafts, ValidationError, ValidationLimits};
