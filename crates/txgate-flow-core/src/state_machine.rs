use serde::{Deserialize, Serialize};

use crate::domain::TransferState;

/// Inputs to the transition table: user intents plus the terminal outcomes
/// of the asynchronous authorization submits. Submit *starts* and payload
/// edits (`hydrate`, `clear_error`) mutate stage data without moving between
/// states, so they are not events here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Start,
    SelectSubTransaction,
    ChooseSoftwarePath,
    ChooseHardwarePath { dangerous: bool },
    AcknowledgeHardwareWarning,
    HardwareConnected,
    GoBack,
    SubmitSucceeded,
    SubmitFailed,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: TransferState,
    pub to: TransferState,
    pub event: TransferEvent,
}

/// The confirmation transition table. Returns `None` for any event the
/// current state has no row for; callers treat that as a no-op so duplicate
/// or out-of-order events are harmless.
pub fn next_state(from: TransferState, event: TransferEvent) -> Option<TransferState> {
    use TransferEvent as E;
    use TransferState as S;

    let to = match (from, event) {
        (S::None, E::Start) => S::Initial,
        (S::Initial, E::SelectSubTransaction) => S::Confirm,
        (S::Initial, E::ChooseSoftwarePath) => S::Password,
        (S::Initial, E::ChooseHardwarePath { dangerous: true }) => S::WarningHardware,
        (S::Initial, E::ChooseHardwarePath { dangerous: false }) => S::ConnectHardware,
        (S::WarningHardware, E::AcknowledgeHardwareWarning) => S::ConnectHardware,
        (S::ConnectHardware, E::HardwareConnected) => S::ConfirmHardware,
        (S::Confirm | S::Password, E::GoBack) => S::Initial,
        (S::Password | S::ConfirmHardware, E::SubmitSucceeded) => S::None,
        (S::Password, E::SubmitFailed) => S::Password,
        (S::ConfirmHardware, E::SubmitFailed) => S::ConfirmHardware,
        (from, E::Cancel) if from.is_open() => S::None,
        _ => return None,
    };
    Some(to)
}

/// Folds an event sequence over the table starting from `None`, skipping
/// unmatched events. The engine applies events one at a time through
/// `next_state`; replaying through this fold must land on the same state.
pub fn replay<I>(events: I) -> TransferState
where
    I: IntoIterator<Item = TransferEvent>,
{
    events
        .into_iter()
        .fold(TransferState::None, |state, event| {
            next_state(state, event).unwrap_or(state)
        })
}

pub const OPEN_STATES: [TransferState; 6] = [
    TransferState::Initial,
    TransferState::WarningHardware,
    TransferState::Confirm,
    TransferState::Password,
    TransferState::ConnectHardware,
    TransferState::ConfirmHardware,
];
