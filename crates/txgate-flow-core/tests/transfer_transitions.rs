use txgate_flow_core::state_machine::OPEN_STATES;
use txgate_flow_core::{next_state, replay, TransferEvent, TransferState};

#[test]
fn software_happy_path_transitions() {
    let s1 = next_state(TransferState::None, TransferEvent::Start).expect("none -> initial");
    assert_eq!(s1, TransferState::Initial);
    let s2 = next_state(s1, TransferEvent::ChooseSoftwarePath).expect("initial -> password");
    assert_eq!(s2, TransferState::Password);
    let s3 = next_state(s2, TransferEvent::SubmitSucceeded).expect("password -> none");
    assert_eq!(s3, TransferState::None);
}

#[test]
fn hardware_happy_path_transitions() {
    let s1 = next_state(TransferState::None, TransferEvent::Start).expect("none -> initial");
    let s2 = next_state(s1, TransferEvent::ChooseHardwarePath { dangerous: false })
        .expect("initial -> connect");
    assert_eq!(s2, TransferState::ConnectHardware);
    let s3 = next_state(s2, TransferEvent::HardwareConnected).expect("connect -> confirm");
    assert_eq!(s3, TransferState::ConfirmHardware);
    let s4 = next_state(s3, TransferEvent::SubmitSucceeded).expect("confirm -> none");
    assert_eq!(s4, TransferState::None);
}

#[test]
fn dangerous_bundle_routes_through_warning() {
    let warned = next_state(
        TransferState::Initial,
        TransferEvent::ChooseHardwarePath { dangerous: true },
    )
    .expect("initial -> warning");
    assert_eq!(warned, TransferState::WarningHardware);

    let acknowledged = next_state(warned, TransferEvent::AcknowledgeHardwareWarning)
        .expect("warning -> connect");
    assert_eq!(acknowledged, TransferState::ConnectHardware);

    let safe = next_state(
        TransferState::Initial,
        TransferEvent::ChooseHardwarePath { dangerous: false },
    )
    .expect("initial -> connect skips warning");
    assert_eq!(safe, TransferState::ConnectHardware);
}

#[test]
fn sub_transaction_inspection_and_back() {
    let confirm = next_state(TransferState::Initial, TransferEvent::SelectSubTransaction)
        .expect("initial -> confirm");
    assert_eq!(confirm, TransferState::Confirm);
    let back = next_state(confirm, TransferEvent::GoBack).expect("confirm -> initial");
    assert_eq!(back, TransferState::Initial);
    let back_from_password = next_state(TransferState::Password, TransferEvent::GoBack)
        .expect("password -> initial");
    assert_eq!(back_from_password, TransferState::Initial);
}

#[test]
fn failed_submits_stay_in_place() {
    assert_eq!(
        next_state(TransferState::Password, TransferEvent::SubmitFailed),
        Some(TransferState::Password)
    );
    assert_eq!(
        next_state(TransferState::ConfirmHardware, TransferEvent::SubmitFailed),
        Some(TransferState::ConfirmHardware)
    );
}

#[test]
fn cancel_resets_every_open_state() {
    for state in OPEN_STATES {
        assert_eq!(
            next_state(state, TransferEvent::Cancel),
            Some(TransferState::None),
            "cancel from {state:?} must reset"
        );
    }
    assert_eq!(next_state(TransferState::None, TransferEvent::Cancel), None);
}

#[test]
fn unmatched_events_have_no_row() {
    // A second start while open, completions outside a submit, and
    // back-navigation from states without a back edge must all be ignored.
    for state in OPEN_STATES {
        assert_eq!(next_state(state, TransferEvent::Start), None);
    }
    assert_eq!(
        next_state(TransferState::Initial, TransferEvent::SubmitSucceeded),
        None
    );
    assert_eq!(
        next_state(TransferState::Initial, TransferEvent::GoBack),
        None
    );
    assert_eq!(
        next_state(TransferState::Password, TransferEvent::HardwareConnected),
        None
    );
    assert_eq!(
        next_state(TransferState::ConnectHardware, TransferEvent::GoBack),
        None
    );
    assert_eq!(
        next_state(
            TransferState::WarningHardware,
            TransferEvent::SelectSubTransaction
        ),
        None
    );
    assert_eq!(
        next_state(TransferState::None, TransferEvent::SubmitSucceeded),
        None
    );
}

#[test]
fn replay_folds_the_table_over_event_sequences() {
    let events = [
        TransferEvent::Start,
        TransferEvent::SelectSubTransaction,
        TransferEvent::GoBack,
        TransferEvent::ChooseHardwarePath { dangerous: true },
        TransferEvent::AcknowledgeHardwareWarning,
        TransferEvent::HardwareConnected,
        TransferEvent::SubmitFailed,
        TransferEvent::SubmitSucceeded,
    ];
    assert_eq!(replay(events), TransferState::None);

    // Stepping one event at a time must agree with the fold at every prefix.
    let mut stepped = TransferState::None;
    for (i, event) in events.iter().enumerate() {
        stepped = next_state(stepped, *event).unwrap_or(stepped);
        assert_eq!(
            stepped,
            replay(events[..=i].iter().copied()),
            "fold diverged after event {i}"
        );
    }
}

#[test]
fn replay_skips_unmatched_events() {
    let with_noise = [
        TransferEvent::SubmitSucceeded,
        TransferEvent::Start,
        TransferEvent::GoBack,
        TransferEvent::HardwareConnected,
        TransferEvent::ChooseSoftwarePath,
        TransferEvent::Start,
    ];
    assert_eq!(replay(with_noise), TransferState::Password);
}
