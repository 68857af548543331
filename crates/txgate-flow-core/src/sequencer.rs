use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ConfirmationRequest, DappIdentity, TransactionDraft, TransferState};

/// Render-key pair derived from the authoritative state stream.
/// `rendering_key` is the state currently mounted; `next_key` is where the
/// presentation lands once the running exit animation finishes. Equal keys
/// mean nothing is animating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionKeys {
    pub rendering_key: TransferState,
    pub next_key: TransferState,
}

/// Last non-absent request data, served to the presentation layer while a
/// newer snapshot is still loading. Swapped wholesale behind an `Arc` so
/// consumers never observe a half-updated payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeldPayload {
    pub dapp: Option<DappIdentity>,
    pub transactions: Vec<TransactionDraft>,
}

/// What the animation driver should do after feeding a snapshot in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerAction {
    /// Keys unchanged; nothing to animate.
    Idle,
    /// Start the exit animation for `rendering_key`.
    BeginExit,
    /// An exit is already running; its destination moved to the new state.
    Retarget,
}

/// Merges the authoritative state stream into an animation-safe key pair.
///
/// The pending destination is a single slot: when the state changes again
/// mid-animation, the slot is overwritten and the completion handler jumps
/// straight to the latest destination, so intermediate states of a rapid
/// chain are never rendered.
#[derive(Debug)]
pub struct TransitionSequencer {
    rendering_key: TransferState,
    next_key: TransferState,
    exit_in_flight: bool,
    held: Option<Arc<HeldPayload>>,
}

impl TransitionSequencer {
    pub fn new() -> Self {
        Self {
            rendering_key: TransferState::None,
            next_key: TransferState::None,
            exit_in_flight: false,
            held: None,
        }
    }

    pub fn keys(&self) -> TransitionKeys {
        TransitionKeys {
            rendering_key: self.rendering_key,
            next_key: self.next_key,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.exit_in_flight
    }

    /// The payload the presentation layer should render right now. Absent
    /// only before the first request and after a close animation finished.
    pub fn held_payload(&self) -> Option<Arc<HeldPayload>> {
        self.held.clone()
    }

    /// Feeds the latest authoritative snapshot in. Absorbs whatever payload
    /// fields the snapshot defines, then schedules the key transition.
    pub fn observe(&mut self, snapshot: &ConfirmationRequest) -> SequencerAction {
        self.absorb(snapshot);

        let state = snapshot.state();
        if state == self.next_key {
            return SequencerAction::Idle;
        }

        self.next_key = state;
        if self.exit_in_flight {
            debug!(next = ?state, "exit animation retargeted");
            SequencerAction::Retarget
        } else {
            self.exit_in_flight = true;
            debug!(rendering = ?self.rendering_key, next = ?state, "exit animation started");
            SequencerAction::BeginExit
        }
    }

    /// Completes the running exit animation and advances `rendering_key` to
    /// the latest destination. One-shot: completions with no animation in
    /// flight are ignored and return `false`.
    ///
    /// The held payload is dropped only here, and only when the animation
    /// landed on `None`: a request that opened meanwhile retargeted the
    /// animation away from `None`, which cancels the pending clear and keeps
    /// the previous payload on screen through the new loading gap.
    pub fn finish_exit(&mut self) -> bool {
        if !self.exit_in_flight {
            debug!("stale exit completion ignored");
            return false;
        }
        self.exit_in_flight = false;
        self.rendering_key = self.next_key;
        if self.rendering_key == TransferState::None {
            self.held = None;
        }
        true
    }

    /// Keeps the last defined value of each payload field. Cleared snapshot
    /// fields (request resolved, or new request still loading) leave the
    /// held copy in place.
    fn absorb(&mut self, snapshot: &ConfirmationRequest) {
        let dapp_update = match snapshot.dapp.as_ref() {
            Some(dapp) if self.held_dapp() != Some(dapp) => Some(dapp.clone()),
            _ => None,
        };
        let tx_update = if !snapshot.transactions.is_empty()
            && self.held.as_ref().map(|h| &h.transactions[..]) != Some(&snapshot.transactions[..])
        {
            Some(snapshot.transactions.clone())
        } else {
            None
        };
        if dapp_update.is_none() && tx_update.is_none() {
            return;
        }

        let previous = self.held.take().unwrap_or_default();
        self.held = Some(Arc::new(HeldPayload {
            dapp: dapp_update.or_else(|| previous.dapp.clone()),
            transactions: tx_update.unwrap_or_else(|| previous.transactions.clone()),
        }));
    }

    fn held_dapp(&self) -> Option<&DappIdentity> {
        self.held.as_ref().and_then(|h| h.dapp.as_ref())
    }
}

impl Default for TransitionSequencer {
    fn default() -> Self {
        Self::new()
    }
}
