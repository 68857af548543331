use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    ConfirmationRequest, DappIdentity, NewRequest, RequestId, SignedTx, TimestampMs,
    TransactionDraft, TransferStage, TransferState,
};
use crate::ports::{
    AuthError, ClockPort, HardwareError, HardwarePort, PasswordPort, RejectReason, RiskPort,
    SettlementPort,
};
use crate::state_machine::{next_state, Transition, TransferEvent};
use crate::validation::{validate_drafts, ValidationError, ValidationLimits};

/// Everything the engine's run loop consumes: user intents plus the
/// loopback completions of its own spawned tasks. Completions carry the
/// request generation and attempt they were started under so late arrivals
/// can be discarded.
enum EngineEvent {
    Start(NewRequest),
    Hydrate {
        dapp: Option<DappIdentity>,
        transactions: Vec<TransactionDraft>,
    },
    SelectSubTransaction {
        index: usize,
    },
    GoBack,
    ChooseSoftwarePath,
    ChooseHardwarePath,
    AcknowledgeHardwareWarning,
    SubmitPassword {
        password: String,
    },
    RetryHardwareSign,
    ClearError,
    Cancel,
    HardwareReady {
        id: RequestId,
    },
    PasswordResolved {
        id: RequestId,
        attempt: u64,
        outcome: Result<SignedTx, AuthError>,
    },
    HardwareResolved {
        id: RequestId,
        attempt: u64,
        outcome: Result<SignedTx, HardwareError>,
    },
}

/// Cloneable mutation surface for the engine. All writes to the
/// authoritative state go through here; observers read the snapshot channel.
#[derive(Clone)]
pub struct FlowHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    limits: ValidationLimits,
}

impl FlowHandle {
    /// Opens a new confirmation request. Fails fast if the candidate bundle
    /// is malformed; an accepted request is ignored by the engine when
    /// another one is still active.
    pub fn start(&self, request: NewRequest) -> Result<(), ValidationError> {
        validate_drafts(&request.transactions, &self.limits)?;
        self.send(EngineEvent::Start(request));
        Ok(())
    }

    /// Fills in payload fields that were still loading when the request
    /// opened. Fields already present are kept.
    pub fn hydrate(&self, dapp: Option<DappIdentity>, transactions: Vec<TransactionDraft>) {
        self.send(EngineEvent::Hydrate { dapp, transactions });
    }

    pub fn select_sub_transaction(&self, index: usize) {
        self.send(EngineEvent::SelectSubTransaction { index });
    }

    pub fn go_back(&self) {
        self.send(EngineEvent::GoBack);
    }

    pub fn choose_software_path(&self) {
        self.send(EngineEvent::ChooseSoftwarePath);
    }

    pub fn choose_hardware_path(&self) {
        self.send(EngineEvent::ChooseHardwarePath);
    }

    pub fn acknowledge_hardware_warning(&self) {
        self.send(EngineEvent::AcknowledgeHardwareWarning);
    }

    pub fn submit_password(&self, password: String) {
        self.send(EngineEvent::SubmitPassword { password });
    }

    pub fn retry_hardware_sign(&self) {
        self.send(EngineEvent::RetryHardwareSign);
    }

    pub fn clear_error(&self) {
        self.send(EngineEvent::ClearError);
    }

    pub fn cancel(&self) {
        self.send(EngineEvent::Cancel);
    }

    fn send(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("engine stopped, intent dropped");
        }
    }
}

struct ActiveRequest {
    id: RequestId,
    origin_id: String,
    dapp: Option<DappIdentity>,
    transactions: Vec<TransactionDraft>,
    stage: TransferStage,
    created_at: TimestampMs,
    /// Bumped on every submit start; completions from older attempts are
    /// discarded even when the request id still matches.
    attempt: u64,
    in_flight: Option<JoinHandle<()>>,
    connect_watch: Option<JoinHandle<()>>,
}

impl ActiveRequest {
    fn snapshot(&self) -> ConfirmationRequest {
        ConfirmationRequest {
            id: self.id,
            origin_id: self.origin_id.clone(),
            dapp: self.dapp.clone(),
            transactions: self.transactions.clone(),
            stage: self.stage.clone(),
            created_at: self.created_at,
        }
    }

    /// Terminal snapshot: stage `None`, payload discarded. The request id
    /// and origin are kept for correlation.
    fn resolved_snapshot(&self) -> ConfirmationRequest {
        ConfirmationRequest {
            id: self.id,
            origin_id: self.origin_id.clone(),
            dapp: None,
            transactions: Vec::new(),
            stage: TransferStage::None,
            created_at: self.created_at,
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        if let Some(task) = self.connect_watch.take() {
            task.abort();
        }
    }
}

/// Single owner of the confirmation state. All mutation is serialized
/// through one event channel; password and hardware submits run as spawned
/// tasks that report back through the same channel.
pub struct ConfirmationEngine<R, P, H, S, C>
where
    R: RiskPort,
    P: PasswordPort,
    H: HardwarePort,
    S: SettlementPort,
    C: ClockPort,
{
    risk: R,
    password: Arc<P>,
    hardware: Arc<H>,
    settlement: Arc<S>,
    clock: C,
    limits: ValidationLimits,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    snapshots: watch::Sender<ConfirmationRequest>,
    active: Option<ActiveRequest>,
    next_request_id: u64,
}

impl<R, P, H, S, C> ConfirmationEngine<R, P, H, S, C>
where
    R: RiskPort + Send + 'static,
    P: PasswordPort + Send + Sync + 'static,
    H: HardwarePort + Send + Sync + 'static,
    S: SettlementPort + Send + Sync + 'static,
    C: ClockPort + Send + 'static,
{
    pub fn new(
        risk: R,
        password: P,
        hardware: H,
        settlement: S,
        clock: C,
        limits: ValidationLimits,
    ) -> (Self, FlowHandle, watch::Receiver<ConfirmationRequest>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(ConfirmationRequest::idle());
        let handle = FlowHandle {
            events: events_tx.clone(),
            limits,
        };
        let engine = Self {
            risk,
            password: Arc::new(password),
            hardware: Arc::new(hardware),
            settlement: Arc::new(settlement),
            clock,
            limits,
            events_tx,
            events_rx,
            snapshots,
            active: None,
            next_request_id: 1,
        };
        (engine, handle, snapshots_rx)
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Start(request) => self.on_start(request),
            EngineEvent::Hydrate { dapp, transactions } => self.on_hydrate(dapp, transactions),
            EngineEvent::SelectSubTransaction { index } => self.on_select_sub_transaction(index),
            EngineEvent::GoBack => self.on_go_back(),
            EngineEvent::ChooseSoftwarePath => self.on_choose_software_path(),
            EngineEvent::ChooseHardwarePath => self.on_choose_hardware_path(),
            EngineEvent::AcknowledgeHardwareWarning => self.on_acknowledge_hardware_warning(),
            EngineEvent::SubmitPassword { password } => self.on_submit_password(password),
            EngineEvent::RetryHardwareSign => self.on_retry_hardware_sign(),
            EngineEvent::ClearError => self.on_clear_error(),
            EngineEvent::Cancel => self.on_cancel(),
            EngineEvent::HardwareReady { id } => self.on_hardware_ready(id),
            EngineEvent::PasswordResolved {
                id,
                attempt,
                outcome,
            } => self.on_password_resolved(id, attempt, outcome),
            EngineEvent::HardwareResolved {
                id,
                attempt,
                outcome,
            } => self.on_hardware_resolved(id, attempt, outcome),
        }
    }

    fn on_start(&mut self, request: NewRequest) {
        if self.active.is_some() {
            debug!(origin = %request.origin_id, "start ignored, a request is already active");
            return;
        }
        let Some(t) = self.gate(TransferEvent::Start) else {
            return;
        };
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        self.active = Some(ActiveRequest {
            id,
            origin_id: request.origin_id,
            dapp: request.dapp,
            transactions: request.transactions,
            stage: TransferStage::Initial,
            created_at: self.clock.now_ms(),
            attempt: 0,
            in_flight: None,
            connect_watch: None,
        });
        self.log_transition(t, id);
        self.publish();
    }

    fn on_hydrate(&mut self, dapp: Option<DappIdentity>, transactions: Vec<TransactionDraft>) {
        let (id, needs_transactions) = match self.active.as_ref() {
            Some(active) => (active.id, active.transactions.is_empty()),
            None => {
                debug!("hydrate with no active request ignored");
                return;
            }
        };
        if needs_transactions && !transactions.is_empty() {
            if let Err(error) = validate_drafts(&transactions, &self.limits) {
                warn!(request = id.0, error = %error, "hydrated bundle failed validation, rejecting request");
                self.reject_and_close(TransferEvent::Cancel, RejectReason::InvalidPayload);
                return;
            }
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let mut changed = false;
        if let Some(dapp) = dapp {
            if active.dapp.is_none() {
                active.dapp = Some(dapp);
                changed = true;
            } else {
                debug!(request = id.0, "dapp identity already set, hydration skipped");
            }
        }
        if !transactions.is_empty() {
            if active.transactions.is_empty() {
                active.transactions = transactions;
                changed = true;
            } else {
                debug!(request = id.0, "transactions already set, hydration skipped");
            }
        }
        if changed {
            self.publish();
        }
    }

    fn on_select_sub_transaction(&mut self, index: usize) {
        let Some(t) = self.gate(TransferEvent::SelectSubTransaction) else {
            return;
        };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if index >= active.transactions.len() {
            debug!(
                request = active.id.0,
                index,
                len = active.transactions.len(),
                "sub-transaction index out of range, ignored"
            );
            return;
        }
        active.stage = TransferStage::Confirm {
            viewing_index: index,
        };
        let id = active.id;
        self.log_transition(t, id);
        self.publish();
    }

    fn on_go_back(&mut self) {
        let Some(t) = self.gate(TransferEvent::GoBack) else {
            return;
        };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        // A submit abandoned by leaving Password keeps running detached;
        // its completion fails the attempt guard and is discarded.
        active.in_flight = None;
        active.stage = TransferStage::Initial;
        let id = active.id;
        self.log_transition(t, id);
        self.publish();
    }

    fn on_choose_software_path(&mut self) {
        let Some(t) = self.gate(TransferEvent::ChooseSoftwarePath) else {
            return;
        };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.transactions.is_empty() {
            warn!(
                request = active.id.0,
                "authorization requires a loaded bundle, waiting for hydration"
            );
            return;
        }
        active.stage = TransferStage::Password {
            is_loading: false,
            error: None,
        };
        let id = active.id;
        self.log_transition(t, id);
        self.publish();
    }

    fn on_choose_hardware_path(&mut self) {
        let Some(active) = self.active.as_ref() else {
            debug!("choose_hardware_path with no active request ignored");
            return;
        };
        if active.transactions.is_empty() {
            warn!(
                request = active.id.0,
                "authorization requires a loaded bundle, waiting for hydration"
            );
            return;
        }
        let id = active.id;
        let dangerous = self.risk.is_dangerous(&active.transactions);
        let Some(t) = self.gate(TransferEvent::ChooseHardwarePath { dangerous }) else {
            return;
        };
        let watcher =
            (t.to == TransferState::ConnectHardware).then(|| self.spawn_connect_watch(id));
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.stage = if t.to == TransferState::WarningHardware {
            TransferStage::WarningHardware
        } else {
            TransferStage::ConnectHardware
        };
        active.connect_watch = watcher;
        self.log_transition(t, id);
        self.publish();
    }

    fn on_acknowledge_hardware_warning(&mut self) {
        let Some(t) = self.gate(TransferEvent::AcknowledgeHardwareWarning) else {
            return;
        };
        let Some(id) = self.active.as_ref().map(|active| active.id) else {
            return;
        };
        let watcher = self.spawn_connect_watch(id);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.stage = TransferStage::ConnectHardware;
        active.connect_watch = Some(watcher);
        self.log_transition(t, id);
        self.publish();
    }

    fn on_hardware_ready(&mut self, id: RequestId) {
        let current = self
            .active
            .as_ref()
            .is_some_and(|a| a.id == id && a.stage.state() == TransferState::ConnectHardware);
        if !current {
            debug!(request = id.0, "stale device-ready signal discarded");
            return;
        }
        let Some(t) = self.gate(TransferEvent::HardwareConnected) else {
            return;
        };
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(watch) = active.connect_watch.take() {
            watch.abort();
        }
        active.attempt += 1;
        active.stage = TransferStage::ConfirmHardware {
            is_loading: true,
            error: None,
        };
        let attempt = active.attempt;
        let drafts = active.transactions.clone();
        let task = self.spawn_hardware_sign(id, attempt, drafts);
        if let Some(active) = self.active.as_mut() {
            active.in_flight = Some(task);
        }
        self.log_transition(t, id);
        self.publish();
    }

    fn on_submit_password(&mut self, password: String) {
        let Some(active) = self.active.as_mut() else {
            debug!("password submit with no active request ignored");
            return;
        };
        let id = active.id;
        let kept = match &mut active.stage {
            TransferStage::Password {
                is_loading: false,
                error,
            } => error.take(),
            TransferStage::Password { .. } => {
                debug!(request = id.0, "password submit already in flight");
                return;
            }
            stage => {
                debug!(
                    request = id.0,
                    state = ?stage.state(),
                    "password submit ignored outside password stage"
                );
                return;
            }
        };
        active.stage = TransferStage::Password {
            is_loading: true,
            error: kept,
        };
        active.attempt += 1;
        let attempt = active.attempt;
        let drafts = active.transactions.clone();
        debug!(request = id.0, attempt, "password submit started");
        let task = self.spawn_password_verify(id, attempt, password, drafts);
        if let Some(active) = self.active.as_mut() {
            active.in_flight = Some(task);
        }
        self.publish();
    }

    fn on_retry_hardware_sign(&mut self) {
        let Some(active) = self.active.as_mut() else {
            debug!("hardware retry with no active request ignored");
            return;
        };
        let id = active.id;
        let kept = match &mut active.stage {
            TransferStage::ConfirmHardware {
                is_loading: false,
                error,
            } => error.take(),
            TransferStage::ConfirmHardware { .. } => {
                debug!(request = id.0, "device sign already in flight");
                return;
            }
            stage => {
                debug!(
                    request = id.0,
                    state = ?stage.state(),
                    "hardware retry ignored outside confirm stage"
                );
                return;
            }
        };
        active.stage = TransferStage::ConfirmHardware {
            is_loading: true,
            error: kept,
        };
        active.attempt += 1;
        let attempt = active.attempt;
        let drafts = active.transactions.clone();
        debug!(request = id.0, attempt, "hardware sign retry started");
        let task = self.spawn_hardware_sign(id, attempt, drafts);
        if let Some(active) = self.active.as_mut() {
            active.in_flight = Some(task);
        }
        self.publish();
    }

    fn on_clear_error(&mut self) {
        let Some(active) = self.active.as_mut() else {
            debug!("clear_error with no active request ignored");
            return;
        };
        let cleared = match &mut active.stage {
            TransferStage::Password { error, .. } if error.is_some() => {
                *error = None;
                true
            }
            TransferStage::ConfirmHardware { error, .. } if error.is_some() => {
                *error = None;
                true
            }
            _ => false,
        };
        if cleared {
            self.publish();
        }
    }

    fn on_cancel(&mut self) {
        self.reject_and_close(TransferEvent::Cancel, RejectReason::UserCancelled);
    }

    fn on_password_resolved(
        &mut self,
        id: RequestId,
        attempt: u64,
        outcome: Result<SignedTx, AuthError>,
    ) {
        if !self.completion_is_current(id, attempt, TransferState::Password) {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.in_flight = None;
        }
        match outcome {
            Ok(signed) => self.resolve_approved(TransferEvent::SubmitSucceeded, signed),
            Err(error) => {
                warn!(request = id.0, error = %error, "password authorization failed");
                let Some(t) = self.gate(TransferEvent::SubmitFailed) else {
                    return;
                };
                if let Some(active) = self.active.as_mut() {
                    active.stage = TransferStage::Password {
                        is_loading: false,
                        error: Some(error),
                    };
                }
                self.log_transition(t, id);
                self.publish();
            }
        }
    }

    fn on_hardware_resolved(
        &mut self,
        id: RequestId,
        attempt: u64,
        outcome: Result<SignedTx, HardwareError>,
    ) {
        if !self.completion_is_current(id, attempt, TransferState::ConfirmHardware) {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.in_flight = None;
        }
        match outcome {
            Ok(signed) => self.resolve_approved(TransferEvent::SubmitSucceeded, signed),
            Err(error) => {
                warn!(request = id.0, error = %error, "device authorization failed");
                let Some(t) = self.gate(TransferEvent::SubmitFailed) else {
                    return;
                };
                if let Some(active) = self.active.as_mut() {
                    active.stage = TransferStage::ConfirmHardware {
                        is_loading: false,
                        error: Some(error),
                    };
                }
                self.log_transition(t, id);
                self.publish();
            }
        }
    }

    /// A completion is current only if the request generation, the attempt
    /// counter and the loading stage all still match what it was started
    /// under. Anything else is a leftover of a cancelled, superseded or
    /// abandoned submit.
    fn completion_is_current(&self, id: RequestId, attempt: u64, expected: TransferState) -> bool {
        let current = self.active.as_ref().is_some_and(|a| {
            a.id == id && a.attempt == attempt && a.stage.state() == expected && a.stage.is_loading()
        });
        if !current {
            debug!(request = id.0, attempt, "stale completion discarded");
        }
        current
    }

    fn resolve_approved(&mut self, event: TransferEvent, signed: SignedTx) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.abort_tasks();
        let from = active.stage.state();
        let Some(to) = next_state(from, event) else {
            self.active = Some(active);
            return;
        };
        let tx_hash = signed.tx_hash;
        self.spawn_settle_approved(active.origin_id.clone(), signed);
        self.log_transition(Transition { from, to, event }, active.id);
        info!(request = active.id.0, tx_hash = %tx_hash, "request approved and handed to settlement");
        let _ = self.snapshots.send(active.resolved_snapshot());
    }

    fn reject_and_close(&mut self, event: TransferEvent, reason: RejectReason) {
        let Some(mut active) = self.active.take() else {
            debug!("cancel with no active request ignored");
            return;
        };
        active.abort_tasks();
        let from = active.stage.state();
        let Some(to) = next_state(from, event) else {
            self.active = Some(active);
            return;
        };
        self.spawn_settle_rejected(active.origin_id.clone(), reason);
        self.log_transition(Transition { from, to, event }, active.id);
        info!(request = active.id.0, reason = reason.as_str(), "request rejected");
        let _ = self.snapshots.send(active.resolved_snapshot());
    }

    /// Consults the transition table for the current state. `None` means
    /// the event has no row and the caller must treat it as a no-op.
    fn gate(&self, event: TransferEvent) -> Option<Transition> {
        let from = self.current_state();
        match next_state(from, event) {
            Some(to) => Some(Transition { from, to, event }),
            None => {
                debug!(state = ?from, event = ?event, "event ignored, no transition");
                None
            }
        }
    }

    fn current_state(&self) -> TransferState {
        self.active
            .as_ref()
            .map(|active| active.stage.state())
            .unwrap_or(TransferState::None)
    }

    fn log_transition(&self, t: Transition, id: RequestId) {
        info!(
            request = id.0,
            from = ?t.from,
            to = ?t.to,
            event = ?t.event,
            "transfer state transition"
        );
    }

    fn publish(&self) {
        let snapshot = match self.active.as_ref() {
            Some(active) => active.snapshot(),
            None => ConfirmationRequest::idle(),
        };
        let _ = self.snapshots.send(snapshot);
    }

    fn spawn_connect_watch(&self, id: RequestId) -> JoinHandle<()> {
        let mut connect = self.hardware.connect_state();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            // wait_for checks the current value first, so a device that is
            // already verified advances the flow immediately.
            if connect.wait_for(|state| state.is_ready()).await.is_ok() {
                let _ = events.send(EngineEvent::HardwareReady { id });
            }
        })
    }

    fn spawn_password_verify(
        &self,
        id: RequestId,
        attempt: u64,
        password: String,
        drafts: Vec<TransactionDraft>,
    ) -> JoinHandle<()> {
        let port = Arc::clone(&self.password);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = port.verify_and_sign(&password, &drafts).await;
            let _ = events.send(EngineEvent::PasswordResolved {
                id,
                attempt,
                outcome,
            });
        })
    }

    fn spawn_hardware_sign(
        &self,
        id: RequestId,
        attempt: u64,
        drafts: Vec<TransactionDraft>,
    ) -> JoinHandle<()> {
        let port = Arc::clone(&self.hardware);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = port.sign_on_device(&drafts).await;
            let _ = events.send(EngineEvent::HardwareResolved {
                id,
                attempt,
                outcome,
            });
        })
    }

    fn spawn_settle_approved(&self, origin_id: String, signed: SignedTx) {
        let settlement = Arc::clone(&self.settlement);
        tokio::spawn(async move {
            if let Err(error) = settlement.settle_approved(&origin_id, &signed).await {
                warn!(%origin_id, error = %error, "approve settlement failed");
            }
        });
    }

    fn spawn_settle_rejected(&self, origin_id: String, reason: RejectReason) {
        let settlement = Arc::clone(&self.settlement);
        tokio::spawn(async move {
            if let Err(error) = settlement.settle_rejected(&origin_id, reason).await {
                warn!(%origin_id, error = %error, "reject settlement failed");
            }
        });
    }
}
