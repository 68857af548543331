use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use tokio::sync::{mpsc, watch, Mutex};

use txgate_flow_core::{
    AuthError, ClockPort, ConfirmationEngine, ConfirmationRequest, DappIdentity, FlowHandle,
    HardwareConnectState, HardwareError, HardwarePort, NewRequest, PasswordPort, RejectReason,
    RiskPort, SettlementError, SettlementPort, SignedTx, TimestampMs, TransactionDraft,
    TransferState, ValidationLimits,
};

pub struct TestClock {
    now: AtomicU64,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(1_739_750_400_000),
        }
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> TimestampMs {
        TimestampMs(self.now.fetch_add(1, Ordering::SeqCst))
    }
}

pub struct ScriptedRisk {
    dangerous: bool,
    consultations: Arc<AtomicUsize>,
}

impl RiskPort for ScriptedRisk {
    fn is_dangerous(&self, _drafts: &[TransactionDraft]) -> bool {
        self.consultations.fetch_add(1, Ordering::SeqCst);
        self.dangerous
    }
}

/// Password collaborator fed by a channel: each verify call blocks until
/// the test sends an outcome, so in-flight windows are held open exactly as
/// long as a test needs them.
pub struct ScriptedPassword {
    outcomes: Mutex<mpsc::UnboundedReceiver<Result<SignedTx, AuthError>>>,
    calls: Arc<AtomicUsize>,
}

impl PasswordPort for ScriptedPassword {
    async fn verify_and_sign(
        &self,
        _password: &str,
        _drafts: &[TransactionDraft],
    ) -> Result<SignedTx, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().await;
        match outcomes.recv().await {
            Some(outcome) => outcome,
            None => Err(AuthError::Transport("script exhausted".to_owned())),
        }
    }
}

pub struct ScriptedHardware {
    connect: watch::Receiver<HardwareConnectState>,
    outcomes: Mutex<mpsc::UnboundedReceiver<Result<SignedTx, HardwareError>>>,
    sign_calls: Arc<AtomicUsize>,
}

impl HardwarePort for ScriptedHardware {
    fn connect_state(&self) -> watch::Receiver<HardwareConnectState> {
        self.connect.clone()
    }

    async fn sign_on_device(
        &self,
        _drafts: &[TransactionDraft],
    ) -> Result<SignedTx, HardwareError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().await;
        match outcomes.recv().await {
            Some(outcome) => outcome,
            None => Err(HardwareError::Transport("script exhausted".to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Approved { origin_id: String, tx_hash: B256 },
    Rejected { origin_id: String, reason: RejectReason },
}

pub struct RecordingSettlement {
    settled: Arc<std::sync::Mutex<Vec<Settled>>>,
}

impl SettlementPort for RecordingSettlement {
    async fn settle_approved(
        &self,
        origin_id: &str,
        tx: &SignedTx,
    ) -> Result<(), SettlementError> {
        self.settled
            .lock()
            .expect("settled lock")
            .push(Settled::Approved {
                origin_id: origin_id.to_owned(),
                tx_hash: tx.tx_hash,
            });
        Ok(())
    }

    async fn settle_rejected(
        &self,
        origin_id: &str,
        reason: RejectReason,
    ) -> Result<(), SettlementError> {
        self.settled
            .lock()
            .expect("settled lock")
            .push(Settled::Rejected {
                origin_id: origin_id.to_owned(),
                reason,
            });
        Ok(())
    }
}

pub struct Harness {
    pub handle: FlowHandle,
    pub snapshots: watch::Receiver<ConfirmationRequest>,
    pub password_script: mpsc::UnboundedSender<Result<SignedTx, AuthError>>,
    pub password_calls: Arc<AtomicUsize>,
    pub device: watch::Sender<HardwareConnectState>,
    pub hardware_script: mpsc::UnboundedSender<Result<SignedTx, HardwareError>>,
    pub sign_calls: Arc<AtomicUsize>,
    pub settled: Arc<std::sync::Mutex<Vec<Settled>>>,
    pub risk_consultations: Arc<AtomicUsize>,
}

/// Builds an engine on scripted ports and spawns its run loop onto the
/// current test runtime.
pub fn spawn_engine(dangerous: bool) -> Harness {
    let risk_consultations = Arc::new(AtomicUsize::new(0));
    let risk = ScriptedRisk {
        dangerous,
        consultations: Arc::clone(&risk_consultations),
    };

    let (password_script, password_rx) = mpsc::unbounded_channel();
    let password_calls = Arc::new(AtomicUsize::new(0));
    let password = ScriptedPassword {
        outcomes: Mutex::new(password_rx),
        calls: Arc::clone(&password_calls),
    };

    let (device, connect_rx) = watch::channel(HardwareConnectState::Disconnected);
    let (hardware_script, sign_rx) = mpsc::unbounded_channel();
    let sign_calls = Arc::new(AtomicUsize::new(0));
    let hardware = ScriptedHardware {
        connect: connect_rx,
        outcomes: Mutex::new(sign_rx),
        sign_calls: Arc::clone(&sign_calls),
    };

    let settled = Arc::new(std::sync::Mutex::new(Vec::new()));
    let settlement = RecordingSettlement {
        settled: Arc::clone(&settled),
    };

    let (engine, handle, snapshots) = ConfirmationEngine::new(
        risk,
        password,
        hardware,
        settlement,
        TestClock::new(),
        ValidationLimits::default(),
    );
    tokio::spawn(engine.run());

    Harness {
        handle,
        snapshots,
        password_script,
        password_calls,
        device,
        hardware_script,
        sign_calls,
        settled,
        risk_consultations,
    }
}

pub async fn wait_snapshot<F>(
    rx: &mut watch::Receiver<ConfirmationRequest>,
    pred: F,
) -> ConfirmationRequest
where
    F: FnMut(&ConfirmationRequest) -> bool,
{
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("engine dropped");
    snapshot.clone()
}

pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConfirmationRequest>,
    want: TransferState,
) -> ConfirmationRequest {
    wait_snapshot(rx, move |snapshot| snapshot.state() == want).await
}

/// Settlement lands from a fire-and-forget task; poll until it shows up.
pub async fn wait_settled(settled: &Arc<std::sync::Mutex<Vec<Settled>>>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if settled.lock().expect("settled lock").len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for settlement");
}

pub fn draft(value: u64) -> TransactionDraft {
    TransactionDraft {
        to: Address::repeat_byte(0x21),
        value: U256::from(value),
        data: Bytes::new(),
    }
}

pub fn dapp(name: &str) -> DappIdentity {
    DappIdentity {
        name: name.to_owned(),
        url: format!("https://{}.example", name.to_lowercase()),
        icon_url: None,
    }
}

pub fn request(origin_id: &str, transactions: Vec<TransactionDraft>) -> NewRequest {
    NewRequest {
        origin_id: origin_id.to_owned(),
        dapp: Some(dapp("Dexy")),
        transactions,
    }
}

/// A request that opened before its connection metadata finished loading.
pub fn skeleton_request(origin_id: &str) -> NewRequest {
    NewRequest {
        origin_id: origin_id.to_owned(),
        dapp: None,
        transactions: Vec::new(),
    }
}

pub fn signed(tag: u8) -> SignedTx {
    SignedTx {
        tx_hash: B256::repeat_byte(tag),
        raw: Bytes::from(vec![tag; 4]),
    }
}
