use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use semver::Version;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use txgate_flow_core::{
    HardwareConnectState, HardwareError, HardwarePort, SignedTx, TransactionDraft,
};

/// Deterministic hardware device session. A scripted connect sequence
/// drives the connect-state observable, queued outcomes serve successive
/// sign attempts, and the configured timeout bounds each attempt.
#[derive(Clone)]
pub struct HardwareDeviceAdapter {
    connect: Arc<watch::Sender<HardwareConnectState>>,
    inner: Arc<Mutex<DeviceInner>>,
    connect_step: Duration,
    sign_delay: Duration,
    sign_timeout: Duration,
    min_app_version: Version,
}

struct DeviceInner {
    app_version: Option<Version>,
    sign_outcomes: VecDeque<Result<SignedTx, HardwareError>>,
}

impl HardwareDeviceAdapter {
    pub fn new(config: &crate::FlowAdapterConfig) -> Self {
        let (connect, _) = watch::channel(HardwareConnectState::Disconnected);
        Self {
            connect: Arc::new(connect),
            inner: Arc::new(Mutex::new(DeviceInner {
                app_version: None,
                sign_outcomes: VecDeque::new(),
            })),
            connect_step: Duration::from_millis(config.device_connect_step_ms),
            sign_delay: Duration::from_millis(config.device_sign_delay_ms),
            sign_timeout: Duration::from_millis(config.device_sign_timeout_ms),
            min_app_version: config.min_device_app_version.clone(),
        }
    }

    /// The signing app version the plugged-in device reports. Absent until
    /// set; an absent or outdated app pins the session at `AppNotOpen`.
    pub fn set_app_version(&self, version: Version) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.app_version = Some(version);
        }
    }

    /// Queues the outcome served to the next sign attempt.
    pub fn push_sign_outcome(&self, outcome: Result<SignedTx, HardwareError>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sign_outcomes.push_back(outcome);
        }
    }

    /// Walks the session through the connect sequence, one step per
    /// configured interval: Connecting, Connected, then Confirmed once the
    /// app gate passes or AppNotOpen when it does not.
    pub fn begin_connect(&self) -> JoinHandle<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            adapter.publish(HardwareConnectState::Connecting);
            tokio::time::sleep(adapter.connect_step).await;
            adapter.publish(HardwareConnectState::Connected);
            tokio::time::sleep(adapter.connect_step).await;
            if adapter.app_gate_passes() {
                adapter.publish(HardwareConnectState::Confirmed);
            } else {
                adapter.publish(HardwareConnectState::AppNotOpen);
            }
        })
    }

    pub fn disconnect(&self) {
        self.publish(HardwareConnectState::Disconnected);
    }

    fn app_gate_passes(&self) -> bool {
        let reported = self
            .inner
            .lock()
            .ok()
            .and_then(|inner| inner.app_version.clone());
        match reported {
            Some(version) if version >= self.min_app_version => true,
            Some(version) => {
                info!(%version, min = %self.min_app_version, "device signing app too old");
                false
            }
            None => {
                info!("device reports no signing app");
                false
            }
        }
    }

    fn publish(&self, state: HardwareConnectState) {
        debug!(?state, "device connect state");
        let _ = self.connect.send(state);
    }

    fn next_outcome(&self) -> Result<SignedTx, HardwareError> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut inner| inner.sign_outcomes.pop_front())
            .unwrap_or_else(|| Err(HardwareError::Transport("sign script exhausted".to_owned())))
    }
}

impl HardwarePort for HardwareDeviceAdapter {
    fn connect_state(&self) -> watch::Receiver<HardwareConnectState> {
        self.connect.subscribe()
    }

    async fn sign_on_device(
        &self,
        _drafts: &[TransactionDraft],
    ) -> Result<SignedTx, HardwareError> {
        let outcome = self.next_outcome();
        let delay = self.sign_delay;
        let attempt = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        };
        if self.sign_timeout.is_zero() {
            return attempt.await;
        }
        match tokio::time::timeout(self.sign_timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HardwareError::Timeout),
        }
    }
}
