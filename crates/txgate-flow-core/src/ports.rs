use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::{HardwareConnectState, SignedTx, TimestampMs, TransactionDraft};

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("too many attempts, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("password service unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareError {
    #[error("device disconnected")]
    Disconnected,
    #[error("signing app not open on device")]
    AppNotOpen,
    #[error("rejected on device")]
    RejectedOnDevice,
    #[error("device timed out")]
    Timeout,
    #[error("device transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementError {
    #[error("request already settled")]
    AlreadySettled,
    #[error("settlement transport error: {0}")]
    Transport(String),
}

/// Why a request was resolved negatively towards the dapp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    UserCancelled,
    InvalidPayload,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::UserCancelled => "user_cancelled",
            RejectReason::InvalidPayload => "invalid_payload",
        }
    }
}

/// Pure risk assessment over the pending bundle, consulted once when the
/// user picks the hardware path.
pub trait RiskPort {
    fn is_dangerous(&self, drafts: &[TransactionDraft]) -> bool;
}

/// Password-side authorization. Dropping the returned future is the
/// cancellation request.
pub trait PasswordPort {
    fn verify_and_sign(
        &self,
        password: &str,
        drafts: &[TransactionDraft],
    ) -> impl Future<Output = Result<SignedTx, AuthError>> + Send;
}

/// Hardware-device authorization. The connect state is owned by the device
/// transport; the engine only observes it.
pub trait HardwarePort {
    fn connect_state(&self) -> watch::Receiver<HardwareConnectState>;

    fn sign_on_device(
        &self,
        drafts: &[TransactionDraft],
    ) -> impl Future<Output = Result<SignedTx, HardwareError>> + Send;
}

/// Resolves the external request exactly once: broadcast on approval,
/// answer with a rejection on cancel.
pub trait SettlementPort {
    fn settle_approved(
        &self,
        origin_id: &str,
        tx: &SignedTx,
    ) -> impl Future<Output = Result<(), SettlementError>> + Send;

    fn settle_rejected(
        &self,
        origin_id: &str,
        reason: RejectReason,
    ) -> impl Future<Output = Result<(), SettlementError>> + Send;
}

pub trait ClockPort {
    fn now_ms(&self) -> TimestampMs;
}
