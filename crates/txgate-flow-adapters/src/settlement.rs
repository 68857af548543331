use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::B256;
use base64::Engine as _;
use serde::Serialize;
use tracing::info;

use txgate_flow_core::{RejectReason, SettlementError, SettlementPort, SignedTx};

use crate::config::FlowAdapterConfig;

/// What a request was resolved as, recorded for the in-memory mode and for
/// the exactly-once guard in both modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Approved { tx_hash: B256 },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub origin_id: String,
    pub outcome: SettlementOutcome,
}

#[derive(Clone)]
enum SettlementMode {
    InMemory,
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

/// Resolves external requests either in memory (tests, reference host) or
/// against an HTTP settlement service. A request id is settled at most
/// once; a second attempt is refused before any transport work.
#[derive(Clone)]
pub struct SettlementServiceAdapter {
    mode: SettlementMode,
    inner: Arc<Mutex<SettlementState>>,
}

#[derive(Default)]
struct SettlementState {
    settled_ids: HashSet<String>,
    records: Vec<SettlementRecord>,
}

#[derive(Serialize)]
struct ApproveBody<'a> {
    tx_hash: B256,
    raw_base64: &'a str,
}

#[derive(Serialize)]
struct RejectBody<'a> {
    reason: &'a str,
}

impl SettlementServiceAdapter {
    pub fn in_memory() -> Self {
        Self {
            mode: SettlementMode::InMemory,
            inner: Arc::new(Mutex::new(SettlementState::default())),
        }
    }

    pub fn http(config: &FlowAdapterConfig) -> Result<Self, SettlementError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.settlement_timeout_ms))
            .build()
            .map_err(|e| SettlementError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self {
            mode: SettlementMode::Http {
                base_url: config.settlement_base_url.trim_end_matches('/').to_owned(),
                client,
            },
            inner: Arc::new(Mutex::new(SettlementState::default())),
        })
    }

    /// Everything settled so far, in order.
    pub fn records(&self) -> Vec<SettlementRecord> {
        self.inner
            .lock()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    fn claim(&self, origin_id: &str, outcome: SettlementOutcome) -> Result<(), SettlementError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|e| SettlementError::Transport(format!("settlement lock poisoned: {e}")))?;
        if !state.settled_ids.insert(origin_id.to_owned()) {
            return Err(SettlementError::AlreadySettled);
        }
        state.records.push(SettlementRecord {
            origin_id: origin_id.to_owned(),
            outcome,
        });
        Ok(())
    }

    async fn post<B: Serialize>(
        client: &reqwest::Client,
        url: String,
        body: &B,
    ) -> Result<(), SettlementError> {
        client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(format!("POST {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| SettlementError::Transport(format!("POST {url} rejected: {e}")))?;
        Ok(())
    }
}

impl SettlementPort for SettlementServiceAdapter {
    async fn settle_approved(&self, origin_id: &str, tx: &SignedTx) -> Result<(), SettlementError> {
        self.claim(
            origin_id,
            SettlementOutcome::Approved {
                tx_hash: tx.tx_hash,
            },
        )?;
        info!(%origin_id, tx_hash = %tx.tx_hash, "settling request as approved");
        if let SettlementMode::Http { base_url, client } = &self.mode {
            let raw = base64::engine::general_purpose::STANDARD.encode(&tx.raw);
            let url = format!("{base_url}/v1/requests/{origin_id}/approve");
            Self::post(
                client,
                url,
                &ApproveBody {
                    tx_hash: tx.tx_hash,
                    raw_base64: &raw,
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn settle_rejected(
        &self,
        origin_id: &str,
        reason: RejectReason,
    ) -> Result<(), SettlementError> {
        self.claim(origin_id, SettlementOutcome::Rejected { reason })?;
        info!(%origin_id, reason = reason.as_str(), "settling request as rejected");
        if let SettlementMode::Http { base_url, client } = &self.mode {
            let url = format!("{base_url}/v1/requests/{origin_id}/reject");
            Self::post(
                client,
                url,
                &RejectBody {
                    reason: reason.as_str(),
                },
            )
            .await?;
        }
        Ok(())
    }
}
