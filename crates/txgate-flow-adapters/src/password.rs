use std::sync::Mutex;

use alloy::primitives::Bytes;
use tokio::task;
use tracing::{debug, warn};

use txgate_flow_core::{AuthError, ClockPort, PasswordPort, SignedTx, TransactionDraft};

use crate::clock::SystemClockAdapter;
use crate::config::FlowAdapterConfig;
use crate::crypto::{self, CryptoError, SealedSecret};

/// Password collaborator backed by a sealed vault: every attempt re-derives
/// the key and unseals the signing secret, so a wrong password surfaces as
/// an AEAD authentication failure. Repeated failures trip a sliding-window
/// rate limiter.
pub struct VaultPasswordAdapter {
    vault: SealedSecret,
    failures: Mutex<Vec<u64>>,
    max_failures: usize,
    failure_window_ms: u64,
    clock: SystemClockAdapter,
}

impl VaultPasswordAdapter {
    /// Seals `signing_secret` under `password` and returns an adapter
    /// serving that vault.
    pub fn provision(
        password: &str,
        signing_secret: &[u8],
        config: &FlowAdapterConfig,
    ) -> Result<Self, CryptoError> {
        let vault = crypto::seal_secret(password.as_bytes(), signing_secret)?;
        Ok(Self {
            vault,
            failures: Mutex::new(Vec::new()),
            max_failures: config.max_password_failures,
            failure_window_ms: config.password_failure_window_ms,
            clock: SystemClockAdapter,
        })
    }

    fn check_rate_limit(&self) -> Result<(), AuthError> {
        let now = self.clock.now_ms().0;
        let cutoff = now.saturating_sub(self.failure_window_ms);
        let mut failures = self
            .failures
            .lock()
            .map_err(|e| AuthError::Transport(format!("rate limit lock poisoned: {e}")))?;
        failures.retain(|at| *at >= cutoff);
        if failures.len() >= self.max_failures {
            let oldest = failures.first().copied().unwrap_or(now);
            let retry_after_ms = (oldest + self.failure_window_ms).saturating_sub(now);
            warn!(retry_after_ms, "password attempts rate limited");
            return Err(AuthError::RateLimited { retry_after_ms });
        }
        Ok(())
    }

    fn record_failure(&self) {
        let now = self.clock.now_ms().0;
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(now);
        }
    }

    fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }
}

impl PasswordPort for VaultPasswordAdapter {
    async fn verify_and_sign(
        &self,
        password: &str,
        drafts: &[TransactionDraft],
    ) -> Result<SignedTx, AuthError> {
        self.check_rate_limit()?;

        let vault = self.vault.clone();
        let password = password.to_owned();
        let digest = crypto::bundle_digest(drafts);

        // The KDF is deliberately slow; keep it off the async threads.
        let unsealed =
            task::spawn_blocking(move || crypto::open_secret(password.as_bytes(), &vault))
                .await
                .map_err(|e| AuthError::Transport(format!("kdf task failed: {e}")))?;

        let secret = match unsealed {
            Ok(secret) => secret,
            Err(CryptoError::Unseal) => {
                debug!("vault unseal failed, recording password failure");
                self.record_failure();
                return Err(AuthError::InvalidPassword);
            }
            Err(error) => return Err(AuthError::Transport(error.to_string())),
        };

        let tag = crypto::authorization_tag(&secret, digest)
            .map_err(|error| AuthError::Transport(error.to_string()))?;
        self.clear_failures();
        Ok(SignedTx {
            tx_hash: digest,
            raw: Bytes::from(tag.to_vec()),
        })
    }
}
