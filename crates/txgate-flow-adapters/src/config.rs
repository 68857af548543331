use alloy::primitives::U256;
use semver::Version;

#[derive(Debug, Clone)]
pub struct FlowAdapterConfig {
    pub settlement_base_url: String,
    pub settlement_timeout_ms: u64,
    pub device_connect_step_ms: u64,
    pub device_sign_delay_ms: u64,
    pub device_sign_timeout_ms: u64,
    pub min_device_app_version: Version,
    pub max_password_failures: usize,
    pub password_failure_window_ms: u64,
    pub danger_value_threshold_wei: U256,
}

impl Default for FlowAdapterConfig {
    fn default() -> Self {
        Self {
            settlement_base_url: "http://127.0.0.1:8787".to_owned(),
            settlement_timeout_ms: 15_000,
            device_connect_step_ms: 250,
            device_sign_delay_ms: 0,
            device_sign_timeout_ms: 60_000,
            min_device_app_version: Version::new(2, 1, 0),
            max_password_failures: 5,
            password_failure_window_ms: 60_000,
            // 1 ether
            danger_value_threshold_wei: U256::from(10).pow(U256::from(18)),
        }
    }
}

impl FlowAdapterConfig {
    /// Defaults with `TXGATE_`-prefixed environment overrides applied.
    ///
    /// Only the deployment-facing knobs are overridable: settlement
    /// endpoint and timeout, device sign timeout, and the minimum device
    /// app version. The scripting timings, password-failure knobs and the
    /// risk threshold are wiring decisions made by the embedding host.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TXGATE_SETTLEMENT_URL") {
            if !url.is_empty() {
                config.settlement_base_url = url;
            }
        }
        if let Some(ms) = env_u64("TXGATE_SETTLEMENT_TIMEOUT_MS") {
            config.settlement_timeout_ms = ms;
        }
        if let Some(ms) = env_u64("TXGATE_DEVICE_SIGN_TIMEOUT_MS") {
            config.device_sign_timeout_ms = ms;
        }
        if let Ok(raw) = std::env::var("TXGATE_MIN_DEVICE_APP_VERSION") {
            if let Ok(version) = Version::parse(&raw) {
                config.min_device_app_version = version;
            }
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}
