//! Concrete collaborators for the confirmation workflow engine: system
//! clock, payload risk heuristics, the vault-backed password authorizer, a
//! scripted hardware device session and the settlement service client.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod hardware;
pub mod password;
pub mod risk;
pub mod settlement;

pub use clock::SystemClockAdapter;
pub use config::FlowAdapterConfig;
pub use hardware::HardwareDeviceAdapter;
pub use password::VaultPasswordAdapter;
pub use risk::PayloadRiskAdapter;
pub use settlement::{SettlementOutcome, SettlementRecord, SettlementServiceAdapter};
