use std::time::{SystemTime, UNIX_EPOCH};

use txgate_flow_core::{ClockPort, TimestampMs};

#[derive(Debug, Clone, Default)]
pub struct SystemClockAdapter;

impl ClockPort for SystemClockAdapter {
    fn now_ms(&self) -> TimestampMs {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        TimestampMs(elapsed.as_millis() as u64)
    }
}
