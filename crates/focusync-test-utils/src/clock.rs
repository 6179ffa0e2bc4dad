use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use focusync_protocol::Clock;
use parking_lot::Mutex;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock starting at 2026-03-01 09:00 UTC.
    pub fn fixed() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .unwrap_or_default();
        Self::new(start)
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock() += delta;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
