use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Server clock for message timestamps. Each call returns a strictly later
/// instant than the previous one, at microsecond resolution.
#[derive(Debug, Default)]
pub struct MessageClock {
    last_micros: Mutex<i64>,
}

impl MessageClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let mut last = self.last_micros.lock().unwrap_or_else(|e| e.into_inner());
        let micros = wall.timestamp_micros().max(*last + 1);
        *last = micros;
        DateTime::from_timestamp_micros(micros).unwrap_or(wall)
    }
}
