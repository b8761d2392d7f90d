// ===============================
// src/clock.rs (simulated clock)
// ===============================
//
// Waktu simulasi hanya maju lewat `set`, tidak pernah lewat wall time.
//
use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq)]
pub enum ClockError {
    #[error("clock can not move back from {now} to {date}")]
    Backward { now: DateTime<Utc>, date: DateTime<Utc> },
    #[error("invalid alarm time {hour:02}:{minute:02}:{second:02}")]
    InvalidTime { hour: u32, minute: u32, second: u32 },
}

#[derive(Debug)]
struct DailyAlarm {
    next: DateTime<Utc>,
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
}

/// Clock whose time is set from the tick stream.
#[derive(Debug)]
pub struct Simulator {
    now: DateTime<Utc>,
    alarms: Vec<DailyAlarm>,
}

impl Simulator {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: start, alarms: Vec::new() }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Moves the clock to `date` and fires every alarm boundary up to and
    /// including it. Moving backwards is a data-integrity fault.
    pub fn set(&mut self, date: DateTime<Utc>) -> Result<(), ClockError> {
        if date < self.now {
            return Err(ClockError::Backward { now: self.now, date });
        }
        self.now = date;
        self.fire_due();
        Ok(())
    }

    /// One event per simulated day at `hour:minute:second` UTC. The first
    /// boundary is the first one at or after `now`.
    pub fn every_day(
        &mut self,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<mpsc::UnboundedReceiver<DateTime<Utc>>, ClockError> {
        let naive = self
            .now
            .date_naive()
            .and_hms_opt(hour, minute, second)
            .ok_or(ClockError::InvalidTime { hour, minute, second })?;
        let mut next = Utc.from_utc_datetime(&naive);
        if next < self.now {
            next += Duration::days(1);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.alarms.push(DailyAlarm { next, tx });
        self.fire_due();
        Ok(rx)
    }

    fn fire_due(&mut self) {
        let now = self.now;
        self.alarms.retain_mut(|alarm| {
            while alarm.next <= now {
                if alarm.tx.send(alarm.next).is_err() {
                    return false;
                }
                alarm.next += Duration::days(1);
            }
            true
        });
    }
}
