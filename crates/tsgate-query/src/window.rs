//! Half-open query time windows.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tsgate_core::{Error, Result};

/// `[start, stop)` in UTC. Always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Result<Self> {
        if stop <= start {
            return Err(Error::validation(format!(
                "time window is empty or inverted: start {} is not before stop {}",
                start, stop
            )));
        }
        Ok(Self { start, stop })
    }

    /// The window ending now and reaching `length` into the past.
    pub fn trailing(length: Duration) -> Result<Self> {
        Self::trailing_from(Utc::now(), length)
    }

    pub fn trailing_from(stop: DateTime<Utc>, length: Duration) -> Result<Self> {
        let length = chrono::Duration::from_std(length)
            .map_err(|_| Error::validation("time window length is out of range"))?;
        let start = stop
            .checked_sub_signed(length)
            .ok_or_else(|| Error::validation("time window start is out of range"))?;
        Self::new(start, stop)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    /// Bounds as RFC 3339 strings, the form bound into `time(v: ...)`.
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn stop_rfc3339(&self) -> String {
        self.stop.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rejects_empty_and_inverted() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(TimeWindow::new(t, t).is_err());
        assert!(TimeWindow::new(t, t - chrono::Duration::seconds(1)).is_err());
        assert!(TimeWindow::trailing(Duration::ZERO).is_err());
    }

    #[test]
    fn test_trailing_window() {
        let stop = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let w = TimeWindow::trailing_from(stop, Duration::from_secs(3600)).unwrap();
        assert_eq!(w.start_rfc3339(), "2024-01-01T00:00:00Z");
        assert_eq!(w.stop_rfc3339(), "2024-01-01T01:00:00Z");
    }
}
