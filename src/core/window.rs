//! Daily voting window derived purely from the clock.

use crate::utils::error::{LunchError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSchedule {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub auto_close_at: NaiveTime,
    pub offset: FixedOffset,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl Default for WindowSchedule {
    fn default() -> Self {
        Self {
            opens_at: hm(9, 0),
            closes_at: hm(12, 0),
            auto_close_at: hm(13, 0),
            offset: FixedOffset::east_opt(9 * 3600).unwrap_or(Utc.fix()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    NotYetOpen { opens_at: DateTime<Utc> },
    Open { remaining: Duration },
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VotingWindow {
    schedule: WindowSchedule,
}

impl VotingWindow {
    pub fn new(schedule: WindowSchedule) -> Self {
        Self { schedule }
    }

    /// Calendar day of `now` in the group's local offset.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.schedule.offset).date_naive()
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.schedule.offset).time()
    }

    /// UTC instant of a local wall-clock time on `date`.
    pub fn at_local(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        (local - Duration::seconds(i64::from(self.schedule.offset.local_minus_utc()))).and_utc()
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let time = self.local_time(now);
        self.schedule.opens_at <= time && time < self.schedule.closes_at
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_open(now) {
            return None;
        }
        let closes = self.at_local(self.local_date(now), self.schedule.closes_at);
        Some(closes - now)
    }

    pub fn next_transition(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(now);
        let time = self.local_time(now);
        if time < self.schedule.opens_at {
            self.at_local(date, self.schedule.opens_at)
        } else if time < self.schedule.closes_at {
            self.at_local(date, self.schedule.closes_at)
        } else {
            self.at_local(date + Duration::days(1), self.schedule.opens_at)
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> WindowStatus {
        let time = self.local_time(now);
        if time < self.schedule.opens_at {
            WindowStatus::NotYetOpen {
                opens_at: self.at_local(self.local_date(now), self.schedule.opens_at),
            }
        } else if let Some(remaining) = self.time_remaining(now) {
            WindowStatus::Open { remaining }
        } else {
            WindowStatus::Closed
        }
    }

    /// Whether today's auto-close cutoff has been reached.
    pub fn is_past_cutoff(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.schedule.auto_close_at
    }

    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status(now) {
            WindowStatus::Open { .. } => Ok(()),
            WindowStatus::NotYetOpen { .. } => Err(LunchError::WindowClosed {
                message: format!("opens at {}", self.schedule.opens_at.format("%H:%M")),
            }),
            WindowStatus::Closed => Err(LunchError::WindowClosed {
                message: format!("closed since {}", self.schedule.closes_at.format("%H:%M")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Default schedule runs at +09:00, so 00:00 UTC is 09:00 local.
    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_open_between_nine_and_noon() {
        let window = VotingWindow::default();
        assert!(!window.is_open(Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 0).unwrap()));
        assert!(window.is_open(utc(0, 0)));
        assert!(window.is_open(utc(2, 59)));
        assert!(!window.is_open(utc(3, 0)));
    }

    #[test]
    fn test_time_remaining() {
        let window = VotingWindow::default();
        assert_eq!(window.time_remaining(utc(0, 5)), Some(Duration::minutes(175)));
        assert_eq!(window.time_remaining(utc(3, 1)), None);
    }

    #[test]
    fn test_status_before_open_reports_opening_time() {
        let window = VotingWindow::default();
        let early = Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap();
        assert_eq!(
            window.status(early),
            WindowStatus::NotYetOpen { opens_at: utc(0, 0) }
        );
        let err = window.ensure_open(early).unwrap_err();
        assert!(err.to_string().contains("opens at 09:00"));
    }

    #[test]
    fn test_status_after_noon_is_closed() {
        let window = VotingWindow::default();
        assert_eq!(window.status(utc(3, 1)), WindowStatus::Closed);
        assert!(matches!(
            window.ensure_open(utc(3, 1)),
            Err(LunchError::WindowClosed { .. })
        ));
    }

    #[test]
    fn test_next_transition() {
        let window = VotingWindow::default();
        let early = Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap();
        assert_eq!(window.next_transition(early), utc(0, 0));
        assert_eq!(window.next_transition(utc(1, 0)), utc(3, 0));
        assert_eq!(
            window.next_transition(utc(5, 0)),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_local_date_uses_offset() {
        let window = VotingWindow::default();
        let late_utc = Utc.with_ymd_and_hms(2024, 4, 30, 20, 0, 0).unwrap();
        assert_eq!(window.local_date(late_utc), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_cutoff() {
        let window = VotingWindow::default();
        assert!(!window.is_past_cutoff(utc(3, 59)));
        assert!(window.is_past_cutoff(utc(4, 0)));
    }
}
