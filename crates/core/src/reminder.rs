//! Daily reminder scheduling.
//!
//! The schedule fires once per day at a configured wall-clock time. Callers ask
//! for the next fire instant and sleep until it; evaluation is still gated on a
//! short window after the configured minute so a late wake-up does not fire a
//! stale reminder.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use thiserror::Error;

use crate::domain::{ChannelId, UserId};
use crate::tracker::ActivityTracker;

pub const REMINDER_WINDOW_MINUTES: u32 = 5;
/// Upper bound for the overdue threshold (one hundred years).
pub const MAX_FREQUENCY_HOURS: u64 = 876_000;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid reminder time `{0}` (expected HH:MM in 24h format)")]
pub struct ReminderTimeError(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReminderTime {
    hour: u32,
    minute: u32,
}

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl FromStr for ReminderTime {
    type Err = ReminderTimeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ReminderTimeError(value.to_owned());
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.trim().parse::<u32>().map_err(|_| invalid())?;
        let minute = minute.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// One overdue user/channel record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reminder {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub project_name: String,
    pub hours_since_check_in: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReminderSchedule {
    pub time: ReminderTime,
    /// A record is overdue once its last check-in is older than this.
    pub frequency: Duration,
}

impl ReminderSchedule {
    pub fn new(time: ReminderTime, frequency_hours: u64) -> Self {
        let hours = frequency_hours.min(MAX_FREQUENCY_HOURS) as i64;
        Self { time, frequency: Duration::hours(hours) }
    }

    /// True when `local` falls in `[HH:MM, HH:MM + 5min)` of the same hour.
    pub fn in_window(&self, local: NaiveDateTime) -> bool {
        local.hour() == self.time.hour
            && local.minute() >= self.time.minute
            && local.minute() < self.time.minute + REMINDER_WINDOW_MINUTES
    }

    /// The next wall-clock instant at which reminders should be evaluated.
    ///
    /// Returns `local` itself when it is inside today's window and nothing fired
    /// today yet; otherwise today's or tomorrow's configured time.
    pub fn next_fire_after(
        &self,
        local: NaiveDateTime,
        last_fired: Option<NaiveDate>,
    ) -> NaiveDateTime {
        let today = local.date();
        let today_at = today.and_time(self.time.as_naive_time());
        let fired_today = last_fired == Some(today);

        if !fired_today {
            if local < today_at {
                return today_at;
            }
            if self.in_window(local) {
                return local;
            }
        }

        today
            .checked_add_days(Days::new(1))
            .map(|tomorrow| tomorrow.and_time(self.time.as_naive_time()))
            .unwrap_or(today_at)
    }

    /// Overdue records at `now`, or nothing when `now` is outside the window.
    pub fn due<Tz: TimeZone>(
        &self,
        tracker: &ActivityTracker,
        now: &DateTime<Tz>,
    ) -> Vec<Reminder> {
        if !self.in_window(now.naive_local()) {
            return Vec::new();
        }
        tracker.overdue_at(now.with_timezone(&Utc), self.frequency)
    }
}
