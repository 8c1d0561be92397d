use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Weekday indices, 0 = Sunday through 6 = Saturday. Empty means one-shot.
pub type DaySet = BTreeSet<u8>;

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub days: DaySet,
    /// Local date before which the alarm never fires.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Local date of the most recent firing; guards against a second firing
    /// on the same day.
    #[serde(default)]
    pub last_fired_date: Option<NaiveDate>,
}

impl Alarm {
    pub fn is_one_shot(&self) -> bool {
        self.days.is_empty()
    }

    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    /// Whether this alarm should fire at local time `now`.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        let today = now.date();

        self.enabled
            && u32::from(self.hour) == now.hour()
            && u32::from(self.minute) == now.minute()
            && self.last_fired_date != Some(today)
            && self.start_date.map_or(true, |start| today >= start)
            && (self.days.is_empty() || self.days.contains(&weekday_index(today)))
    }

    /// Record a firing on `today`; one-shot alarms disable themselves.
    pub fn mark_fired(&mut self, today: NaiveDate) {
        self.last_fired_date = Some(today);
        if self.is_one_shot() {
            self.enabled = false;
        }
    }
}

/// Sunday-based weekday index of a date.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Fields supplied when creating an alarm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewAlarm {
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub days: DaySet,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

impl NewAlarm {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self {
            hour,
            minute,
            ..Self::default()
        }
    }

    pub fn with_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn starting(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_time(self.hour, self.minute)?;
        validate_days(&self.days)
    }
}

/// Partial edit of an existing alarm. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmPatch {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub days: Option<DaySet>,
    /// `Some(None)` clears the start date; `null` in JSON.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<NaiveDate>>,
    pub enabled: Option<bool>,
}

/// Maps a present field, `null` included, to `Some`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl AlarmPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply onto `alarm`, validating the merged result first so a rejected
    /// patch leaves the alarm unchanged.
    pub fn apply_to(&self, alarm: &mut Alarm) -> Result<()> {
        let hour = self.hour.unwrap_or(alarm.hour);
        let minute = self.minute.unwrap_or(alarm.minute);
        validate_time(hour, minute)?;
        if let Some(days) = &self.days {
            validate_days(days)?;
        }

        alarm.hour = hour;
        alarm.minute = minute;
        if let Some(days) = &self.days {
            alarm.days = days.clone();
        }
        if let Some(start_date) = self.start_date {
            alarm.start_date = start_date;
        }
        if let Some(enabled) = self.enabled {
            alarm.enabled = enabled;
        }
        Ok(())
    }
}

fn validate_time(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 {
        bail!("hour {hour} is out of range 0-23");
    }
    if minute > 59 {
        bail!("minute {minute} is out of range 0-59");
    }
    Ok(())
}

fn validate_days(days: &DaySet) -> Result<()> {
    if let Some(day) = days.iter().find(|day| **day > 6) {
        bail!("weekday index {day} is out of range 0-6");
    }
    Ok(())
}
