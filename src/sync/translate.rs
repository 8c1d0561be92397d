//! Local alarm time to UTC, for a remote matcher that only knows UTC.
//!
//! Offsets use the browser convention: minutes to *add* to local time to get
//! UTC, so UTC+3 is `-180` and UTC-5 is `300`.

use chrono::{Local, NaiveDate, Offset};
use serde::{Deserialize, Serialize};

use crate::alarms::{Alarm, DaySet};

const MINUTES_PER_DAY: i32 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UtcAlarmView {
    pub id: String,
    pub utc_hour: u8,
    pub utc_minute: u8,
    /// Forwarded from the local alarm as-is. When the UTC shift crosses
    /// midnight these no longer name the weekday of the UTC instant.
    pub days: DaySet,
    pub enabled: bool,
    pub start_date: Option<NaiveDate>,
}

/// Shift a local time of day by `offset_minutes`, wrapping within one day.
pub fn to_utc(hour: u8, minute: u8, offset_minutes: i32) -> (u8, u8) {
    let total = (i32::from(hour) * 60 + i32::from(minute) + offset_minutes)
        .rem_euclid(MINUTES_PER_DAY);
    ((total / 60) as u8, (total % 60) as u8)
}

/// The host's current offset in the convention above.
///
/// Read fresh on every sync; DST can change it between edits.
pub fn current_offset_minutes() -> i32 {
    -Local::now().offset().fix().local_minus_utc() / 60
}

pub fn utc_view(alarm: &Alarm, offset_minutes: i32) -> UtcAlarmView {
    let (utc_hour, utc_minute) = to_utc(alarm.hour, alarm.minute, offset_minutes);
    UtcAlarmView {
        id: alarm.id.clone(),
        utc_hour,
        utc_minute,
        days: alarm.days.clone(),
        enabled: alarm.enabled,
        start_date: alarm.start_date,
    }
}

pub fn utc_views(alarms: &[Alarm], offset_minutes: i32) -> Vec<UtcAlarmView> {
    alarms
        .iter()
        .map(|alarm| utc_view(alarm, offset_minutes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(hour: u8, minute: u8, days: &[u8]) -> Alarm {
        Alarm {
            id: "a".into(),
            hour,
            minute,
            days: days.iter().copied().collect(),
            start_date: None,
            enabled: true,
            last_fired_date: None,
        }
    }

    #[test]
    fn east_of_utc_moves_earlier() {
        assert_eq!(to_utc(7, 0, -180), (4, 0));
    }

    #[test]
    fn west_of_utc_moves_later() {
        assert_eq!(to_utc(0, 30, 300), (5, 30));
    }

    #[test]
    fn wraps_in_both_directions() {
        assert_eq!(to_utc(1, 15, -180), (22, 15));
        assert_eq!(to_utc(22, 0, 300), (3, 0));
        assert_eq!(to_utc(0, 0, 0), (0, 0));
        assert_eq!(to_utc(23, 59, 1), (0, 0));
    }

    #[test]
    fn half_hour_offsets() {
        // UTC+5:30
        assert_eq!(to_utc(6, 0, -330), (0, 30));
    }

    #[test]
    fn offset_matches_local_clock() {
        let offset = current_offset_minutes();
        assert!((-14 * 60..=12 * 60).contains(&offset));
    }

    #[test]
    fn view_carries_identity_and_flags() {
        let mut a = alarm(7, 0, &[1, 2]);
        a.enabled = false;
        a.start_date = NaiveDate::from_ymd_opt(2026, 11, 1);

        let view = utc_view(&a, -180);
        assert_eq!(view.id, "a");
        assert_eq!((view.utc_hour, view.utc_minute), (4, 0));
        assert!(!view.enabled);
        assert_eq!(view.start_date, a.start_date);
    }

    #[test]
    fn weekdays_are_not_shifted_across_midnight() {
        // Monday 01:00 at UTC+3 is Sunday 22:00 UTC, yet the view still says
        // Monday. A remote matcher using UTC weekdays would fire this on
        // Monday 22:00 UTC instead. The registry expects local days.
        let monday_early = alarm(1, 0, &[1]);
        let view = utc_view(&monday_early, -180);

        assert_eq!((view.utc_hour, view.utc_minute), (22, 0));
        assert_eq!(view.days, [1].into_iter().collect());
    }

    #[test]
    fn views_serialize_in_registry_shape() {
        let json = serde_json::to_value(utc_views(&[alarm(7, 0, &[5, 1])], 0)).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "id": "a",
                "utcHour": 7,
                "utcMinute": 0,
                "days": [1, 5],
                "enabled": true,
                "startDate": null
            }])
        );
    }
}
