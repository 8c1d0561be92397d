use anyhow::{anyhow, Result};

use super::model::DaySet;

/// Sunday-indexed abbreviations.
pub const DAY_NAMES_SHORT: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
pub const DAY_NAMES_FULL: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Display order: the week starts on Monday.
const DISPLAY_ORDER: [u8; 7] = [1, 2, 3, 4, 5, 6, 0];

const WEEKDAYS: [u8; 5] = [1, 2, 3, 4, 5];
const WEEKENDS: [u8; 2] = [0, 6];

/// Human description of a recurrence day set.
pub fn describe_recurrence(days: &DaySet) -> String {
    if days.is_empty() {
        return "once".to_string();
    }
    if days.len() == 7 && days.iter().all(|day| *day <= 6) {
        return "every day".to_string();
    }
    if same_days(days, &WEEKDAYS) {
        return "weekdays".to_string();
    }
    if same_days(days, &WEEKENDS) {
        return "weekends".to_string();
    }

    DISPLAY_ORDER
        .iter()
        .filter(|day| days.contains(*day))
        .map(|day| DAY_NAMES_SHORT[usize::from(*day)])
        .collect::<Vec<_>>()
        .join(", ")
}

fn same_days(days: &DaySet, expected: &[u8]) -> bool {
    days.len() == expected.len() && expected.iter().all(|day| days.contains(day))
}

/// Parse a day list such as `mon,wed,fri`, `weekdays`, `weekends`,
/// `everyday` or `once`. Names are matched on their first three letters.
pub fn parse_days(input: &str) -> Result<DaySet> {
    let input = input.trim().to_ascii_lowercase();
    match input.as_str() {
        "" | "once" => return Ok(DaySet::new()),
        "weekdays" => return Ok(WEEKDAYS.into_iter().collect()),
        "weekends" => return Ok(WEEKENDS.into_iter().collect()),
        "everyday" | "every day" | "daily" => return Ok((0..7).collect()),
        _ => {}
    }

    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            DAY_NAMES_SHORT
                .iter()
                .position(|name| token.starts_with(&name.to_ascii_lowercase()))
                .map(|index| index as u8)
                .ok_or_else(|| anyhow!("unknown weekday '{token}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(days: &[u8]) -> DaySet {
        days.iter().copied().collect()
    }

    #[test]
    fn named_sets() {
        assert_eq!(describe_recurrence(&set(&[])), "once");
        assert_eq!(describe_recurrence(&set(&[1, 2, 3, 4, 5])), "weekdays");
        assert_eq!(describe_recurrence(&set(&[5, 4, 3, 2, 1])), "weekdays");
        assert_eq!(describe_recurrence(&set(&[6, 0])), "weekends");
        assert_eq!(describe_recurrence(&set(&[0, 1, 2, 3, 4, 5, 6])), "every day");
    }

    #[test]
    fn other_sets_list_monday_first() {
        assert_eq!(describe_recurrence(&set(&[2, 4])), "Tue, Thu");
        assert_eq!(describe_recurrence(&set(&[4, 2])), "Tue, Thu");
        assert_eq!(describe_recurrence(&set(&[0, 1])), "Mon, Sun");
        assert_eq!(describe_recurrence(&set(&[6, 3, 0])), "Wed, Sat, Sun");
        assert_eq!(describe_recurrence(&set(&[1, 2, 3, 4])), "Mon, Tue, Wed, Thu");
    }

    #[test]
    fn parses_names_and_presets() {
        assert_eq!(parse_days("mon,wed,fri").unwrap(), set(&[1, 3, 5]));
        assert_eq!(parse_days(" Sunday , saturday ").unwrap(), set(&[0, 6]));
        assert_eq!(parse_days("weekdays").unwrap(), set(&[1, 2, 3, 4, 5]));
        assert_eq!(parse_days("everyday").unwrap().len(), 7);
        assert!(parse_days("once").unwrap().is_empty());
        assert!(parse_days("mon,funday").is_err());
    }

    #[test]
    fn full_names_line_up_with_abbreviations() {
        for (short, full) in DAY_NAMES_SHORT.iter().zip(DAY_NAMES_FULL.iter()) {
            assert!(full.starts_with(short));
        }
    }
}
