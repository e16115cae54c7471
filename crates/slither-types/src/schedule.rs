//! Fixed weekly rotation of daily challenge sizes and difficulties.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySlot {
    pub grid_size: u32,
    pub difficulty: Difficulty,
    pub display_name: &'static str,
}

/// Indexed by days from Sunday (0 = Sunday .. 6 = Saturday).
const WEEKLY_SCHEDULE: [DailySlot; 7] = [
    DailySlot { grid_size: 10, difficulty: Difficulty::Difficult, display_name: "Hard" },
    DailySlot { grid_size: 5, difficulty: Difficulty::Easy, display_name: "Easy" },
    DailySlot { grid_size: 7, difficulty: Difficulty::Medium, display_name: "Medium" },
    DailySlot { grid_size: 10, difficulty: Difficulty::Difficult, display_name: "Hard" },
    DailySlot { grid_size: 7, difficulty: Difficulty::Medium, display_name: "Medium" },
    DailySlot { grid_size: 12, difficulty: Difficulty::Difficult, display_name: "Master" },
    DailySlot { grid_size: 15, difficulty: Difficulty::Difficult, display_name: "Ninja" },
];

pub fn slot_for_weekday(weekday: Weekday) -> DailySlot {
    WEEKLY_SCHEDULE[weekday.num_days_from_sunday() as usize]
}

pub fn slot_for_date(date: NaiveDate) -> DailySlot {
    slot_for_weekday(date.weekday())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wednesday_is_hard_ten_by_ten() {
        let slot = slot_for_weekday(Weekday::Wed);
        assert_eq!(slot.grid_size, 10);
        assert_eq!(slot.difficulty, Difficulty::Difficult);
    }

    #[test]
    fn sunday_matches_wednesday() {
        assert_eq!(slot_for_weekday(Weekday::Sun), slot_for_weekday(Weekday::Wed));
    }

    #[test]
    fn full_week_rotation() {
        let sizes: Vec<u32> = [
            Weekday::Sun,
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
        ]
        .into_iter()
        .map(|d| slot_for_weekday(d).grid_size)
        .collect();
        assert_eq!(sizes, vec![10, 5, 7, 10, 7, 12, 15]);
        assert_eq!(slot_for_weekday(Weekday::Mon).difficulty, Difficulty::Easy);
        assert_eq!(slot_for_weekday(Weekday::Thu).difficulty, Difficulty::Medium);
    }

    #[test]
    fn date_lookup_uses_calendar_weekday() {
        // 2026-10-14 is a Wednesday
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(slot_for_date(date).display_name, "Hard");
        let saturday = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(slot_for_date(saturday).display_name, "Ninja");
    }
}
