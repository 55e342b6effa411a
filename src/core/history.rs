use crate::domain::model::HistoryRecord;
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Records per item, newest first.
pub fn by_item(history: &[HistoryRecord]) -> BTreeMap<&str, Vec<&HistoryRecord>> {
    let mut grouped: BTreeMap<&str, Vec<&HistoryRecord>> = BTreeMap::new();
    for record in history {
        grouped.entry(record.item_id.as_str()).or_default().push(record);
    }
    for records in grouped.values_mut() {
        records.sort_by_key(|r| Reverse((r.date, r.timestamp)));
    }
    grouped
}

/// Records per date, in store order within a day.
pub fn by_date(history: &[HistoryRecord]) -> BTreeMap<NaiveDate, Vec<&HistoryRecord>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<&HistoryRecord>> = BTreeMap::new();
    for record in history {
        grouped.entry(record.date).or_default().push(record);
    }
    grouped
}

/// Most recent record for `item_id`; on equal dates the later timestamp wins.
pub fn last_eaten<'a>(history: &'a [HistoryRecord], item_id: &str) -> Option<&'a HistoryRecord> {
    history
        .iter()
        .filter(|r| r.item_id == item_id)
        .max_by_key(|r| (r.date, r.timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(day: u32, hour: u32, item: &str, user: &str) -> HistoryRecord {
        HistoryRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            item_id: item.to_string(),
            user_id: user.to_string(),
            automatic: false,
            vote_count: None,
            timestamp: Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_by_item_orders_newest_first() {
        let history = vec![
            record(1, 4, "pasta", "a"),
            record(3, 4, "pasta", "a"),
            record(2, 4, "sushi", "b"),
        ];
        let grouped = by_item(&history);
        assert_eq!(grouped.len(), 2);
        let pasta = &grouped["pasta"];
        assert_eq!(pasta[0].date.to_string(), "2024-05-03");
        assert_eq!(pasta[1].date.to_string(), "2024-05-01");
    }

    #[test]
    fn test_by_date_groups_records() {
        let history = vec![
            record(1, 4, "pasta", "a"),
            record(1, 4, "pasta", "b"),
            record(2, 4, "sushi", "a"),
        ];
        let grouped = by_date(&history);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()].len(), 2);
        // Derived view only.
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_last_eaten_prefers_latest_date_then_timestamp() {
        let history = vec![
            record(2, 3, "pasta", "a"),
            record(2, 5, "pasta", "b"),
            record(1, 9, "pasta", "c"),
        ];
        let last = last_eaten(&history, "pasta").unwrap();
        assert_eq!(last.user_id, "b");
        assert!(last_eaten(&history, "sushi").is_none());
    }
}
