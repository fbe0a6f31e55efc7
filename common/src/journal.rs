//! Per-day JSON-lines log of readings, one record per local date.

use chrono::{DateTime, NaiveDate, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
    store::{DurableStore, StoreError},
    types::Reading,
};

pub const JOURNAL_DIR: &str = "readings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub temperature: u8,
    pub humidity: u8,
}

pub fn record_name(date: NaiveDate) -> String {
    format!("{JOURNAL_DIR}/{}.jsonl", date.format("%Y-%m-%d"))
}

/// Unknown zone names fall back to UTC.
pub fn local_time(now: DateTime<Utc>, timezone: &str) -> DateTime<chrono::FixedOffset> {
    match timezone.parse::<Tz>() {
        Ok(tz) => {
            let local = now.with_timezone(&tz);
            local.with_timezone(&local.offset().fix())
        }
        Err(_) => now.fixed_offset(),
    }
}

/// Appends one line for `reading` to the record of its local date and returns
/// the record name. Fault readings are not journaled.
pub fn append_reading(
    store: &mut dyn DurableStore,
    now: DateTime<Utc>,
    timezone: &str,
    reading: Reading,
) -> Result<Option<String>, StoreError> {
    if reading.is_fault() {
        return Ok(None);
    }

    let local = local_time(now, timezone);
    let entry = JournalEntry {
        time: local.format("%H:%M:%S").to_string(),
        temperature: reading.temperature,
        humidity: reading.humidity,
    };

    let mut line = serde_json::to_vec(&entry).map_err(crate::record::RecordError::from)?;
    line.push(b'\n');

    let name = record_name(local.date_naive());
    store.append(&name, &line)?;
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 16, hour, minute, 5).unwrap()
    }

    #[test]
    fn appends_lines_to_local_day_record() {
        let mut store = MemoryStore::new();

        let first = append_reading(&mut store, utc(6, 0), "Europe/Moscow", Reading::new(18, 44))
            .unwrap();
        let second = append_reading(&mut store, utc(6, 15), "Europe/Moscow", Reading::new(19, 43))
            .unwrap();

        assert_eq!(first.as_deref(), Some("readings/2026-03-16.jsonl"));
        assert_eq!(first, second);

        let raw = String::from_utf8(store.get("readings/2026-03-16.jsonl").unwrap().to_vec())
            .unwrap();
        let entries: Vec<JournalEntry> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(
            entries,
            vec![
                JournalEntry {
                    time: "09:00:05".to_string(),
                    temperature: 18,
                    humidity: 44,
                },
                JournalEntry {
                    time: "09:15:05".to_string(),
                    temperature: 19,
                    humidity: 43,
                },
            ]
        );
    }

    #[test]
    fn local_midnight_rolls_the_record() {
        let mut store = MemoryStore::new();

        let name = append_reading(&mut store, utc(22, 30), "Europe/Moscow", Reading::new(15, 60))
            .unwrap();

        assert_eq!(name.as_deref(), Some("readings/2026-03-17.jsonl"));
    }

    #[test]
    fn unknown_timezone_uses_utc() {
        let local = local_time(utc(22, 30), "Mars/Olympus");

        assert_eq!(local.format("%H:%M").to_string(), "22:30");
    }

    #[test]
    fn fault_is_not_journaled() {
        let mut store = MemoryStore::new();

        let name = append_reading(&mut store, utc(6, 0), "UTC", Reading::FAULT).unwrap();

        assert_eq!(name, None);
        assert_eq!(store.get("readings/2026-03-16.jsonl"), None);
    }
}
