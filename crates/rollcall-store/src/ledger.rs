//! Daily attendance rows: one per person per day, time-in plus latest time-out.

use crate::resilient::Document;
use crate::roster::PersonId;
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: PersonId,
    pub name: String,
    pub date: NaiveDate,
    pub time_in: NaiveTime,
    pub time_out: Option<NaiveTime>,
    #[serde(default)]
    pub late: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceLedger {
    records: Vec<AttendanceRecord>,
}

impl AttendanceLedger {
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_mut(&mut self, id: &PersonId, date: NaiveDate) -> Option<&mut AttendanceRecord> {
        self.records.iter_mut().find(|r| &r.id == id && r.date == date)
    }

    pub fn push(&mut self, record: AttendanceRecord) {
        self.records.push(record);
    }

    /// Rows for one month, most recently added first.
    pub fn history(&self, year: i32, month: u32) -> Vec<&AttendanceRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.date.year() == year && r.date.month() == month)
            .collect()
    }

    /// Years with at least one row, plus `current`, newest first.
    pub fn years(&self, current: i32) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.date.year()).collect();
        years.push(current);
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        years
    }

    /// Returns the number of rows updated.
    pub fn rename_person(&mut self, id: &PersonId, name: &str) -> usize {
        let mut n = 0;
        for r in self.records.iter_mut().filter(|r| &r.id == id) {
            r.name = name.to_string();
            n += 1;
        }
        n
    }

    /// Returns the number of rows removed.
    pub fn remove_person(&mut self, id: &PersonId) -> usize {
        let before = self.records.len();
        self.records.retain(|r| &r.id != id);
        before - self.records.len()
    }
}

impl Document for AttendanceLedger {
    const FILE_NAME: &'static str = "attendance.json";

    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, date: (i32, u32, u32)) -> AttendanceRecord {
        AttendanceRecord {
            id: PersonId::parse(id).unwrap(),
            name: format!("person {id}"),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            time_in: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_out: None,
            late: false,
        }
    }

    fn ledger() -> AttendanceLedger {
        let mut l = AttendanceLedger::default();
        l.push(record("1", (2023, 12, 30)));
        l.push(record("1", (2024, 3, 4)));
        l.push(record("2", (2024, 3, 4)));
        l.push(record("1", (2024, 3, 5)));
        l
    }

    #[test]
    fn test_history_filters_month_newest_first() {
        let l = ledger();
        let rows = l.history(2024, 3);
        let dates: Vec<(String, u32)> = rows.iter().map(|r| (r.id.to_string(), r.date.day())).collect();
        assert_eq!(
            dates,
            vec![("1".into(), 5), ("2".into(), 4), ("1".into(), 4)]
        );
        assert!(l.history(2024, 4).is_empty());
    }

    #[test]
    fn test_years_include_current() {
        assert_eq!(ledger().years(2025), vec![2025, 2024, 2023]);
        assert_eq!(AttendanceLedger::default().years(2024), vec![2024]);
    }

    #[test]
    fn test_rename_and_remove_person() {
        let mut l = ledger();
        let one = PersonId::parse("1").unwrap();
        assert_eq!(l.rename_person(&one, "Ada"), 3);
        assert!(l.records().iter().filter(|r| r.id == one).all(|r| r.name == "Ada"));
        assert_eq!(l.remove_person(&one), 3);
        assert_eq!(l.records().len(), 1);
    }

    #[test]
    fn test_find_by_id_and_date() {
        let mut l = ledger();
        let two = PersonId::parse("2").unwrap();
        assert!(l.find_mut(&two, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()).is_some());
        assert!(l.find_mut(&two, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).is_none());
    }

    #[test]
    fn test_document_format() {
        let mut l = AttendanceLedger::default();
        let mut r = record("1", (2024, 3, 4));
        r.time_out = NaiveTime::from_hms_opt(17, 30, 5);
        l.push(r);
        let json: serde_json::Value = serde_json::from_slice(&l.encode().unwrap()).unwrap();
        assert_eq!(json[0]["date"], "2024-03-04");
        assert_eq!(json[0]["time_in"], "09:00:00");
        assert_eq!(json[0]["time_out"], "17:30:05");
        assert_eq!(AttendanceLedger::decode(&l.encode().unwrap()).unwrap(), l);
    }
}
