//! The attendance ledger engine: cooldown dedup, time-in/time-out toggle,
//! lateness, and the audit trail.
//!
//! All writes go through the control loop, so at most one is in flight.

use crate::events::{Notifier, SessionEvent};
use crate::shared::Shared;
use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rollcall_store::{
    AttendanceLedger, AttendanceRecord, DataDir, PersonId, Roster, ScanLog, ScanLogEntry, Schedule,
    StoreError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to persist attendance: {0}")]
    Persist(#[from] StoreError),
}

/// What a log request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Inside the cooldown window; nothing written.
    CoolingDown,
    /// Not on the roster; nothing written.
    UnknownPerson,
    TimeIn,
    Late,
    /// Later scan the same day; time-out overwritten.
    TimeOut,
}

/// Expected time-in for `now`, if the schedule covers today and parses.
pub fn expected_time_in(schedule: Option<&Schedule>, now: NaiveDateTime) -> Option<NaiveTime> {
    let schedule = schedule?;
    if !schedule.applies_on(now.weekday()) {
        return None;
    }
    schedule.expected_time()
}

/// Late iff strictly after the expected time.
pub fn is_late(now: NaiveTime, expected: NaiveTime) -> bool {
    now > expected
}

pub struct LedgerEngine {
    data: DataDir,
    roster: Shared<Roster>,
    ledger: Shared<AttendanceLedger>,
    cooldown: TimeDelta,
    last_write: HashMap<PersonId, NaiveDateTime>,
    notifier: Arc<dyn Notifier>,
}

impl LedgerEngine {
    pub fn new(
        data: DataDir,
        roster: Shared<Roster>,
        ledger: Shared<AttendanceLedger>,
        cooldown: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            data,
            roster,
            ledger,
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            last_write: HashMap::new(),
            notifier,
        }
    }

    fn cooling_down(&self, id: &PersonId, now: NaiveDateTime) -> bool {
        self.last_write
            .get(id)
            .is_some_and(|last| now.signed_duration_since(*last) < self.cooldown)
    }

    /// Apply one log request at `now`.
    ///
    /// Ledger persistence failures are notified and returned; the cooldown is
    /// only armed after the ledger write lands. An audit append failure after
    /// a successful ledger write is notified but does not fail the request.
    pub fn record_scan(&mut self, id: &PersonId, now: NaiveDateTime) -> Result<ScanOutcome, LedgerError> {
        if self.cooling_down(id, now) {
            tracing::debug!(id = %id, "scan inside cooldown window; dropped");
            return Ok(ScanOutcome::CoolingDown);
        }

        let roster = self.roster.load();
        let Some(person) = roster.get(id) else {
            tracing::warn!(id = %id, "log request for id not on the roster; dropped");
            return Ok(ScanOutcome::UnknownPerson);
        };

        let at = now.time().with_nanosecond(0).unwrap_or(now.time());
        let date = now.date();
        let expected = expected_time_in(person.schedule.as_ref(), now);

        let write = self.ledger.update(|ledger| {
            let outcome = match ledger.find_mut(id, date) {
                Some(record) => {
                    record.time_out = Some(at);
                    ScanOutcome::TimeOut
                }
                None => {
                    let late = expected.is_some_and(|e| is_late(at, e));
                    ledger.push(AttendanceRecord {
                        id: id.clone(),
                        name: person.name.clone(),
                        date,
                        time_in: at,
                        time_out: None,
                        late,
                    });
                    if late {
                        ScanOutcome::Late
                    } else {
                        ScanOutcome::TimeIn
                    }
                }
            };
            self.data.save(ledger)?;
            Ok::<_, StoreError>(outcome)
        });

        let outcome = match write {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(id = %id, error = %e, "ledger write failed");
                self.notifier.notify(&SessionEvent::LoggingFailed {
                    id: id.clone(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.last_write.insert(id.clone(), now);

        let entry = ScanLogEntry {
            id: id.clone(),
            name: person.name.clone(),
            date,
            time: at,
        };
        if let Err(e) = ScanLog::append(&self.data, &entry) {
            tracing::error!(id = %id, error = %e, "audit append failed");
            self.notifier.notify(&SessionEvent::LoggingFailed {
                id: id.clone(),
                reason: e.to_string(),
            });
        }

        let (id, name) = (id.clone(), person.name.clone());
        let event = match outcome {
            ScanOutcome::Late => SessionEvent::Late {
                id,
                name,
                at,
                expected: expected.unwrap_or(at),
            },
            ScanOutcome::TimeIn => SessionEvent::TimeIn { id, name, at },
            _ => SessionEvent::ScanRecorded { id, name, at },
        };
        self.notifier.notify(&event);
        tracing::info!(?outcome, at = %at, "attendance recorded");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RecordingNotifier;
    use chrono::{NaiveDate, Weekday};
    use rollcall_store::{Document, LoadStatus};
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        data: DataDir,
        ledger: Shared<AttendanceLedger>,
        notifier: Arc<RecordingNotifier>,
        engine: LedgerEngine,
    }

    fn id(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    fn harness(roster: Roster) -> Harness {
        let tmp = TempDir::new().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        let ledger = Shared::new(AttendanceLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = LedgerEngine::new(
            data.clone(),
            Shared::new(roster),
            ledger.clone(),
            Duration::from_secs(5),
            notifier.clone(),
        );
        Harness {
            _tmp: tmp,
            data,
            ledger,
            notifier,
            engine,
        }
    }

    fn roster_with(person: &str, name: &str, schedule: Option<Schedule>) -> Roster {
        let mut roster = Roster::default();
        roster.add(id(person), name, schedule).unwrap();
        roster
    }

    // 2024-03-04 is a Monday.
    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn audit_rows(data: &DataDir) -> Vec<ScanLogEntry> {
        data.load::<ScanLog>().value.entries().to_vec()
    }

    #[test]
    fn test_first_scan_creates_time_in_row_and_audit_row() {
        let mut h = harness(roster_with("7", "Ada", None));
        let t1 = at(8, 55, 0);

        assert_eq!(h.engine.record_scan(&id("7"), t1).unwrap(), ScanOutcome::TimeIn);

        let ledger = h.data.load::<AttendanceLedger>().value;
        assert_eq!(
            ledger.records(),
            &[AttendanceRecord {
                id: id("7"),
                name: "Ada".into(),
                date: t1.date(),
                time_in: t1.time(),
                time_out: None,
                late: false,
            }]
        );
        assert_eq!(
            audit_rows(&h.data),
            vec![ScanLogEntry {
                id: id("7"),
                name: "Ada".into(),
                date: t1.date(),
                time: t1.time(),
            }]
        );
        assert!(matches!(h.notifier.events()[..], [SessionEvent::TimeIn { .. }]));
    }

    #[test]
    fn test_second_scan_after_cooldown_sets_time_out() {
        let mut h = harness(roster_with("7", "Ada", None));
        h.engine.record_scan(&id("7"), at(8, 55, 0)).unwrap();
        let t2 = at(17, 2, 9);

        assert_eq!(h.engine.record_scan(&id("7"), t2).unwrap(), ScanOutcome::TimeOut);

        let ledger = h.ledger.load();
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].time_out, Some(t2.time()));
        let audit = audit_rows(&h.data);
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].time, t2.time());
        assert!(matches!(h.notifier.events().last(), Some(SessionEvent::ScanRecorded { .. })));
    }

    #[test]
    fn test_scan_within_cooldown_writes_nothing() {
        let mut h = harness(roster_with("7", "Ada", None));
        h.engine.record_scan(&id("7"), at(8, 55, 0)).unwrap();
        h.engine.record_scan(&id("7"), at(17, 0, 0)).unwrap();
        let before = std::fs::read(h.data.path_of(AttendanceLedger::FILE_NAME)).unwrap();

        for s in 0..5 {
            assert_eq!(
                h.engine.record_scan(&id("7"), at(17, 0, s)).unwrap(),
                ScanOutcome::CoolingDown
            );
        }

        assert_eq!(std::fs::read(h.data.path_of(AttendanceLedger::FILE_NAME)).unwrap(), before);
        assert_eq!(audit_rows(&h.data).len(), 2);
        assert_eq!(h.notifier.events().len(), 2);
    }

    #[test]
    fn test_cooldown_boundary_accepts_exactly_elapsed() {
        let mut h = harness(roster_with("7", "Ada", None));
        h.engine.record_scan(&id("7"), at(9, 0, 0)).unwrap();
        assert_eq!(
            h.engine.record_scan(&id("7"), at(9, 0, 4)).unwrap(),
            ScanOutcome::CoolingDown
        );
        assert_eq!(h.engine.record_scan(&id("7"), at(9, 0, 5)).unwrap(), ScanOutcome::TimeOut);
    }

    #[test]
    fn test_toggle_has_no_daily_cap() {
        let mut h = harness(roster_with("7", "Ada", None));
        h.engine.record_scan(&id("7"), at(8, 0, 0)).unwrap();
        for minute in 1..=10 {
            assert_eq!(
                h.engine.record_scan(&id("7"), at(9, minute, 0)).unwrap(),
                ScanOutcome::TimeOut
            );
        }
        assert_eq!(h.ledger.load().records()[0].time_out, Some(at(9, 10, 0).time()));
        assert_eq!(audit_rows(&h.data).len(), 11);
    }

    #[test]
    fn test_cooldown_is_per_person() {
        let mut roster = roster_with("1", "Ada", None);
        roster.add(id("2"), "Grace", None).unwrap();
        let mut h = harness(roster);
        h.engine.record_scan(&id("1"), at(9, 0, 0)).unwrap();
        assert_eq!(h.engine.record_scan(&id("2"), at(9, 0, 1)).unwrap(), ScanOutcome::TimeIn);
    }

    #[test]
    fn test_scheduled_late_arrival_is_flagged() {
        let sched = Schedule::parse(&["mon"], "09:00").unwrap();
        let mut h = harness(roster_with("7", "Ada", Some(sched)));

        assert_eq!(h.engine.record_scan(&id("7"), at(9, 15, 0)).unwrap(), ScanOutcome::Late);

        assert!(h.ledger.load().records()[0].late);
        let events = h.notifier.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Late { expected, at: t, .. } => {
                assert_eq!(*expected, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
                assert_eq!(*t, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
            }
            other => panic!("expected Late, got {other:?}"),
        }
    }

    #[test]
    fn test_arrival_exactly_on_time_is_not_late() {
        let sched = Schedule::parse(&["mon"], "09:00").unwrap();
        let mut h = harness(roster_with("7", "Ada", Some(sched)));
        assert_eq!(h.engine.record_scan(&id("7"), at(9, 0, 0)).unwrap(), ScanOutcome::TimeIn);
        assert!(!h.ledger.load().records()[0].late);
    }

    #[test]
    fn test_lateness_ignored_on_unscheduled_day() {
        let sched = Schedule::parse(&["tue"], "09:00").unwrap();
        let mut h = harness(roster_with("7", "Ada", Some(sched)));
        assert_eq!(h.engine.record_scan(&id("7"), at(11, 0, 0)).unwrap(), ScanOutcome::TimeIn);
    }

    #[test]
    fn test_unparseable_stored_time_never_late() {
        let sched = Schedule {
            days: vec![Weekday::Mon],
            time_in: "nine".into(),
        };
        let mut h = harness(roster_with("7", "Ada", Some(sched)));
        assert_eq!(h.engine.record_scan(&id("7"), at(23, 0, 0)).unwrap(), ScanOutcome::TimeIn);
    }

    #[test]
    fn test_unknown_id_writes_nothing_and_does_not_arm_cooldown() {
        let mut h = harness(Roster::default());
        assert_eq!(
            h.engine.record_scan(&id("ghost"), at(9, 0, 0)).unwrap(),
            ScanOutcome::UnknownPerson
        );
        assert!(h.ledger.load().is_empty());
        assert_eq!(h.data.load::<ScanLog>().status, LoadStatus::Missing);
        assert!(h.notifier.events().is_empty());
    }

    #[test]
    fn test_failed_ledger_write_reports_and_keeps_state() {
        let mut h = harness(roster_with("7", "Ada", None));
        // A directory where the ledger file should be makes the rename fail.
        std::fs::create_dir(h.data.path_of(AttendanceLedger::FILE_NAME)).unwrap();

        assert!(h.engine.record_scan(&id("7"), at(9, 0, 0)).is_err());

        assert!(h.ledger.load().is_empty());
        assert!(matches!(h.notifier.events()[..], [SessionEvent::LoggingFailed { .. }]));
        assert_eq!(h.data.load::<ScanLog>().status, LoadStatus::Missing);
    }

    #[test]
    fn test_is_late_boundary() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(!is_late(nine, nine));
        assert!(is_late(NaiveTime::from_hms_opt(9, 0, 1).unwrap(), nine));
        assert!(!is_late(NaiveTime::from_hms_opt(8, 59, 59).unwrap(), nine));
    }
}
