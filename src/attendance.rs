use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::StoreError;
use crate::models::{
    percent_of, Alert, AttendancePatch, AttendanceRecord, AttendanceStats, AttendanceStatus,
    DailyTrend, MonthlyTrend, NewAttendance, NotificationType, Priority, RosterDay,
    StatusCounts, Student,
};
use crate::store::Repository;

/// Rates below `warn` raise a medium alert; at or below `critical` a high one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceThresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Default for AttendanceThresholds {
    fn default() -> Self {
        Self {
            warn: 80.0,
            critical: 60.0,
        }
    }
}

/// Present share of the student's marked days, as a percentage in `[0, 100]`.
pub fn attendance_rate(student_id: u32, records: &[AttendanceRecord]) -> f64 {
    counts_for(student_id, records).rate()
}

fn counts_for(student_id: u32, records: &[AttendanceRecord]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in records.iter().filter(|record| record.student_id == student_id) {
        counts.record(record.status);
    }
    counts
}

pub fn daily_trend(records: &[AttendanceRecord]) -> Vec<DailyTrend> {
    let mut days: BTreeMap<NaiveDate, StatusCounts> = BTreeMap::new();
    for record in records {
        days.entry(record.date).or_default().record(record.status);
    }
    days.into_iter()
        .map(|(date, counts)| DailyTrend { date, counts })
        .collect()
}

pub fn monthly_trend(records: &[AttendanceRecord]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<(i32, u32), StatusCounts> = BTreeMap::new();
    for record in records {
        let key = (record.date.year(), record.date.month());
        months.entry(key).or_default().record(record.status);
    }
    months
        .into_iter()
        .map(|((year, month), counts)| MonthlyTrend {
            month: format!("{year:04}-{month:02}"),
            counts,
        })
        .collect()
}

/// One alert per student whose rate falls under `thresholds.warn`, ordered by student id.
pub fn low_attendance_alerts(
    records: &[AttendanceRecord],
    thresholds: AttendanceThresholds,
) -> Vec<Alert> {
    let mut per_student: BTreeMap<u32, StatusCounts> = BTreeMap::new();
    for record in records {
        per_student
            .entry(record.student_id)
            .or_default()
            .record(record.status);
    }

    per_student
        .into_iter()
        .filter_map(|(student_id, counts)| {
            let rate = counts.rate();
            let priority = if rate <= thresholds.critical {
                Priority::High
            } else if rate < thresholds.warn {
                Priority::Medium
            } else {
                return None;
            };
            Some(Alert {
                kind: NotificationType::Attendance,
                student_id,
                message: format!("Low attendance alert: {rate:.1}% attendance rate"),
                priority,
            })
        })
        .collect()
}

pub fn attendance_stats(records: &[AttendanceRecord]) -> AttendanceStats {
    let mut counts = StatusCounts::default();
    for record in records {
        counts.record(record.status);
    }
    let total = counts.total();
    AttendanceStats {
        total_records: total,
        present_rate: percent_of(counts.present, total),
        absent_rate: percent_of(counts.absent, total),
        late_rate: percent_of(counts.late, total),
    }
}

/// Present rate among `students`' records marked on `date`; 0 when none were marked.
pub fn daily_rate(records: &[AttendanceRecord], students: &[Student], date: NaiveDate) -> f64 {
    let ids: HashSet<u32> = students.iter().map(|student| student.id).collect();
    let mut counts = StatusCounts::default();
    for record in records
        .iter()
        .filter(|record| record.date == date && ids.contains(&record.student_id))
    {
        counts.record(record.status);
    }
    counts.rate()
}

/// The last `days` days ending at `end`, measured against the whole roster:
/// anyone not marked present counts as absent.
pub fn recent_trend(
    records: &[AttendanceRecord],
    students: &[Student],
    end: NaiveDate,
    days: u32,
) -> Vec<RosterDay> {
    let ids: HashSet<u32> = students.iter().map(|student| student.id).collect();
    let roster = students.len();

    (0..days as i64)
        .rev()
        .map(|back| {
            let date = end - Duration::days(back);
            let present = records
                .iter()
                .filter(|record| {
                    record.date == date
                        && record.status == AttendanceStatus::Present
                        && ids.contains(&record.student_id)
                })
                .count();
            RosterDay {
                date,
                present,
                absent: roster.saturating_sub(present),
                rate: percent_of(present, roster),
            }
        })
        .collect()
}

/// Records `status` for the student on `date`, overwriting an existing mark for
/// that day. Returns the stored record and whether it was newly created.
pub async fn mark_attendance<R>(
    repo: &R,
    student_id: u32,
    date: NaiveDate,
    status: AttendanceStatus,
    reason: Option<String>,
) -> Result<(AttendanceRecord, bool), StoreError>
where
    R: Repository<AttendanceRecord> + ?Sized,
{
    let key = move |record: &AttendanceRecord| {
        record.student_id == student_id && record.date == date
    };
    let patch = AttendancePatch {
        status: Some(status),
        reason: Some(reason.clone()),
    };
    let draft = NewAttendance {
        student_id,
        date,
        status,
        reason,
    };
    repo.upsert(&key, patch, draft).await
}

pub async fn records_for_student<R>(repo: &R, student_id: u32) -> Vec<AttendanceRecord>
where
    R: Repository<AttendanceRecord> + ?Sized,
{
    repo.find(&move |record: &AttendanceRecord| record.student_id == student_id)
        .await
}

pub async fn records_on<R>(repo: &R, date: NaiveDate) -> Vec<AttendanceRecord>
where
    R: Repository<AttendanceRecord> + ?Sized,
{
    repo.find(&move |record: &AttendanceRecord| record.date == date)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentStatus;
    use crate::seed::SeedData;
    use crate::store::{Latency, Store};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn record(id: u32, student_id: u32, date: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id,
            date,
            status,
            reason: None,
        }
    }

    /// `presents` present marks followed by absences, `total` days in all.
    fn history(student_id: u32, presents: u32, total: u32) -> Vec<AttendanceRecord> {
        (0..total)
            .map(|i| {
                let status = if i < presents {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                };
                record(student_id * 100 + i, student_id, day(i + 1), status)
            })
            .collect()
    }

    fn student(id: u32) -> Student {
        Student {
            id,
            first_name: format!("Student{id}"),
            last_name: "Test".to_string(),
            email: format!("s{id}@school.edu"),
            phone: "555".to_string(),
            grade_level: 9,
            department: "Science".to_string(),
            status: StudentStatus::Active,
            gpa: 3.0,
            enrollment_date: day(1),
        }
    }

    #[test]
    fn rate_is_zero_without_records() {
        assert_eq!(attendance_rate(1, &[]), 0.0);
        assert_eq!(attendance_rate(2, &history(1, 3, 4)), 0.0);
    }

    #[test]
    fn rate_counts_only_present_days() {
        let mut records = history(1, 3, 4);
        records.push(record(99, 1, day(20), AttendanceStatus::Late));
        let rate = attendance_rate(1, &records);
        assert!((rate - 60.0).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&rate));
    }

    #[test]
    fn alert_priorities_follow_thresholds() {
        let mut records = history(1, 3, 5); // 60%
        records.extend(history(2, 3, 4)); // 75%
        records.extend(history(3, 17, 20)); // 85%
        records.extend(history(4, 1, 2)); // 50%

        let alerts = low_attendance_alerts(&records, AttendanceThresholds::default());
        let summary: Vec<(u32, Priority)> = alerts
            .iter()
            .map(|alert| (alert.student_id, alert.priority))
            .collect();

        assert_eq!(
            summary,
            vec![(1, Priority::High), (2, Priority::Medium), (4, Priority::High)]
        );
        assert_eq!(alerts[0].kind, NotificationType::Attendance);
        assert_eq!(alerts[1].message, "Low attendance alert: 75.0% attendance rate");
    }

    #[test]
    fn exactly_at_warn_line_raises_nothing() {
        let records = history(1, 4, 5);
        assert!(low_attendance_alerts(&records, AttendanceThresholds::default()).is_empty());
        assert!(low_attendance_alerts(&[], AttendanceThresholds::default()).is_empty());
    }

    #[test]
    fn daily_trend_groups_and_sorts_by_date() {
        let records = vec![
            record(1, 1, day(4), AttendanceStatus::Present),
            record(2, 2, day(2), AttendanceStatus::Absent),
            record(3, 1, day(2), AttendanceStatus::Late),
            record(4, 3, day(2), AttendanceStatus::Present),
        ];
        let trend = daily_trend(&records);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, day(2));
        assert_eq!(trend[0].counts.present, 1);
        assert_eq!(trend[0].counts.absent, 1);
        assert_eq!(trend[0].counts.late, 1);
        assert!((trend[0].counts.rate() - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(trend[1].date, day(4));
        assert_eq!(trend[1].counts.rate(), 100.0);
    }

    #[test]
    fn monthly_trend_keys_by_year_and_month() {
        let feb = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        let dec = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let records = vec![
            record(1, 1, day(3), AttendanceStatus::Present),
            record(2, 1, feb, AttendanceStatus::Absent),
            record(3, 2, dec, AttendanceStatus::Present),
            record(4, 2, day(9), AttendanceStatus::Absent),
        ];
        let months: Vec<(String, usize)> = monthly_trend(&records)
            .into_iter()
            .map(|point| (point.month, point.counts.total()))
            .collect();
        assert_eq!(
            months,
            vec![
                ("2025-12".to_string(), 1),
                ("2026-02".to_string(), 1),
                ("2026-03".to_string(), 2),
            ]
        );
    }

    #[test]
    fn stats_split_rates_by_status() {
        let records = vec![
            record(1, 1, day(1), AttendanceStatus::Present),
            record(2, 1, day(2), AttendanceStatus::Absent),
            record(3, 1, day(3), AttendanceStatus::Late),
            record(4, 1, day(4), AttendanceStatus::Excused),
        ];
        let stats = attendance_stats(&records);
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.present_rate, 25.0);
        assert_eq!(stats.absent_rate, 25.0);
        assert_eq!(stats.late_rate, 25.0);
        assert_eq!(attendance_stats(&[]), AttendanceStats::default());
    }

    #[test]
    fn recent_trend_measures_against_roster() {
        let roster = vec![student(1), student(2), student(3), student(4)];
        let records = vec![
            record(1, 1, day(5), AttendanceStatus::Present),
            record(2, 2, day(5), AttendanceStatus::Late),
            record(3, 3, day(5), AttendanceStatus::Present),
            record(4, 9, day(5), AttendanceStatus::Present),
        ];
        let trend = recent_trend(&records, &roster, day(5), 3);
        assert_eq!(
            trend.iter().map(|point| point.date).collect::<Vec<_>>(),
            vec![day(3), day(4), day(5)]
        );
        assert_eq!(trend[0].present, 0);
        assert_eq!(trend[0].absent, 4);
        assert_eq!(trend[2].present, 2);
        assert_eq!(trend[2].absent, 2);
        assert_eq!(trend[2].rate, 50.0);
        assert_eq!(daily_rate(&records, &roster, day(5)), 200.0 / 3.0);
    }

    #[tokio::test]
    async fn marking_twice_keeps_one_record_with_latest_status() {
        let store = Store::new(SeedData::default(), Latency::None);

        let (first, created) = mark_attendance(
            &store.attendance,
            7,
            day(10),
            AttendanceStatus::Absent,
            Some("Sick".to_string()),
        )
        .await
        .unwrap();
        assert!(created);

        let (second, created) =
            mark_attendance(&store.attendance, 7, day(10), AttendanceStatus::Late, None)
                .await
                .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        let records = records_for_student(&store.attendance, 7).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Late);
        assert_eq!(records[0].reason, None);
        assert_eq!(records_on(&store.attendance, day(10)).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_marks_for_same_day_do_not_duplicate() {
        let store = std::sync::Arc::new(Store::new(SeedData::default(), Latency::None));
        let mut handles = Vec::new();
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Excused,
        ] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                mark_attendance(&store.attendance, 3, day(11), status, None)
                    .await
                    .map(|(_, created)| created)
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.attendance.list().await.len(), 1);
    }
}
