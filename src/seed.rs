use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;

use crate::attendance;
use crate::models::{
    AttendanceRecord, AttendanceStatus, Grade, GradeCategory, NewGrade,
    Notification, NotificationType, Priority, Student, StudentStatus,
};
use crate::store::{Record, Repository};

/// Collections loaded at process start.
#[derive(Debug, Clone, Default)]
pub struct SeedData {
    pub students: Vec<Student>,
    pub attendance: Vec<AttendanceRecord>,
    pub grades: Vec<Grade>,
    pub notifications: Vec<Notification>,
}

/// Reads `students.json`, `attendance.json`, `grades.json` and
/// `notifications.json` from `dir`. Missing files load as empty collections.
pub fn load_dir(dir: &Path) -> anyhow::Result<SeedData> {
    if !dir.is_dir() {
        anyhow::bail!("seed directory {} does not exist", dir.display());
    }

    let seed = SeedData {
        students: read_collection(&dir.join("students.json"))?,
        attendance: read_collection(&dir.join("attendance.json"))?,
        grades: read_collection(&dir.join("grades.json"))?,
        notifications: read_collection(&dir.join("notifications.json"))?,
    };
    check_rows(&seed.students, "students.json")?;
    check_rows(&seed.grades, "grades.json")?;

    tracing::info!(
        students = seed.students.len(),
        attendance = seed.attendance.len(),
        grades = seed.grades.len(),
        notifications = seed.notifications.len(),
        "loaded seed data from {}",
        dir.display()
    );
    Ok(seed)
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        tracing::debug!("no seed file at {}, starting empty", path.display());
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Seeded rows must pass the same rules as rows created through the store.
fn check_rows<T: Record>(rows: &[T], file: &str) -> anyhow::Result<()> {
    for row in rows {
        row.validate()
            .with_context(|| format!("{file}: invalid {} (id {})", T::ENTITY, row.id()))?;
    }
    Ok(())
}

/// A small roster used when no seed directory is given.
pub fn builtin() -> anyhow::Result<SeedData> {
    let roster = vec![
        ("Avery", "Lee", 10, "Science", StudentStatus::Active, 3.6),
        ("Jules", "Moreno", 11, "Arts", StudentStatus::Active, 2.4),
        ("Kiara", "Patel", 12, "Mathematics", StudentStatus::Active, 3.9),
        ("Noah", "Brooks", 9, "Science", StudentStatus::Active, 1.8),
        ("Mina", "Okafor", 12, "Mathematics", StudentStatus::Graduated, 3.2),
        ("Theo", "Lindqvist", 10, "Arts", StudentStatus::Inactive, 2.9),
    ];

    let enrolled = date(2025, 9, 2)?;
    let students: Vec<Student> = roster
        .into_iter()
        .zip(1..)
        .map(|((first, last, level, department, status, gpa), id)| Student {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{}.{}@northfield.edu", first.to_lowercase(), last.to_lowercase()),
            phone: format!("(555) 201-{:04}", 1000 + id),
            grade_level: level,
            department: department.to_string(),
            status,
            gpa,
            enrollment_date: enrolled,
        })
        .collect();

    // One week of marks per active student; the letters are P/A/L/E by day.
    let marks = [
        (1, "PPPPP"),
        (2, "PAPLA"),
        (3, "PPPPL"),
        (4, "APAPA"),
    ];
    let week_start = date(2026, 2, 2)?;
    let mut attendance = Vec::new();
    for (student_id, pattern) in marks {
        for (offset, mark) in pattern.chars().enumerate() {
            let status = match mark {
                'P' => AttendanceStatus::Present,
                'A' => AttendanceStatus::Absent,
                'L' => AttendanceStatus::Late,
                _ => AttendanceStatus::Excused,
            };
            attendance.push(AttendanceRecord {
                id: attendance.len() as u32 + 1,
                student_id,
                date: week_start + chrono::Duration::days(offset as i64),
                status,
                reason: (status == AttendanceStatus::Absent)
                    .then(|| "No note from guardian".to_string()),
            });
        }
    }

    let scores = vec![
        (1, "Cell Structure Lab", GradeCategory::Project, 47.0, 50.0, date(2026, 1, 16)?),
        (1, "Unit 3 Quiz", GradeCategory::Quiz, 18.0, 20.0, date(2026, 1, 23)?),
        (2, "Color Theory Essay", GradeCategory::Assignment, 31.0, 50.0, date(2026, 1, 16)?),
        (2, "Midterm", GradeCategory::Exam, 58.0, 100.0, date(2026, 1, 30)?),
        (3, "Proofs Set 4", GradeCategory::Assignment, 98.0, 100.0, date(2026, 1, 16)?),
        (3, "Midterm", GradeCategory::Exam, 94.0, 100.0, date(2026, 1, 30)?),
        (4, "Unit 3 Quiz", GradeCategory::Quiz, 9.0, 20.0, date(2026, 1, 23)?),
        (4, "Chapter 5 Test", GradeCategory::Test, 33.0, 100.0, date(2026, 1, 27)?),
    ];
    let grades = scores
        .into_iter()
        .zip(1..)
        .map(
            |((student_id, name, category, score, max_score, date), id)| Grade {
                id,
                student_id,
                assignment_name: name.to_string(),
                category,
                score,
                max_score,
                date,
            },
        )
        .collect();

    let notifications = vec![Notification {
        id: 1,
        kind: NotificationType::System,
        title: "Term 2 Grading Window".to_string(),
        message: "Midterm grades are due by February 13.".to_string(),
        student_id: None,
        priority: Priority::Low,
        is_read: false,
        created_at: Utc
            .with_ymd_and_hms(2026, 2, 2, 8, 0, 0)
            .single()
            .context("invalid timestamp")?,
        email_sent: false,
    }];

    Ok(SeedData {
        students,
        attendance,
        grades,
        notifications,
    })
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

/// Imports grades from a CSV file with columns
/// `student_id,assignment_name,category,score,max_score,date`.
pub async fn import_grades_csv<R>(repo: &R, csv_path: &Path) -> anyhow::Result<usize>
where
    R: Repository<Grade> + ?Sized,
{
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: u32,
        assignment_name: String,
        category: GradeCategory,
        score: f64,
        max_score: f64,
        date: NaiveDate,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut drafts = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad grade row {}", line + 1))?;
        drafts.push(NewGrade {
            student_id: row.student_id,
            assignment_name: row.assignment_name,
            category: row.category,
            score: row.score,
            max_score: row.max_score,
            date: row.date,
        });
    }

    let inserted = repo.create_batch(drafts).await?.len();
    tracing::info!(inserted, "imported grades from {}", csv_path.display());
    Ok(inserted)
}

/// Imports attendance marks from a CSV file with columns
/// `student_id,date,status,reason`. Rows for an already marked day overwrite it.
/// The whole file is parsed before any mark is written. Returns how many new
/// records were created.
pub async fn import_attendance_csv<R>(repo: &R, csv_path: &Path) -> anyhow::Result<usize>
where
    R: Repository<AttendanceRecord> + ?Sized,
{
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: u32,
        date: NaiveDate,
        status: AttendanceStatus,
        reason: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(line, result)| result.with_context(|| format!("bad attendance row {}", line + 1)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut inserted = 0usize;
    let mut overwritten = 0usize;
    for row in rows {
        let (_, created) =
            attendance::mark_attendance(repo, row.student_id, row.date, row.status, row.reason)
                .await?;
        if created {
            inserted += 1;
        } else {
            overwritten += 1;
        }
    }

    tracing::info!(
        inserted,
        overwritten,
        "imported attendance from {}",
        csv_path.display()
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::store::{Latency, Store};

    #[test]
    fn builtin_seed_has_unique_ids_per_collection() {
        let seed = builtin().unwrap();
        fn distinct(mut ids: Vec<u32>) -> usize {
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        }

        let student_ids: Vec<u32> = seed.students.iter().map(|student| student.id).collect();
        let attendance_ids: Vec<u32> = seed.attendance.iter().map(|record| record.id).collect();
        let grade_ids: Vec<u32> = seed.grades.iter().map(|grade| grade.id).collect();
        assert_eq!(distinct(student_ids), seed.students.len());
        assert_eq!(distinct(attendance_ids), seed.attendance.len());
        assert_eq!(distinct(grade_ids), seed.grades.len());
        assert_eq!(seed.students.len(), 6);
        assert_eq!(seed.grades.last().map(|grade| grade.id), Some(8));
    }

    #[test]
    fn rejects_seeded_grade_without_max_score() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("grades.json"),
            r#"[{"Id": 3, "studentId": 1, "assignmentName": "Quiz 1",
                 "category": "quiz", "score": 8, "maxScore": 0, "date": "2026-01-12"}]"#,
        )
        .unwrap();

        let err = load_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("grades.json: invalid Grade (id 3)"));
    }

    #[test]
    fn loads_json_dir_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("grades.json"),
            r#"[{"Id": 4, "studentId": 2, "assignmentName": "Quiz 2",
                 "category": "quiz", "score": 8, "maxScore": 10, "date": "2026-01-12"}]"#,
        )
        .unwrap();

        let seed = load_dir(dir.path()).unwrap();
        assert!(seed.students.is_empty());
        assert_eq!(seed.grades.len(), 1);
        assert_eq!(seed.grades[0].category, GradeCategory::Quiz);
        assert_eq!(seed.grades[0].max_score, 10.0);
    }

    #[test]
    fn missing_seed_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn imports_grade_csv_after_existing_ids() {
        let store = Store::new(builtin().unwrap(), Latency::None);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,assignment_name,category,score,max_score,date").unwrap();
        writeln!(file, "1,Unit 4 Quiz,quiz,17,20,2026-02-06").unwrap();
        writeln!(file, "2,Portfolio,project,41,50,2026-02-06").unwrap();

        let inserted = import_grades_csv(&store.grades, file.path()).await.unwrap();
        assert_eq!(inserted, 2);

        let grades = store.grades.list().await;
        assert_eq!(grades.len(), 10);
        assert_eq!(grades[9].id, 10);
        assert_eq!(grades[9].assignment_name, "Portfolio");
    }

    #[tokio::test]
    async fn attendance_csv_overwrites_marked_days() {
        let store = Store::new(builtin().unwrap(), Latency::None);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,date,status,reason").unwrap();
        writeln!(file, "2,2026-02-03,excused,Doctor visit").unwrap();
        writeln!(file, "5,2026-02-03,present,").unwrap();

        let inserted = import_attendance_csv(&store.attendance, file.path())
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let records = store.attendance.list().await;
        assert_eq!(records.len(), 21);
        let overwritten = records
            .iter()
            .find(|record| record.student_id == 2 && record.date == date(2026, 2, 3).unwrap())
            .unwrap();
        assert_eq!(overwritten.status, AttendanceStatus::Excused);
        assert_eq!(overwritten.reason.as_deref(), Some("Doctor visit"));
    }

    #[tokio::test]
    async fn bad_attendance_row_writes_nothing() {
        let store = Store::new(SeedData::default(), Latency::None);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_id,date,status,reason").unwrap();
        writeln!(file, "1,2026-02-03,present,").unwrap();
        writeln!(file, "2,2026-02-03,tardy,").unwrap();

        let err = import_attendance_csv(&store.attendance, file.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad attendance row 2"));
        assert!(store.attendance.list().await.is_empty());
    }
}
