use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

labelled_enum!(StudentStatus, "student status", {
    Active => "active",
    Inactive => "inactive",
    Graduated => "graduated",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

labelled_enum!(AttendanceStatus, "attendance status", {
    Present => "present",
    Absent => "absent",
    Late => "late",
    Excused => "excused",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeCategory {
    Assignment,
    Quiz,
    Test,
    Project,
    Exam,
}

labelled_enum!(GradeCategory, "grade category", {
    Assignment => "assignment",
    Quiz => "quiz",
    Test => "test",
    Project => "project",
    Exam => "exam",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Attendance,
    Grade,
    System,
}

labelled_enum!(NotificationType, "notification type", {
    Attendance => "attendance",
    Grade => "grade",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

labelled_enum!(Priority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::F,
    ];
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "Id")]
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub grade_level: u8,
    pub department: String,
    pub status: StudentStatus,
    pub gpa: f64,
    pub enrollment_date: NaiveDate,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields of a student before the store assigns an id.
///
/// `enrollment_date` falls back to today when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub grade_level: u8,
    pub department: String,
    pub status: StudentStatus,
    pub gpa: f64,
    #[serde(default)]
    pub enrollment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub grade_level: Option<u8>,
    pub department: Option<String>,
    pub status: Option<StudentStatus>,
    pub gpa: Option<f64>,
    pub enrollment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "Id")]
    pub id: u32,
    pub student_id: u32,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
    pub student_id: u32,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendancePatch {
    pub status: Option<AttendanceStatus>,
    /// `Some(None)` clears the reason.
    pub reason: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    #[serde(rename = "Id")]
    pub id: u32,
    pub student_id: u32,
    pub assignment_name: String,
    pub category: GradeCategory,
    pub score: f64,
    pub max_score: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGrade {
    pub student_id: u32,
    pub assignment_name: String,
    pub category: GradeCategory,
    pub score: f64,
    pub max_score: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradePatch {
    pub student_id: Option<u32>,
    pub assignment_name: Option<String>,
    pub category: Option<GradeCategory>,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub student_id: Option<u32>,
    pub priority: Priority,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub email_sent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub student_id: Option<u32>,
    pub priority: Priority,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPatch {
    pub is_read: Option<bool>,
    pub email_sent: Option<bool>,
}

/// A threshold crossing that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: NotificationType,
    pub student_id: u32,
    pub message: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.absent + self.late + self.excused
    }

    /// Present share of all marked records, 0 when nothing was marked.
    pub fn rate(&self) -> f64 {
        percent_of(self.present, self.total())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub counts: StatusCounts,
}

/// One point of the dashboard's roster-relative attendance chart.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterDay {
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceStats {
    pub total_records: usize,
    pub present_rate: f64,
    pub absent_rate: f64,
    pub late_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeDistribution {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
    pub f: usize,
}

impl GradeDistribution {
    pub fn add(&mut self, letter: LetterGrade) {
        match letter {
            LetterGrade::A => self.a += 1,
            LetterGrade::B => self.b += 1,
            LetterGrade::C => self.c += 1,
            LetterGrade::D => self.d += 1,
            LetterGrade::F => self.f += 1,
        }
    }

    pub fn count(&self, letter: LetterGrade) -> usize {
        match letter {
            LetterGrade::A => self.a,
            LetterGrade::B => self.b,
            LetterGrade::C => self.c,
            LetterGrade::D => self.d,
            LetterGrade::F => self.f,
        }
    }

    pub fn total(&self) -> usize {
        self.a + self.b + self.c + self.d + self.f
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAverage {
    pub category: GradeCategory,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    pub total_assignments: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassOverview {
    pub total_students: usize,
    pub active_students: usize,
    pub by_grade_level: BTreeMap<u8, usize>,
    pub average_gpa: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
    pub total_students: usize,
    pub active_students: usize,
    pub average_gpa: f64,
    pub attendance_rate: f64,
}

pub(crate) fn percent_of(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|reason| !reason.trim().is_empty()))
}
