use std::fmt::Write;

use chrono::NaiveDate;

use crate::attendance;
use crate::grades;
use crate::models::{
    AttendanceRecord, AttendanceStats, ClassOverview, DashboardStats, Grade, GradeDistribution,
    LetterGrade, PerformanceMetrics, Student, StudentStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassReport {
    pub date: NaiveDate,
    pub overview: ClassOverview,
    pub attendance: AttendanceStats,
    pub performance: PerformanceMetrics,
    pub distribution: GradeDistribution,
}

fn mean_gpa(students: &[Student]) -> f64 {
    if students.is_empty() {
        0.0
    } else {
        students.iter().map(|student| student.gpa).sum::<f64>() / students.len() as f64
    }
}

fn active_count(students: &[Student]) -> usize {
    students
        .iter()
        .filter(|student| student.status == StudentStatus::Active)
        .count()
}

/// Headline numbers for a (possibly department-filtered) roster on `today`.
pub fn dashboard_stats(
    students: &[Student],
    records: &[AttendanceRecord],
    today: NaiveDate,
) -> DashboardStats {
    DashboardStats {
        total_students: students.len(),
        active_students: active_count(students),
        average_gpa: mean_gpa(students),
        attendance_rate: attendance::daily_rate(records, students, today),
    }
}

pub fn class_overview(students: &[Student]) -> ClassOverview {
    let mut overview = ClassOverview {
        total_students: students.len(),
        active_students: active_count(students),
        average_gpa: mean_gpa(students),
        ..ClassOverview::default()
    };
    for student in students {
        *overview.by_grade_level.entry(student.grade_level).or_insert(0) += 1;
    }
    overview
}

pub fn compile(
    date: NaiveDate,
    students: &[Student],
    records: &[AttendanceRecord],
    grade_rows: &[Grade],
) -> ClassReport {
    ClassReport {
        date,
        overview: class_overview(students),
        attendance: attendance::attendance_stats(records),
        performance: grades::performance_metrics(grade_rows),
        distribution: grades::grade_distribution(grade_rows),
    }
}

pub fn report_file_name(date: NaiveDate) -> String {
    format!("class-report-{}.txt", date.format("%Y-%m-%d"))
}

/// Plain-text export: one `key: value` line per figure under fixed section headers.
pub fn build_report(report: &ClassReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Class Report - {}", report.date.format("%B %-d, %Y"));
    let _ = writeln!(output);

    let _ = writeln!(output, "CLASS OVERVIEW");
    let _ = writeln!(output, "Total Students: {}", report.overview.total_students);
    let _ = writeln!(output, "Active Students: {}", report.overview.active_students);
    let _ = writeln!(output, "Average GPA: {:.2}", report.overview.average_gpa);
    let _ = writeln!(output);

    let _ = writeln!(output, "ATTENDANCE STATISTICS");
    let _ = writeln!(output, "Present Rate: {:.1}%", report.attendance.present_rate);
    let _ = writeln!(output, "Absent Rate: {:.1}%", report.attendance.absent_rate);
    let _ = writeln!(output, "Late Rate: {:.1}%", report.attendance.late_rate);
    let _ = writeln!(output);

    let _ = writeln!(output, "PERFORMANCE METRICS");
    let _ = writeln!(output, "Average Score: {:.1}%", report.performance.average_score);
    let _ = writeln!(output, "Highest Score: {:.1}%", report.performance.highest_score);
    let _ = writeln!(output, "Lowest Score: {:.1}%", report.performance.lowest_score);
    let _ = writeln!(
        output,
        "Total Assignments: {}",
        report.performance.total_assignments
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "GRADE DISTRIBUTION");
    if report.distribution.total() == 0 {
        let _ = writeln!(output, "No grades recorded.");
    } else {
        for letter in LetterGrade::ALL {
            let count = report.distribution.count(letter);
            if count > 0 {
                let _ = writeln!(output, "{letter}: {count} students");
            }
        }
    }

    output
}
