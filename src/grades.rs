use std::collections::{BTreeMap, HashSet};

use crate::models::{
    Alert, CategoryAverage, Grade, GradeCategory, GradeDistribution, LetterGrade,
    NotificationType, PerformanceMetrics, Priority, Student,
};
use crate::store::Repository;

/// Average raw scores below `warn` raise a medium alert, below `critical` a high one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeThresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            warn: 60.0,
            critical: 40.0,
        }
    }
}

pub fn percentage(grade: &Grade) -> f64 {
    grade.score / grade.max_score * 100.0
}

pub fn letter_grade(percentage: f64) -> LetterGrade {
    if percentage >= 90.0 {
        LetterGrade::A
    } else if percentage >= 80.0 {
        LetterGrade::B
    } else if percentage >= 70.0 {
        LetterGrade::C
    } else if percentage >= 60.0 {
        LetterGrade::D
    } else {
        LetterGrade::F
    }
}

/// Lower bound of each band and the grade point it earns, highest first.
const GPA_BANDS: [(f64, f64); 11] = [
    (97.0, 4.0),
    (93.0, 3.7),
    (90.0, 3.3),
    (87.0, 3.0),
    (83.0, 2.7),
    (80.0, 2.3),
    (77.0, 2.0),
    (73.0, 1.7),
    (70.0, 1.3),
    (67.0, 1.0),
    (65.0, 0.7),
];

pub fn gpa_from_percentage(percentage: f64) -> f64 {
    GPA_BANDS
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Mean percentage of the student's grades mapped onto the 4.0 scale; 0 without grades.
pub fn student_gpa(student_id: u32, grades: &[Grade]) -> f64 {
    let percentages: Vec<f64> = grades
        .iter()
        .filter(|grade| grade.student_id == student_id)
        .map(percentage)
        .collect();
    if percentages.is_empty() {
        return 0.0;
    }
    let average = percentages.iter().sum::<f64>() / percentages.len() as f64;
    gpa_from_percentage(average)
}

pub fn grade_distribution(grades: &[Grade]) -> GradeDistribution {
    let mut distribution = GradeDistribution::default();
    for grade in grades {
        distribution.add(letter_grade(percentage(grade)));
    }
    distribution
}

/// Distribution over grades of students in `department`; an empty name means everyone.
pub fn department_distribution(
    grades: &[Grade],
    students: &[Student],
    department: &str,
) -> GradeDistribution {
    let ids: HashSet<u32> = students
        .iter()
        .filter(|student| department.is_empty() || student.department == department)
        .map(|student| student.id)
        .collect();
    let selected: Vec<Grade> = grades
        .iter()
        .filter(|grade| ids.contains(&grade.student_id))
        .cloned()
        .collect();
    grade_distribution(&selected)
}

/// Average percentage per category, in category order, skipping empty categories.
pub fn category_averages(grades: &[Grade]) -> Vec<CategoryAverage> {
    let mut totals: BTreeMap<GradeCategory, (f64, usize)> = BTreeMap::new();
    for grade in grades {
        let entry = totals.entry(grade.category).or_insert((0.0, 0));
        entry.0 += percentage(grade);
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|(category, (sum, count))| CategoryAverage {
            category,
            average: sum / count as f64,
            count,
        })
        .collect()
}

/// Compares each student's mean *raw* score, not the percentage, with the
/// thresholds. Grades out of anything other than 100 are judged on the raw number.
pub fn failing_grade_alerts(grades: &[Grade], thresholds: GradeThresholds) -> Vec<Alert> {
    let mut per_student: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for grade in grades {
        let entry = per_student.entry(grade.student_id).or_insert((0.0, 0));
        entry.0 += grade.score;
        entry.1 += 1;
    }

    per_student
        .into_iter()
        .filter_map(|(student_id, (sum, count))| {
            let average = sum / count as f64;
            if average >= thresholds.warn {
                return None;
            }
            let priority = if average < thresholds.critical {
                Priority::High
            } else {
                Priority::Medium
            };
            Some(Alert {
                kind: NotificationType::Grade,
                student_id,
                message: format!("Failing grade alert: {average:.1} average raw score"),
                priority,
            })
        })
        .collect()
}

pub fn performance_metrics(grades: &[Grade]) -> PerformanceMetrics {
    if grades.is_empty() {
        return PerformanceMetrics::default();
    }
    let percentages: Vec<f64> = grades.iter().map(percentage).collect();
    PerformanceMetrics {
        average_score: percentages.iter().sum::<f64>() / percentages.len() as f64,
        highest_score: percentages.iter().copied().fold(f64::MIN, f64::max),
        lowest_score: percentages.iter().copied().fold(f64::MAX, f64::min),
        total_assignments: grades.len(),
    }
}

pub async fn grades_for_student<R>(repo: &R, student_id: u32) -> Vec<Grade>
where
    R: Repository<Grade> + ?Sized,
{
    repo.find(&move |grade: &Grade| grade.student_id == student_id)
        .await
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::StudentStatus;

    fn grade(student_id: u32, category: GradeCategory, score: f64, max_score: f64) -> Grade {
        Grade {
            id: 0,
            student_id,
            assignment_name: "Work".to_string(),
            category,
            score,
            max_score,
            date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
        }
    }

    #[test]
    fn letter_bands_are_inclusive_at_lower_bound() {
        assert_eq!(letter_grade(90.0), LetterGrade::A);
        assert_eq!(letter_grade(89.999), LetterGrade::B);
        assert_eq!(letter_grade(80.0), LetterGrade::B);
        assert_eq!(letter_grade(79.999), LetterGrade::C);
        assert_eq!(letter_grade(70.0), LetterGrade::C);
        assert_eq!(letter_grade(60.0), LetterGrade::D);
        assert_eq!(letter_grade(59.999), LetterGrade::F);
    }

    #[test]
    fn gpa_follows_step_table() {
        assert_eq!(gpa_from_percentage(97.0), 4.0);
        assert_eq!(gpa_from_percentage(100.0), 4.0);
        assert_eq!(gpa_from_percentage(96.0), 3.7);
        assert_eq!(gpa_from_percentage(90.0), 3.3);
        assert_eq!(gpa_from_percentage(82.9), 2.3);
        assert_eq!(gpa_from_percentage(65.0), 0.7);
        assert_eq!(gpa_from_percentage(64.0), 0.0);
        assert_eq!(gpa_from_percentage(0.0), 0.0);
    }

    #[test]
    fn student_gpa_averages_percentages() {
        let grades = vec![
            grade(1, GradeCategory::Quiz, 19.0, 20.0), // 95
            grade(1, GradeCategory::Exam, 91.0, 100.0), // 91
            grade(2, GradeCategory::Exam, 10.0, 100.0),
        ];
        // mean 93 -> 3.7
        assert_eq!(student_gpa(1, &grades), 3.7);
        assert_eq!(student_gpa(3, &grades), 0.0);
    }

    #[test]
    fn distribution_counts_each_band() {
        let grades = vec![
            grade(1, GradeCategory::Quiz, 9.0, 10.0),
            grade(1, GradeCategory::Quiz, 8.0, 10.0),
            grade(2, GradeCategory::Test, 85.0, 100.0),
            grade(2, GradeCategory::Test, 59.0, 100.0),
        ];
        let distribution = grade_distribution(&grades);
        assert_eq!(distribution.a, 1);
        assert_eq!(distribution.b, 2);
        assert_eq!(distribution.f, 1);
        assert_eq!(distribution.total(), 4);
    }

    #[test]
    fn department_distribution_filters_by_roster() {
        let student = |id: u32, department: &str| Student {
            id,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            email: "a@b.c".to_string(),
            phone: "1".to_string(),
            grade_level: 9,
            department: department.to_string(),
            status: StudentStatus::Active,
            gpa: 3.0,
            enrollment_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
        };
        let students = vec![student(1, "Arts"), student(2, "Science")];
        let grades = vec![
            grade(1, GradeCategory::Quiz, 9.5, 10.0),
            grade(2, GradeCategory::Quiz, 5.0, 10.0),
            grade(3, GradeCategory::Quiz, 7.0, 10.0),
        ];

        let arts = department_distribution(&grades, &students, "Arts");
        assert_eq!(arts.total(), 1);
        assert_eq!(arts.a, 1);

        // Grades of students missing from the roster are left out.
        assert_eq!(department_distribution(&grades, &students, "").total(), 2);
    }

    #[test]
    fn category_averages_use_percentages() {
        let grades = vec![
            grade(1, GradeCategory::Exam, 45.0, 50.0),
            grade(2, GradeCategory::Exam, 70.0, 100.0),
            grade(1, GradeCategory::Assignment, 10.0, 10.0),
        ];
        let averages = category_averages(&grades);
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].category, GradeCategory::Assignment);
        assert_eq!(averages[0].average, 100.0);
        assert_eq!(averages[1].category, GradeCategory::Exam);
        assert_eq!(averages[1].count, 2);
        assert!((averages[1].average - 80.0).abs() < 1e-9);
    }

    #[test]
    fn failing_alerts_use_raw_scores() {
        let grades = vec![
            // 18/20 is 90% but a raw 18 counts as failing.
            grade(1, GradeCategory::Quiz, 18.0, 20.0),
            grade(2, GradeCategory::Exam, 50.0, 100.0),
            grade(2, GradeCategory::Exam, 60.0, 100.0),
            grade(3, GradeCategory::Exam, 60.0, 100.0),
        ];
        let alerts = failing_grade_alerts(&grades, GradeThresholds::default());

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].student_id, 1);
        assert_eq!(alerts[0].priority, Priority::High);
        assert_eq!(alerts[0].message, "Failing grade alert: 18.0 average raw score");
        assert_eq!(alerts[1].student_id, 2);
        assert_eq!(alerts[1].priority, Priority::Medium);
        assert_eq!(alerts[1].kind, NotificationType::Grade);
    }

    #[test]
    fn performance_metrics_handle_empty_input() {
        assert_eq!(performance_metrics(&[]), PerformanceMetrics::default());

        let grades = vec![
            grade(1, GradeCategory::Quiz, 5.0, 10.0),
            grade(1, GradeCategory::Quiz, 10.0, 10.0),
        ];
        let metrics = performance_metrics(&grades);
        assert_eq!(metrics.average_score, 75.0);
        assert_eq!(metrics.highest_score, 100.0);
        assert_eq!(metrics.lowest_score, 50.0);
        assert_eq!(metrics.total_assignments, 2);
    }
}
