use crate::error::ValidationError;
use crate::models::{Grade, Student};

pub fn validate_student(student: &Student) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();

    if student.first_name.trim().is_empty() {
        errors.push("firstName", "First name is required");
    }
    if student.last_name.trim().is_empty() {
        errors.push("lastName", "Last name is required");
    }
    if student.email.trim().is_empty() {
        errors.push("email", "Email is required");
    } else if !looks_like_email(&student.email) {
        errors.push("email", "Email is invalid");
    }
    if student.phone.trim().is_empty() {
        errors.push("phone", "Phone number is required");
    }
    if !(9..=12).contains(&student.grade_level) {
        errors.push("gradeLevel", "Grade level must be between 9 and 12");
    }
    if !(0.0..=4.0).contains(&student.gpa) {
        errors.push("gpa", "GPA must be between 0.0 and 4.0");
    }

    errors.into_result()
}

pub fn validate_grade(grade: &Grade) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();

    if grade.assignment_name.trim().is_empty() {
        errors.push("assignmentName", "Assignment name is required");
    }
    if !grade.score.is_finite() || grade.score < 0.0 {
        errors.push("score", "Score must be zero or more");
    }
    if !grade.max_score.is_finite() || grade.max_score <= 0.0 {
        errors.push("maxScore", "Max score must be greater than zero");
    }

    errors.into_result()
}

/// Same shape the roster form accepts: `\S+@\S+\.\S+`.
fn looks_like_email(value: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    chars.iter().enumerate().any(|(at, &c)| {
        c == '@'
            && at > 0
            && !chars[at - 1].is_whitespace()
            && chars[at + 1..]
                .iter()
                .take_while(|c| !c.is_whitespace())
                .enumerate()
                .any(|(offset, &d)| {
                    d == '.'
                        && offset > 0
                        && chars
                            .get(at + 2 + offset)
                            .is_some_and(|next| !next.is_whitespace())
                })
    })
}
