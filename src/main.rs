use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use roster::attendance::{self, AttendanceThresholds};
use roster::config::Settings;
use roster::grades::{self, GradeThresholds};
use roster::models::{AttendanceStatus, LetterGrade, NotificationType};
use roster::notify::{self, NotificationFilter};
use roster::report;
use roster::seed;
use roster::store::{self, Latency, Repository};

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Student roster, attendance and grade tracker", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SettingsArgs {
    /// Directory holding students.json, attendance.json, grades.json, notifications.json
    #[arg(long, global = true)]
    seed_dir: Option<PathBuf>,
    /// Skip the simulated network delay
    #[arg(long, global = true)]
    no_latency: bool,
    #[arg(long, global = true, default_value_t = 80.0)]
    attendance_warn: f64,
    #[arg(long, global = true, default_value_t = 60.0)]
    attendance_critical: f64,
    #[arg(long, global = true, default_value_t = 60.0)]
    grade_warn: f64,
    #[arg(long, global = true, default_value_t = 40.0)]
    grade_critical: f64,
}

impl SettingsArgs {
    fn into_settings(self) -> Settings {
        Settings {
            seed_dir: self.seed_dir,
            latency: if self.no_latency {
                Latency::None
            } else {
                Latency::Simulated
            },
            attendance: AttendanceThresholds {
                warn: self.attendance_warn,
                critical: self.attendance_critical,
            },
            grades: GradeThresholds {
                warn: self.grade_warn,
                critical: self.grade_critical,
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the student roster
    Students {
        #[command(subcommand)]
        action: StudentCommand,
    },
    /// Mark attendance and view trends
    Attendance {
        #[command(subcommand)]
        action: AttendanceCommand,
    },
    /// Grade statistics
    Grades {
        #[command(subcommand)]
        action: GradeCommand,
    },
    /// Generate alert notifications and list the inbox
    Alerts {
        #[arg(long)]
        kind: Option<NotificationType>,
        #[arg(long)]
        unread: bool,
        /// List the inbox without generating new alerts
        #[arg(long)]
        no_generate: bool,
    },
    /// Headline numbers and the last week of attendance
    Dashboard {
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Write the plain-text class report
    Report {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Defaults to class-report-<date>.txt
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    List {
        #[arg(long, default_value = "")]
        department: String,
    },
    Search {
        query: String,
    },
    Departments,
    Show {
        id: u32,
    },
}

#[derive(Subcommand)]
enum AttendanceCommand {
    Mark {
        #[arg(long)]
        student: u32,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        status: AttendanceStatus,
        #[arg(long)]
        reason: Option<String>,
    },
    Trend {
        #[arg(long)]
        monthly: bool,
    },
    Rate {
        #[arg(long)]
        student: u32,
    },
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum GradeCommand {
    Gpa {
        #[arg(long)]
        student: u32,
    },
    Distribution {
        #[arg(long, default_value = "")]
        department: String,
    },
    Categories,
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roster=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings.into_settings();
    let store = settings.open_store().context("failed to load roster data")?;

    match cli.command {
        Commands::Students { action } => match action {
            StudentCommand::List { department } => {
                let students = store::students_in_department(&store.students, &department).await;
                for student in &students {
                    println!(
                        "- #{} {} ({}, grade {}, {}) GPA {:.2}",
                        student.id,
                        student.full_name(),
                        student.department,
                        student.grade_level,
                        student.status,
                        student.gpa
                    );
                }
                println!("{} students.", students.len());
            }
            StudentCommand::Search { query } => {
                let hits = store::search_students(&store.students, &query).await;
                if hits.is_empty() {
                    println!("No students match '{query}'.");
                }
                for student in hits {
                    println!("- #{} {} <{}>", student.id, student.full_name(), student.email);
                }
            }
            StudentCommand::Departments => {
                for department in store::departments(&store.students).await {
                    println!("- {department}");
                }
            }
            StudentCommand::Show { id } => {
                let student = store.students.get(id).await?;
                let records = attendance::records_for_student(&store.attendance, id).await;
                let grade_rows = grades::grades_for_student(&store.grades, id).await;
                println!("{} <{}>", student.full_name(), student.email);
                println!("Phone: {}", student.phone);
                println!(
                    "Grade {} in {}, {} since {}",
                    student.grade_level, student.department, student.status, student.enrollment_date
                );
                println!("Stored GPA: {:.2}", student.gpa);
                println!("Computed GPA: {:.1}", grades::student_gpa(id, &grade_rows));
                println!(
                    "Attendance: {:.1}% over {} marked days",
                    attendance::attendance_rate(id, &records),
                    records.len()
                );
            }
        },
        Commands::Attendance { action } => match action {
            AttendanceCommand::Mark {
                student,
                date,
                status,
                reason,
            } => {
                let (record, created) =
                    attendance::mark_attendance(&store.attendance, student, date, status, reason)
                        .await?;
                let verb = if created { "Marked" } else { "Updated" };
                println!(
                    "{verb} student #{} as {} on {}.",
                    record.student_id, record.status, record.date
                );
                let records = attendance::records_for_student(&store.attendance, student).await;
                println!(
                    "Attendance rate now {:.1}%.",
                    attendance::attendance_rate(student, &records)
                );
            }
            AttendanceCommand::Trend { monthly } => {
                let records = store.attendance.list().await;
                if records.is_empty() {
                    println!("No attendance recorded.");
                    return Ok(());
                }
                if monthly {
                    for point in attendance::monthly_trend(&records) {
                        print_counts(&point.month, &point.counts);
                    }
                } else {
                    for point in attendance::daily_trend(&records) {
                        print_counts(&point.date.to_string(), &point.counts);
                    }
                }
            }
            AttendanceCommand::Rate { student } => {
                let student = store.students.get(student).await?;
                let records = attendance::records_for_student(&store.attendance, student.id).await;
                println!(
                    "{}: {:.1}% attendance over {} marked days",
                    student.full_name(),
                    attendance::attendance_rate(student.id, &records),
                    records.len()
                );
            }
            AttendanceCommand::Import { csv } => {
                let inserted = seed::import_attendance_csv(&store.attendance, &csv).await?;
                println!("Inserted {inserted} attendance records from {}.", csv.display());
            }
        },
        Commands::Grades { action } => match action {
            GradeCommand::Gpa { student } => {
                let student = store.students.get(student).await?;
                let grade_rows = grades::grades_for_student(&store.grades, student.id).await;
                println!(
                    "{}: GPA {:.1} from {} grades (stored {:.2})",
                    student.full_name(),
                    grades::student_gpa(student.id, &grade_rows),
                    grade_rows.len(),
                    student.gpa
                );
            }
            GradeCommand::Distribution { department } => {
                let students = store.students.list().await;
                let grade_rows = store.grades.list().await;
                let distribution =
                    grades::department_distribution(&grade_rows, &students, &department);
                for letter in LetterGrade::ALL {
                    println!("{letter}: {}", distribution.count(letter));
                }
            }
            GradeCommand::Categories => {
                let grade_rows = store.grades.list().await;
                for average in grades::category_averages(&grade_rows) {
                    println!(
                        "- {}: {:.1}% across {} grades",
                        average.category, average.average, average.count
                    );
                }
            }
            GradeCommand::Import { csv } => {
                let inserted = seed::import_grades_csv(&store.grades, &csv).await?;
                println!("Inserted {inserted} grades from {}.", csv.display());
            }
        },
        Commands::Alerts {
            kind,
            unread,
            no_generate,
        } => {
            if !no_generate {
                let records = store.attendance.list().await;
                let grade_rows = store.grades.list().await;
                let attendance_alerts =
                    attendance::low_attendance_alerts(&records, settings.attendance);
                let grade_alerts = grades::failing_grade_alerts(&grade_rows, settings.grades);
                let created =
                    notify::generate(&store.notifications, &attendance_alerts, &grade_alerts)
                        .await?;
                println!("Generated {} notifications.", created.len());
            }

            let filter = NotificationFilter {
                kind,
                read: unread.then_some(false),
            };
            let inbox = filter.apply(&store.notifications.list().await);
            for notification in &inbox {
                let marker = if notification.is_read { " " } else { "*" };
                println!(
                    "{marker} #{} [{}] {} ({}): {}",
                    notification.id,
                    notification.priority,
                    notification.title,
                    notification.kind,
                    notification.message
                );
            }
            println!(
                "{} shown, {} unread.",
                inbox.len(),
                notify::unread_count(&store.notifications).await
            );
        }
        Commands::Dashboard { department, date } => {
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let students = store::students_in_department(&store.students, &department).await;
            let records = store.attendance.list().await;
            let stats = report::dashboard_stats(&students, &records, today);

            println!("Total students: {}", stats.total_students);
            println!("Active students: {}", stats.active_students);
            println!("Average GPA: {:.2}", stats.average_gpa);
            println!("Attendance rate ({today}): {:.1}%", stats.attendance_rate);
            println!();
            println!("Last 7 days:");
            for day in attendance::recent_trend(&records, &students, today, 7) {
                println!(
                    "- {} present {} absent {} ({:.0}%)",
                    day.date.format("%b %d"),
                    day.present,
                    day.absent,
                    day.rate
                );
            }
        }
        Commands::Report { date, out } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let students = store.students.list().await;
            let records = store.attendance.list().await;
            let grade_rows = store.grades.list().await;
            let compiled = report::compile(date, &students, &records, &grade_rows);
            let out = out.unwrap_or_else(|| PathBuf::from(report::report_file_name(date)));
            std::fs::write(&out, report::build_report(&compiled))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_counts(label: &str, counts: &roster::models::StatusCounts) {
    println!(
        "- {label}: {} present, {} absent, {} late of {} ({:.1}%)",
        counts.present,
        counts.absent,
        counts.late,
        counts.total(),
        counts.rate()
    );
}
