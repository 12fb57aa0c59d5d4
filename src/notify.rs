use chrono::Utc;

use crate::error::StoreError;
use crate::models::{
    Alert, NewNotification, Notification, NotificationPatch, NotificationType, Priority,
};
use crate::store::Repository;

fn alert_title(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::Attendance => "Low Attendance Alert",
        NotificationType::Grade => "Failing Grade Alert",
        NotificationType::System => "System Alert",
    }
}

/// Persists every alert as an unread notification flagged as emailed.
///
/// Attendance alerts come first, then grade alerts. Running this twice over the
/// same alerts stores them twice; nothing is deduplicated.
pub async fn generate<R>(
    repo: &R,
    attendance_alerts: &[Alert],
    grade_alerts: &[Alert],
) -> Result<Vec<Notification>, StoreError>
where
    R: Repository<Notification> + ?Sized,
{
    let now = Utc::now();
    let drafts: Vec<NewNotification> = attendance_alerts
        .iter()
        .chain(grade_alerts)
        .map(|alert| NewNotification {
            kind: alert.kind,
            title: alert_title(alert.kind).to_string(),
            message: alert.message.clone(),
            student_id: Some(alert.student_id),
            priority: alert.priority,
            is_read: false,
            created_at: now,
            email_sent: true,
        })
        .collect();

    let created = repo.create_batch(drafts).await?;
    tracing::info!(
        attendance = attendance_alerts.len(),
        grade = grade_alerts.len(),
        "generated {} notifications",
        created.len()
    );
    Ok(created)
}

/// A notification raised by hand rather than by threshold rules; never emailed.
pub async fn create<R>(
    repo: &R,
    kind: NotificationType,
    title: &str,
    message: &str,
    student_id: Option<u32>,
    priority: Priority,
) -> Result<Notification, StoreError>
where
    R: Repository<Notification> + ?Sized,
{
    repo.create(NewNotification {
        kind,
        title: title.to_string(),
        message: message.to_string(),
        student_id,
        priority,
        is_read: false,
        created_at: Utc::now(),
        email_sent: false,
    })
    .await
}

pub async fn mark_as_read<R>(repo: &R, id: u32) -> Result<Notification, StoreError>
where
    R: Repository<Notification> + ?Sized,
{
    repo.update(
        id,
        NotificationPatch {
            is_read: Some(true),
            ..NotificationPatch::default()
        },
    )
    .await
}

pub async fn mark_all_as_read<R>(repo: &R) -> Result<Vec<Notification>, StoreError>
where
    R: Repository<Notification> + ?Sized,
{
    repo.update_all(NotificationPatch {
        is_read: Some(true),
        ..NotificationPatch::default()
    })
    .await
}

/// Removes the notification outright.
pub async fn dismiss<R>(repo: &R, id: u32) -> Result<Notification, StoreError>
where
    R: Repository<Notification> + ?Sized,
{
    repo.delete(id).await
}

pub async fn unread_count<R>(repo: &R) -> usize
where
    R: Repository<Notification> + ?Sized,
{
    repo.list()
        .await
        .iter()
        .filter(|notification| !notification.is_read)
        .count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub kind: Option<NotificationType>,
    pub read: Option<bool>,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        self.kind.map_or(true, |kind| notification.kind == kind)
            && self.read.map_or(true, |read| notification.is_read == read)
    }

    pub fn apply(&self, notifications: &[Notification]) -> Vec<Notification> {
        notifications
            .iter()
            .filter(|notification| self.matches(notification))
            .cloned()
            .collect()
    }
}
