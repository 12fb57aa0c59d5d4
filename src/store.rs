use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use crate::error::{StoreError, ValidationError};
use crate::models::{
    AttendancePatch, AttendanceRecord, Grade, GradePatch, NewAttendance, NewGrade,
    NewNotification, NewStudent, Notification, NotificationPatch, Student, StudentPatch,
};
use crate::seed::SeedData;
use crate::validation;

/// An entity kept in one of the store's collections.
pub trait Record: Clone + Send + Sync + 'static {
    const ENTITY: &'static str;

    /// Fields supplied on create; the store assigns the id.
    type Draft: Send + 'static;
    /// Partial fields for update; `None` leaves a field untouched.
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> u32;
    fn from_draft(id: u32, draft: Self::Draft) -> Self;
    fn apply(&mut self, patch: Self::Patch);

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn list(&self) -> Vec<T>;
    async fn get(&self, id: u32) -> Result<T, StoreError>;
    async fn find(&self, predicate: Predicate<'_, T>) -> Vec<T>;
    async fn create(&self, draft: T::Draft) -> Result<T, StoreError>;
    /// Creates every draft under one lock; nothing is stored if one fails validation.
    async fn create_batch(&self, drafts: Vec<T::Draft>) -> Result<Vec<T>, StoreError>;
    async fn update(&self, id: u32, patch: T::Patch) -> Result<T, StoreError>;
    async fn update_all(&self, patch: T::Patch) -> Result<Vec<T>, StoreError>;
    /// Patches the first record matching `key`, or creates `draft` when none does.
    /// Returns the record and whether it was created.
    async fn upsert(
        &self,
        key: Predicate<'_, T>,
        patch: T::Patch,
        draft: T::Draft,
    ) -> Result<(T, bool), StoreError>;
    async fn delete(&self, id: u32) -> Result<T, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Query,
    Create,
    Update,
    Delete,
}

/// Artificial delay applied before every store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latency {
    None,
    #[default]
    Simulated,
}

impl Latency {
    pub fn delay(&self, operation: Operation) -> Duration {
        let millis = match (self, operation) {
            (Latency::None, _) => 0,
            (Latency::Simulated, Operation::List) => 300,
            (Latency::Simulated, Operation::Get) => 200,
            (Latency::Simulated, Operation::Query) => 250,
            (Latency::Simulated, Operation::Create) => 400,
            (Latency::Simulated, Operation::Update) => 400,
            (Latency::Simulated, Operation::Delete) => 300,
        };
        Duration::from_millis(millis)
    }

    async fn wait(&self, operation: Operation) {
        let delay = self.delay(operation);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub entity: &'static str,
    pub change: Change,
    pub id: u32,
}

struct Table<T> {
    rows: Vec<T>,
    next_id: u32,
}

impl<T: Record> Table<T> {
    fn insert(&mut self, draft: T::Draft) -> Result<T, StoreError> {
        let record = T::from_draft(self.next_id, draft);
        record.validate()?;
        self.next_id += 1;
        self.rows.push(record.clone());
        Ok(record)
    }

    fn not_found(id: u32) -> StoreError {
        StoreError::NotFound {
            entity: T::ENTITY,
            id,
        }
    }
}

/// In-memory collection backing a [`Repository`].
pub struct MemoryRepository<T> {
    table: Mutex<Table<T>>,
    latency: Latency,
    events: broadcast::Sender<StoreEvent>,
}

impl<T: Record> MemoryRepository<T> {
    pub fn new(rows: Vec<T>, latency: Latency, events: broadcast::Sender<StoreEvent>) -> Self {
        let next_id = rows.iter().map(T::id).max().unwrap_or(0) + 1;
        Self {
            table: Mutex::new(Table { rows, next_id }),
            latency,
            events,
        }
    }

    fn emit(&self, change: Change, id: u32) {
        tracing::debug!(entity = T::ENTITY, ?change, id, "store mutation");
        // No subscribers is not an error.
        let _ = self.events.send(StoreEvent {
            entity: T::ENTITY,
            change,
            id,
        });
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn list(&self) -> Vec<T> {
        self.latency.wait(Operation::List).await;
        self.table.lock().await.rows.clone()
    }

    async fn get(&self, id: u32) -> Result<T, StoreError> {
        self.latency.wait(Operation::Get).await;
        let table = self.table.lock().await;
        table
            .rows
            .iter()
            .find(|row| row.id() == id)
            .cloned()
            .ok_or_else(|| Table::<T>::not_found(id))
    }

    async fn find(&self, predicate: Predicate<'_, T>) -> Vec<T> {
        self.latency.wait(Operation::Query).await;
        let table = self.table.lock().await;
        table.rows.iter().filter(|row| predicate(row)).cloned().collect()
    }

    async fn create(&self, draft: T::Draft) -> Result<T, StoreError> {
        self.latency.wait(Operation::Create).await;
        let record = self.table.lock().await.insert(draft)?;
        self.emit(Change::Created, record.id());
        Ok(record)
    }

    async fn create_batch(&self, drafts: Vec<T::Draft>) -> Result<Vec<T>, StoreError> {
        self.latency.wait(Operation::Create).await;
        let mut table = self.table.lock().await;
        let start = table.next_id;
        let records: Vec<T> = drafts
            .into_iter()
            .zip(start..)
            .map(|(draft, id)| T::from_draft(id, draft))
            .collect();
        for record in &records {
            record.validate()?;
        }
        table.next_id = start + records.len() as u32;
        table.rows.extend(records.iter().cloned());
        drop(table);

        for record in &records {
            self.emit(Change::Created, record.id());
        }
        Ok(records)
    }

    async fn update(&self, id: u32, patch: T::Patch) -> Result<T, StoreError> {
        self.latency.wait(Operation::Update).await;
        let mut table = self.table.lock().await;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or_else(|| Table::<T>::not_found(id))?;

        let mut merged = row.clone();
        merged.apply(patch);
        merged.validate()?;
        *row = merged.clone();
        drop(table);

        self.emit(Change::Updated, id);
        Ok(merged)
    }

    async fn update_all(&self, patch: T::Patch) -> Result<Vec<T>, StoreError> {
        self.latency.wait(Operation::Update).await;
        let mut table = self.table.lock().await;
        let mut merged = table.rows.clone();
        for row in merged.iter_mut() {
            row.apply(patch.clone());
            row.validate()?;
        }
        table.rows = merged.clone();
        drop(table);

        for row in &merged {
            self.emit(Change::Updated, row.id());
        }
        Ok(merged)
    }

    async fn upsert(
        &self,
        key: Predicate<'_, T>,
        patch: T::Patch,
        draft: T::Draft,
    ) -> Result<(T, bool), StoreError> {
        self.latency.wait(Operation::Update).await;
        let mut table = self.table.lock().await;

        if let Some(index) = table.rows.iter().position(|row| key(row)) {
            let mut merged = table.rows[index].clone();
            merged.apply(patch);
            merged.validate()?;
            table.rows[index] = merged.clone();
            drop(table);
            self.emit(Change::Updated, merged.id());
            return Ok((merged, false));
        }

        let record = table.insert(draft)?;
        drop(table);
        self.emit(Change::Created, record.id());
        Ok((record, true))
    }

    async fn delete(&self, id: u32) -> Result<T, StoreError> {
        self.latency.wait(Operation::Delete).await;
        let mut table = self.table.lock().await;
        let index = table
            .rows
            .iter()
            .position(|row| row.id() == id)
            .ok_or_else(|| Table::<T>::not_found(id))?;
        let removed = table.rows.remove(index);
        drop(table);

        self.emit(Change::Deleted, id);
        Ok(removed)
    }
}

/// Process-scoped container holding every collection.
pub struct Store {
    pub students: MemoryRepository<Student>,
    pub attendance: MemoryRepository<AttendanceRecord>,
    pub grades: MemoryRepository<Grade>,
    pub notifications: MemoryRepository<Notification>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(seed: SeedData, latency: Latency) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            students: MemoryRepository::new(seed.students, latency, events.clone()),
            attendance: MemoryRepository::new(seed.attendance, latency, events.clone()),
            grades: MemoryRepository::new(seed.grades, latency, events.clone()),
            notifications: MemoryRepository::new(seed.notifications, latency, events.clone()),
            events,
        }
    }

    /// Receives one event per mutation across all collections.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// Case-insensitive substring match over first name, last name and email.
pub async fn search_students<R>(repo: &R, query: &str) -> Vec<Student>
where
    R: Repository<Student> + ?Sized,
{
    let needle = query.to_lowercase();
    repo.find(&move |student: &Student| {
        student.first_name.to_lowercase().contains(&needle)
            || student.last_name.to_lowercase().contains(&needle)
            || student.email.to_lowercase().contains(&needle)
    })
    .await
}

pub async fn departments<R>(repo: &R) -> Vec<String>
where
    R: Repository<Student> + ?Sized,
{
    let mut names: Vec<String> = repo
        .list()
        .await
        .into_iter()
        .map(|student| student.department)
        .collect();
    names.sort();
    names.dedup();
    names
}

/// An empty department name selects the whole roster.
pub async fn students_in_department<R>(repo: &R, department: &str) -> Vec<Student>
where
    R: Repository<Student> + ?Sized,
{
    if department.is_empty() {
        return repo.list().await;
    }
    let department = department.to_string();
    repo.find(&move |student: &Student| student.department == department)
        .await
}

impl Record for Student {
    const ENTITY: &'static str = "Student";
    type Draft = NewStudent;
    type Patch = StudentPatch;

    fn id(&self) -> u32 {
        self.id
    }

    fn from_draft(id: u32, draft: NewStudent) -> Self {
        Student {
            id,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone: draft.phone,
            grade_level: draft.grade_level,
            department: draft.department,
            status: draft.status,
            gpa: draft.gpa,
            enrollment_date: draft
                .enrollment_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        }
    }

    fn apply(&mut self, patch: StudentPatch) {
        if let Some(value) = patch.first_name {
            self.first_name = value;
        }
        if let Some(value) = patch.last_name {
            self.last_name = value;
        }
        if let Some(value) = patch.email {
            self.email = value;
        }
        if let Some(value) = patch.phone {
            self.phone = value;
        }
        if let Some(value) = patch.grade_level {
            self.grade_level = value;
        }
        if let Some(value) = patch.department {
            self.department = value;
        }
        if let Some(value) = patch.status {
            self.status = value;
        }
        if let Some(value) = patch.gpa {
            self.gpa = value;
        }
        if let Some(value) = patch.enrollment_date {
            self.enrollment_date = value;
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_student(self)
    }
}

impl Record for AttendanceRecord {
    const ENTITY: &'static str = "Attendance record";
    type Draft = NewAttendance;
    type Patch = AttendancePatch;

    fn id(&self) -> u32 {
        self.id
    }

    fn from_draft(id: u32, draft: NewAttendance) -> Self {
        AttendanceRecord {
            id,
            student_id: draft.student_id,
            date: draft.date,
            status: draft.status,
            reason: draft.reason,
        }
    }

    fn apply(&mut self, patch: AttendancePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(reason) = patch.reason {
            self.reason = reason;
        }
    }
}

impl Record for Grade {
    const ENTITY: &'static str = "Grade";
    type Draft = NewGrade;
    type Patch = GradePatch;

    fn id(&self) -> u32 {
        self.id
    }

    fn from_draft(id: u32, draft: NewGrade) -> Self {
        Grade {
            id,
            student_id: draft.student_id,
            assignment_name: draft.assignment_name,
            category: draft.category,
            score: draft.score,
            max_score: draft.max_score,
            date: draft.date,
        }
    }

    fn apply(&mut self, patch: GradePatch) {
        if let Some(value) = patch.student_id {
            self.student_id = value;
        }
        if let Some(value) = patch.assignment_name {
            self.assignment_name = value;
        }
        if let Some(value) = patch.category {
            self.category = value;
        }
        if let Some(value) = patch.score {
            self.score = value;
        }
        if let Some(value) = patch.max_score {
            self.max_score = value;
        }
        if let Some(value) = patch.date {
            self.date = value;
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_grade(self)
    }
}

impl Record for Notification {
    const ENTITY: &'static str = "Notification";
    type Draft = NewNotification;
    type Patch = NotificationPatch;

    fn id(&self) -> u32 {
        self.id
    }

    fn from_draft(id: u32, draft: NewNotification) -> Self {
        Notification {
            id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            student_id: draft.student_id,
            priority: draft.priority,
            is_read: draft.is_read,
            created_at: draft.created_at,
            email_sent: draft.email_sent,
        }
    }

    fn apply(&mut self, patch: NotificationPatch) {
        if let Some(value) = patch.is_read {
            self.is_read = value;
        }
        if let Some(value) = patch.email_sent {
            self.email_sent = value;
        }
    }
}
