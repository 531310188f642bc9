// Task reminders: derive a notification from a task and schedule it

use crate::notify::{NotificationScheduler, ScheduleRequest};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::debug;

/// Zone-less layouts a form field may send, read as local time
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Task workflow status
///
/// Accepts the Spanish labels stored by earlier versions of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(alias = "Pendiente")]
    Pending,
    #[serde(alias = "En curso", alias = "En Progreso")]
    InProgress,
    #[serde(alias = "Finalizada", alias = "Completada")]
    Finished,
}

impl TaskStatus {
    /// Whether a task in this status still wants reminders
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Task as supplied by the task collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub notification_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default)]
    pub subject: String,
}

/// Parse a reminder time
///
/// RFC 3339 keeps its offset; `2025-03-23T08:00` style values (what a
/// datetime-local input produces) are taken as local time.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a due date, either a plain `YYYY-MM-DD` or a full date-time
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(raw).map(|dt| dt.with_timezone(&Local).date_naive()))
}

/// `null` and `""` both mean "not set"
fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}

fn lenient_datetime<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    match optional_text(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date-time '{}'", raw))),
    }
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    match optional_text(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date '{}'", raw))),
    }
}

/// Read one task or an array of tasks
///
/// Each element is decoded on its own, so one unreadable task does not
/// hide the others. Fails only when `content` is not JSON at all.
pub fn read_tasks(content: &str) -> Result<Vec<Result<Task, serde_json::Error>>, serde_json::Error> {
    let entries = match serde_json::from_str::<serde_json::Value>(content)? {
        serde_json::Value::Array(list) => list,
        single => vec![single],
    };
    Ok(entries.into_iter().map(serde_json::from_value::<Task>).collect())
}

/// Build the reminder for `task`, or `None` when it should not get one
///
/// A task gets a reminder only when it has a notification date strictly
/// after `now` and is still pending or in progress.
pub fn reminder_for(task: &Task, now: DateTime<Utc>) -> Option<ScheduleRequest> {
    let at = task.notification_date?;
    if !task.status.is_open() || at <= now {
        return None;
    }

    let due = task
        .due_date
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "no due date".to_string());

    Some(ScheduleRequest {
        title: format!("Reminder: {}", task.title),
        body: format!("You have a task due on {}. Subject: {}", due, task.subject),
        scheduled_at: at,
        id: Some(task.id),
    })
}

/// Keeps task reminders in step with tasks
pub struct TaskNotificationBinder<'a> {
    scheduler: &'a NotificationScheduler,
    enabled: bool,
}

impl<'a> TaskNotificationBinder<'a> {
    /// `enabled` mirrors the user's task-reminder setting
    pub fn new(scheduler: &'a NotificationScheduler, enabled: bool) -> Self {
        Self { scheduler, enabled }
    }

    /// Schedule (or reschedule) the reminder for `task`
    ///
    /// Returns the scheduler's id when a schedule call was made.
    pub async fn bind(&self, task: &Task) -> Option<i64> {
        self.bind_at(task, Utc::now()).await
    }

    /// [`bind`](Self::bind) with an explicit clock
    pub async fn bind_at(&self, task: &Task, now: DateTime<Utc>) -> Option<i64> {
        if !self.enabled {
            debug!(task_id = task.id, "Task reminders disabled");
            return None;
        }

        let Some(request) = reminder_for(task, now) else {
            debug!(task_id = task.id, "Task does not qualify for a reminder");
            return None;
        };

        Some(self.scheduler.schedule(request).await)
    }

    /// Drop the reminder for a finished or deleted task
    pub async fn release(&self, task_id: i64) {
        self.scheduler.cancel(task_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingBridge;
    use crate::notify::{NOT_SCHEDULED, NotificationBridge, NotificationStyle};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap()
    }

    fn task(id: i64, notification_date: Option<DateTime<Utc>>, status: TaskStatus) -> Task {
        Task {
            id,
            title: "Homework".to_string(),
            due_date: Some(NaiveDate::from_ymd_opt(2025, 3, 22).unwrap()),
            notification_date,
            status,
            subject: "Math".to_string(),
        }
    }

    fn scheduler(bridge: &Arc<RecordingBridge>) -> NotificationScheduler {
        NotificationScheduler::new(Some(bridge.clone() as Arc<dyn NotificationBridge>), NotificationStyle::default())
    }

    #[tokio::test]
    async fn test_past_notification_date_schedules_nothing() {
        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, true);

        let yesterday = now() - Duration::days(1);
        assert_eq!(binder.bind_at(&task(5, Some(yesterday), TaskStatus::Pending), now()).await, None);
        assert_eq!(bridge.schedule_calls(), 0);
    }

    #[tokio::test]
    async fn test_future_pending_task_schedules_reminder() {
        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, true);

        let tomorrow = now() + Duration::days(1);
        let id = binder.bind_at(&task(7, Some(tomorrow), TaskStatus::Pending), now()).await;
        assert_eq!(id, Some(7));

        let scheduled = bridge.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, 7);
        assert_eq!(scheduled[0].title, "Reminder: Homework");
        assert_eq!(scheduled[0].body, "You have a task due on 22/03/2025. Subject: Math");
        assert_eq!(scheduled[0].scheduled_at, tomorrow);
    }

    #[tokio::test]
    async fn test_closed_or_undated_tasks_schedule_nothing() {
        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, true);

        let tomorrow = now() + Duration::days(1);
        assert_eq!(binder.bind_at(&task(1, Some(tomorrow), TaskStatus::Finished), now()).await, None);
        assert_eq!(binder.bind_at(&task(2, None, TaskStatus::Pending), now()).await, None);
        // Exactly now is not strictly later
        assert_eq!(binder.bind_at(&task(3, Some(now()), TaskStatus::InProgress), now()).await, None);
        assert_eq!(bridge.schedule_calls(), 0);
    }

    #[tokio::test]
    async fn test_rebinding_replaces_reminder() {
        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, true);

        let mut t = task(9, Some(now() + Duration::hours(2)), TaskStatus::Pending);
        binder.bind_at(&t, now()).await;
        t.title = "Essay".to_string();
        t.notification_date = Some(now() + Duration::hours(5));
        binder.bind_at(&t, now()).await;

        let pending = scheduler.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Reminder: Essay");

        binder.release(9).await;
        assert!(scheduler.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_reminders_schedule_nothing() {
        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, false);

        let tomorrow = now() + Duration::days(1);
        assert_eq!(binder.bind_at(&task(7, Some(tomorrow), TaskStatus::Pending), now()).await, None);
        assert_eq!(bridge.schedule_calls(), 0);
    }

    #[tokio::test]
    async fn test_web_platform_returns_sentinel() {
        let scheduler = NotificationScheduler::new(None, NotificationStyle::default());
        let binder = TaskNotificationBinder::new(&scheduler, true);

        let tomorrow = now() + Duration::days(1);
        let id = binder.bind_at(&task(7, Some(tomorrow), TaskStatus::Pending), now()).await;
        assert_eq!(id, Some(NOT_SCHEDULED));
    }

    #[test]
    fn test_missing_due_date_in_body() {
        let mut t = task(1, Some(now() + Duration::days(1)), TaskStatus::InProgress);
        t.due_date = None;
        let request = reminder_for(&t, now()).unwrap();
        assert_eq!(request.body, "You have a task due on no due date. Subject: Math");
    }

    #[test]
    fn test_task_deserializes_legacy_labels() {
        let json = r#"{
            "id": 3,
            "title": "Leer capítulo 5",
            "dueDate": "2025-03-24",
            "notificationDate": "2025-03-23T08:00:00Z",
            "status": "En curso",
            "subject": "Programación"
        }"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.due_date, NaiveDate::from_ymd_opt(2025, 3, 24));

        let finished: TaskStatus = serde_json::from_str("\"Finalizada\"").unwrap();
        assert_eq!(finished, TaskStatus::Finished);
        let pending: TaskStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert!(pending.is_open());
    }

    #[test]
    fn test_task_accepts_datetime_local_input() {
        let json = r#"{
            "id": 4,
            "title": "Exam",
            "dueDate": "2099-03-24",
            "notificationDate": "2099-03-23T08:00",
            "status": "Pendiente"
        }"#;
        let t: Task = serde_json::from_str(json).unwrap();

        let expected = Local
            .with_ymd_and_hms(2099, 3, 23, 8, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(t.notification_date, Some(expected));
        assert!(reminder_for(&t, now()).is_some());
    }

    #[tokio::test]
    async fn test_empty_dates_mean_no_reminder() {
        let json = r#"{"id": 6, "title": "Notes", "dueDate": "", "notificationDate": "", "status": "Pending"}"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.due_date, None);
        assert_eq!(t.notification_date, None);

        let bridge = Arc::new(RecordingBridge::default());
        let scheduler = scheduler(&bridge);
        let binder = TaskNotificationBinder::new(&scheduler, true);
        assert_eq!(binder.bind_at(&t, now()).await, None);
        assert_eq!(bridge.schedule_calls(), 0);
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_date("2025-03-24"), NaiveDate::from_ymd_opt(2025, 3, 24));
        assert_eq!(
            parse_datetime("2025-03-23T08:00:00+01:00"),
            Some(Utc.with_ymd_and_hms(2025, 3, 23, 7, 0, 0).unwrap())
        );
        assert!(parse_datetime("2025-03-23T08:00:30").is_some());
        assert_eq!(parse_datetime("tomorrow"), None);
        assert!(serde_json::from_str::<Task>(r#"{"id":1,"title":"x","notificationDate":"soon","status":"Pending"}"#).is_err());
    }

    #[test]
    fn test_read_tasks_keeps_going_past_bad_entries() {
        let content = r#"[
            {"id": 1, "title": "a", "notificationDate": "2099-03-23T08:00", "status": "Pending"},
            {"id": 2, "title": "b", "notificationDate": "someday", "status": "Pending"},
            {"id": 3, "title": "c", "notificationDate": "", "status": "En curso"}
        ]"#;
        let tasks = read_tasks(content).unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks[0].is_ok());
        assert!(tasks[1].is_err());
        assert_eq!(tasks[2].as_ref().unwrap().notification_date, None);

        let single = read_tasks(r#"{"id": 4, "title": "d", "status": "Finalizada"}"#).unwrap();
        assert_eq!(single[0].as_ref().unwrap().status, TaskStatus::Finished);

        assert!(read_tasks("not json").is_err());
    }
}
