//! Periodic scan for due tasks.
//!
//! One loop per process. Each cycle runs to completion before the next tick,
//! so a task is never fired twice concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::assistant::database::Database;
use crate::assistant::tasks::{deployment_now, Task};

/// Delivers a due-task message to a user identity.
pub trait Notifier: Send + Sync {
    fn notify(&self, identity: &str, text: &str) -> impl Future<Output = Result<(), String>> + Send;
}

/// Counts from one scheduler cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub removed: usize,
    /// Tasks whose store update failed. Delivery failures are not counted here.
    pub failed: usize,
    /// Stored rows that could not be decoded and were skipped.
    pub unreadable: usize,
}

enum Outcome {
    Rescheduled,
    Removed,
    Vanished,
}

pub struct Scheduler<N> {
    database: Arc<Database>,
    notifier: Arc<N>,
    interval: Duration,
    offset: FixedOffset,
}

impl<N: Notifier + 'static> Scheduler<N> {
    pub fn new(database: Arc<Database>, notifier: Arc<N>, interval: Duration, offset: FixedOffset) -> Self {
        Self { database, notifier, interval, offset }
    }

    /// Run the loop on a background task for the life of the process.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(self) {
        info!(
            "Scheduler started (every {}s, UTC{:+})",
            self.interval.as_secs(),
            self.offset.local_minus_utc() / 3600
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = deployment_now(self.offset);
            let report = self.poll_once(now).await;
            if report.due > 0 || report.unreadable > 0 {
                info!(
                    "Scheduler cycle at {}: {} due, {} delivered, {} rescheduled, {} removed, {} failed, {} unreadable",
                    now,
                    report.due,
                    report.delivered,
                    report.rescheduled,
                    report.removed,
                    report.failed,
                    report.unreadable
                );
            }
        }
    }

    /// Fire every task due at `now`, in store order.
    pub async fn poll_once(&self, now: NaiveDateTime) -> CycleReport {
        let mut report = CycleReport::default();

        let scan = match self.database.scan_tasks() {
            Ok(scan) => scan,
            Err(e) => {
                error!("Scheduler failed to load tasks: {}", e);
                return report;
            }
        };
        report.unreadable = scan.unreadable;

        let due: Vec<Task> = scan.tasks.into_iter().filter(|t| t.is_due(now)).collect();
        debug!("{} task(s) due at {}", due.len(), now);

        for task in due {
            report.due += 1;
            match self.fire(task.id, &mut report).await {
                Ok(Outcome::Rescheduled) => report.rescheduled += 1,
                Ok(Outcome::Removed) => report.removed += 1,
                Ok(Outcome::Vanished) => {}
                Err(e) => {
                    warn!("Failed to fire task #{}: {}", task.id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Notify the owner, then apply the recurrence policy.
    async fn fire(&self, task_id: i64, report: &mut CycleReport) -> Result<Outcome, String> {
        // The task may have been removed since the scan.
        let Some(task) = self.database.get_task(task_id)? else {
            debug!("Task #{} disappeared before firing", task_id);
            return Ok(Outcome::Vanished);
        };

        match self.notifier.notify(&task.owner, &format_reminder(&task)).await {
            Ok(()) => {
                info!("Delivered task #{} to {}", task.id, task.owner);
                report.delivered += 1;
            }
            Err(e) => warn!("Failed to deliver task #{} to {}: {}", task.id, task.owner, e),
        }

        match task.recurrence.period() {
            Some(period) => {
                let next = task.due_at + period;
                if !self.database.reschedule_task(task.id, next)? {
                    return Ok(Outcome::Vanished);
                }
                info!("Rescheduled task #{} to {}", task.id, next);
                Ok(Outcome::Rescheduled)
            }
            None => {
                if !self.database.delete_task(task.id)? {
                    return Ok(Outcome::Vanished);
                }
                info!("Removed one-time task #{}", task.id);
                Ok(Outcome::Removed)
            }
        }
    }
}

pub fn format_reminder(task: &Task) -> String {
    format!(
        "Reminder: {}\nScheduled for: {}",
        task.text,
        task.due_at.format("%Y-%m-%d %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::tasks::{deployment_offset, Recurrence, TaskDraft};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, identity: &str, text: &str) -> Result<(), String> {
            self.sent.lock().unwrap().push((identity.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        async fn notify(&self, _identity: &str, _text: &str) -> Result<(), String> {
            Err("chat not found".to_string())
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap().and_hms_opt(15, 30, 0).unwrap()
    }

    fn scheduler<N: Notifier + 'static>(db: Arc<Database>, notifier: Arc<N>) -> Scheduler<N> {
        Scheduler::new(db, notifier, Duration::from_secs(60), deployment_offset(3))
    }

    fn add(db: &Database, owner: &str, text: &str, due_at: NaiveDateTime, recurrence: Recurrence) -> i64 {
        db.add_task(owner, &TaskDraft { text: text.to_string(), due_at, recurrence }).unwrap()
    }

    #[tokio::test]
    async fn test_one_time_task_fires_and_is_removed() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let id = add(&db, "100", "Meeting with Oleg", now() - chrono::Duration::seconds(1), Recurrence::None);

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "100");
        assert!(sent[0].1.contains("Meeting with Oleg"));
        assert!(db.get_task(id).unwrap().is_none());
        assert_eq!(report, CycleReport { due: 1, delivered: 1, removed: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_recurring_tasks_advance_by_one_period() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let due = now() - chrono::Duration::seconds(1);
        let daily = add(&db, "100", "Stand-up", due, Recurrence::Daily);
        let weekly = add(&db, "100", "Review", due, Recurrence::Weekly);

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        assert_eq!(report.rescheduled, 2);
        assert_eq!(db.get_task(daily).unwrap().unwrap().due_at, due + chrono::Duration::hours(24));
        assert_eq!(db.get_task(weekly).unwrap().unwrap().due_at, due + chrono::Duration::days(7));
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_each_due_task_notified_once_and_future_tasks_untouched() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        add(&db, "1", "exactly now", now(), Recurrence::None);
        add(&db, "2", "long overdue", now() - chrono::Duration::days(3), Recurrence::None);
        let future = add(&db, "3", "later", now() + chrono::Duration::minutes(5), Recurrence::None);

        scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        let mut owners: Vec<_> = notifier.sent().into_iter().map(|(o, _)| o).collect();
        owners.sort();
        assert_eq!(owners, vec!["1", "2"]);
        assert!(db.get_task(future).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_idle_cycle_does_nothing() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let id = add(&db, "1", "tomorrow", now() + chrono::Duration::days(1), Recurrence::Daily);
        let before = db.list_tasks().unwrap();

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        assert_eq!(report, CycleReport::default());
        assert!(notifier.sent().is_empty());
        assert_eq!(db.list_tasks().unwrap(), before);
        assert!(db.get_task(id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delivery_failure_still_applies_recurrence() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(FailingNotifier);
        let due = now() - chrono::Duration::minutes(1);
        let once = add(&db, "1", "once", due, Recurrence::None);
        let daily = add(&db, "1", "daily", due, Recurrence::Daily);

        let report = scheduler(db.clone(), notifier).poll_once(now()).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.removed, 1);
        assert_eq!(report.rescheduled, 1);
        assert!(db.get_task(once).unwrap().is_none());
        assert_eq!(db.get_task(daily).unwrap().unwrap().due_at, due + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_second_cycle_does_not_refire() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        add(&db, "1", "daily", now() - chrono::Duration::seconds(1), Recurrence::Daily);
        let scheduler = scheduler(db.clone(), notifier.clone());

        scheduler.poll_once(now()).await;
        let report = scheduler.poll_once(now()).await;

        assert_eq!(report.due, 0);
        assert_eq!(notifier.sent().len(), 1);
    }

    /// Deletes a task from inside the first notification, simulating a user
    /// removing it mid-cycle.
    struct DeletingNotifier {
        db: Arc<Database>,
        victim: i64,
        sent: Mutex<usize>,
    }

    impl Notifier for DeletingNotifier {
        async fn notify(&self, _identity: &str, _text: &str) -> Result<(), String> {
            self.db.delete_task(self.victim)?;
            *self.sent.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_task_deleted_between_scan_and_fire_is_skipped() {
        let db = Arc::new(Database::new().unwrap());
        let due = now() - chrono::Duration::seconds(1);
        add(&db, "1", "first", due, Recurrence::Daily);
        let second = add(&db, "1", "second", due, Recurrence::None);
        let notifier = Arc::new(DeletingNotifier { db: db.clone(), victim: second, sent: Mutex::new(0) });

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        assert_eq!(report.due, 2);
        assert_eq!(report.rescheduled, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(*notifier.sent.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_row_does_not_block_other_tasks() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let good = add(&db, "100", "Pay rent", now() - chrono::Duration::seconds(1), Recurrence::None);
        db.execute_raw(
            "INSERT INTO tasks (user_id, text, start_time)
             SELECT id, 'garbled', '2024-12-01T15:30:00.123+03:00' FROM users WHERE telegram_id = '100';",
        )
        .unwrap();

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        assert_eq!(
            report,
            CycleReport { due: 1, delivered: 1, removed: 1, unreadable: 1, ..Default::default() }
        );
        assert_eq!(notifier.sent().len(), 1);
        assert!(db.get_task(good).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_error_counts_as_failed_and_cycle_continues() {
        let db = Arc::new(Database::new().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        db.execute_raw(
            "CREATE TRIGGER keep_locked BEFORE DELETE ON tasks WHEN OLD.text = 'locked'
             BEGIN SELECT RAISE(ABORT, 'task is locked'); END;",
        )
        .unwrap();
        let due = now() - chrono::Duration::seconds(1);
        let locked = add(&db, "1", "locked", due, Recurrence::None);
        let after = add(&db, "1", "after", due, Recurrence::None);

        let report = scheduler(db.clone(), notifier.clone()).poll_once(now()).await;

        assert_eq!(
            report,
            CycleReport { due: 2, delivered: 2, removed: 1, failed: 1, ..Default::default() }
        );
        assert!(db.get_task(locked).unwrap().is_some());
        assert!(db.get_task(after).unwrap().is_none());
    }

    #[test]
    fn test_format_reminder() {
        let task = Task {
            id: 1,
            owner: "1".to_string(),
            text: "Call the client".to_string(),
            due_at: now(),
            recurrence: Recurrence::None,
            created_at: now(),
        };
        assert_eq!(format_reminder(&task), "Reminder: Call the client\nScheduled for: 2024-12-01 15:30");
    }
}
