//! Per-user notification batching.
//!
//! Notifications are queued per recipient and written in batches: a user's batch is written as
//! soon as it reaches the size limit, and every queued batch is written once the queue has been
//! quiet for the batch delay. Each enqueue pushes the deadline back.

use crate::domain::notification::{NewNotification, NotificationPreferences};
use crate::storage::NotificationStore;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use utoipa::ToSchema;

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub batch_count: usize,
    pub total_notifications: usize,
    /// True while a timed flush is pending.
    pub is_processing: bool,
}

pub struct NotificationManager {
    store: Arc<dyn NotificationStore>,
    batches: Mutex<HashMap<String, Vec<NewNotification>>>,
    /// When the debounced flush fires; `None` when nothing is scheduled.
    flush_deadline: Mutex<Option<Instant>>,
    schedule: Notify,
    shutdown: Notify,
    batch_delay: Duration,
    max_batch_size: usize,
}

impl NotificationManager {
    pub fn new(store: Arc<dyn NotificationStore>, batch_delay: Duration, max_batch_size: usize) -> Self {
        Self {
            store,
            batches: Mutex::new(HashMap::new()),
            flush_deadline: Mutex::new(None),
            schedule: Notify::new(),
            shutdown: Notify::new(),
            batch_delay,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn with_defaults(store: Arc<dyn NotificationStore>) -> Self {
        Self::new(store, DEFAULT_BATCH_DELAY, DEFAULT_MAX_BATCH_SIZE)
    }

    /// Queues `notification` for `user_id`. Writes the user's batch right away when it is full,
    /// otherwise (re)schedules the debounced flush.
    pub async fn queue_notification(&self, user_id: &str, notification: NewNotification) {
        let full = {
            let mut batches = self.batches.lock().await;
            let batch = batches.entry(user_id.to_string()).or_default();
            batch.push(notification);
            batch.len() >= self.max_batch_size
        };

        if full {
            if let Err(e) = self.process_batch(user_id).await {
                tracing::error!(user_id, error = %e, "failed to process notification batch");
            }
        } else {
            *self.flush_deadline.lock().await = Some(Instant::now() + self.batch_delay);
            self.schedule.notify_one();
        }
    }

    /// Writes one user's batch. Returns how many notifications were stored.
    ///
    /// On failure the batch goes back on the queue ahead of anything queued meanwhile.
    pub async fn process_batch(&self, user_id: &str) -> anyhow::Result<usize> {
        let batch = self.batches.lock().await.remove(user_id);
        let Some(batch) = batch.filter(|b| !b.is_empty()) else {
            return Ok(0);
        };

        match self.deliver(user_id, &batch).await {
            Ok(written) => Ok(written),
            Err(e) => {
                let mut batches = self.batches.lock().await;
                let entry = batches.entry(user_id.to_string()).or_default();
                let newer = std::mem::replace(entry, batch);
                entry.extend(newer);
                Err(e)
            }
        }
    }

    async fn deliver(&self, user_id: &str, batch: &[NewNotification]) -> anyhow::Result<usize> {
        let preferences = self
            .store
            .preferences(user_id)
            .await?
            .unwrap_or_default();
        let to_write = select_deliverable(batch, &preferences);
        if to_write.is_empty() {
            tracing::debug!(user_id, dropped = batch.len(), "notification batch filtered out");
            return Ok(0);
        }

        self.store.insert_notifications(user_id, &to_write).await?;
        tracing::debug!(user_id, written = to_write.len(), "notification batch stored");
        Ok(to_write.len())
    }

    async fn process_all_batches(&self) -> usize {
        let user_ids: Vec<String> = self.batches.lock().await.keys().cloned().collect();
        let mut written = 0;
        for user_id in user_ids {
            match self.process_batch(&user_id).await {
                Ok(n) => written += n,
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "failed to process notification batch")
                }
            }
        }
        written
    }

    /// Cancels the scheduled flush and writes every queued batch now.
    pub async fn flush(&self) -> usize {
        *self.flush_deadline.lock().await = None;
        self.process_all_batches().await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let batches = self.batches.lock().await;
        QueueStatus {
            batch_count: batches.len(),
            total_notifications: batches.values().map(Vec::len).sum(),
            is_processing: self.flush_deadline.lock().await.is_some(),
        }
    }

    /// Starts the task that performs debounced flushes.
    pub fn start_background_flush_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let deadline = *self.flush_deadline.lock().await;
                match deadline {
                    Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {
                                let due = {
                                    let mut current = self.flush_deadline.lock().await;
                                    if *current == Some(at) {
                                        *current = None;
                                        true
                                    } else {
                                        false
                                    }
                                };
                                if due {
                                    self.process_all_batches().await;
                                }
                            }
                            _ = self.schedule.notified() => {}
                            _ = self.shutdown.notified() => break,
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = self.schedule.notified() => {}
                            _ = self.shutdown.notified() => break,
                        }
                    }
                }
            }
            tracing::info!("notification flush task stopped");
        })
    }

    /// Stops the background task. Queued notifications stay queued; call [`flush`](Self::flush)
    /// to write them.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Applies preferences, then drops repeats of the same event keeping the first occurrence.
fn select_deliverable(batch: &[NewNotification], preferences: &NotificationPreferences) -> Vec<NewNotification> {
    if !preferences.notifications_enabled {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    batch
        .iter()
        .filter(|n| preferences.allows(n.notification_type))
        .filter(|n| seen.insert(n.dedup_key()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationType;
    use crate::storage::memory::MemoryStore;

    fn liked(related_id: &str, actor: &str) -> NewNotification {
        NewNotification::new(NotificationType::ContentLiked, "New like", "Someone liked your prompt")
            .with_related("prompt", related_id)
            .with_actor(actor)
    }

    fn manager(store: &Arc<MemoryStore>, max_batch_size: usize) -> Arc<NotificationManager> {
        Arc::new(NotificationManager::new(
            store.clone(),
            Duration::from_secs(5),
            max_batch_size,
        ))
    }

    #[test]
    fn duplicates_keep_the_first_occurrence() {
        let batch = vec![liked("p1", "a"), liked("p1", "a"), liked("p1", "b"), liked("p2", "a")];
        let out = select_deliverable(&batch, &NotificationPreferences::default());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn disabled_user_receives_nothing() {
        let prefs = NotificationPreferences {
            notifications_enabled: false,
            ..Default::default()
        };
        let batch = vec![NewNotification::new(NotificationType::AccountUpdate, "t", "m")];
        assert!(select_deliverable(&batch, &prefs).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_is_written_immediately() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, 3);

        manager.queue_notification("u1", liked("p1", "a")).await;
        manager.queue_notification("u1", liked("p2", "a")).await;
        assert_eq!(store.notification_count().await, 0);

        manager.queue_notification("u1", liked("p3", "a")).await;
        assert_eq!(store.notification_count().await, 3);
        assert_eq!(manager.queue_status().await.batch_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flush_is_debounced() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, 50);
        manager.clone().start_background_flush_task();

        manager.queue_notification("u1", liked("p1", "a")).await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        manager.queue_notification("u2", liked("p2", "b")).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.notification_count().await, 0);
        let status = manager.queue_status().await;
        assert_eq!(status.batch_count, 2);
        assert_eq!(status.total_notifications, 2);
        assert!(status.is_processing);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(store.notification_count().await, 2);
        assert!(!manager.queue_status().await.is_processing);

        manager.shutdown();
    }

    #[tokio::test]
    async fn preferences_filter_social_types() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_preferences(
                "u1",
                NotificationPreferences {
                    social_notifications: false,
                    ..Default::default()
                },
            )
            .await;
        let manager = manager(&store, 50);

        manager.queue_notification("u1", liked("p1", "a")).await;
        manager
            .queue_notification(
                "u1",
                NewNotification::new(NotificationType::MarketplaceSale, "Sale", "You sold a prompt"),
            )
            .await;
        assert_eq!(manager.flush().await, 1);

        let stored = store.list_notifications("u1", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].notification_type, NotificationType::MarketplaceSale);
    }

    #[tokio::test]
    async fn failed_write_keeps_batch_for_next_flush() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, 50);
        store.fail_notification_writes(1).await;

        manager.queue_notification("u1", liked("p1", "a")).await;
        assert_eq!(manager.flush().await, 0);
        assert_eq!(manager.queue_status().await.total_notifications, 1);

        assert_eq!(manager.flush().await, 1);
        assert_eq!(manager.queue_status().await.batch_count, 0);
    }
}
