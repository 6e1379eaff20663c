//! Background maintenance: reservation expiry and notification cleanup.
//!
//! Both jobs run on `tokio::time::interval` loops until the shutdown channel
//! flips to `true`. The cleanup is also exposed over HTTP.

use crate::app::TicketService;
use crate::metrics;
use crate::store::{NotificationRepository, RepositoryError};
use chrono::Duration as ChronoDuration;
use raffle_core::environment::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read notifications older than this are deleted.
pub const NOTIFICATION_RETENTION_DAYS: i64 = 30;

/// Delete read notifications older than the retention window.
///
/// Returns the number of deleted rows.
///
/// # Errors
///
/// Returns [`RepositoryError`] if the delete fails.
pub async fn cleanup_notifications(
    notifications: &dyn NotificationRepository,
    clock: &dyn Clock,
) -> Result<u64, RepositoryError> {
    let cutoff = clock.now() - ChronoDuration::days(NOTIFICATION_RETENTION_DAYS);
    let deleted = notifications.delete_read_before(cutoff).await?;
    metrics::record_notifications_deleted(deleted);
    info!(deleted, %cutoff, "Old read notifications cleaned up");
    Ok(deleted)
}

/// Spawn the reservation sweeper. Returns `None` when `interval` is zero.
#[must_use]
pub fn spawn_expiry_sweeper(
    service: TicketService,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("Reservation sweeper disabled");
        return None;
    }
    Some(spawn_periodic("reservation_sweeper", interval, shutdown, move || {
        let service = service.clone();
        async move {
            match service.expire_reservations().await {
                Ok(released) => debug!(released, "Reservation sweep finished"),
                Err(error) => warn!(%error, "Reservation sweep failed"),
            }
        }
    }))
}

/// Spawn the notification cleanup job. Returns `None` when `interval` is zero.
#[must_use]
pub fn spawn_notification_cleanup(
    notifications: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("Notification cleanup disabled");
        return None;
    }
    Some(spawn_periodic("notification_cleanup", interval, shutdown, move || {
        let notifications = Arc::clone(&notifications);
        let clock = Arc::clone(&clock);
        async move {
            if let Err(error) = cleanup_notifications(notifications.as_ref(), clock.as_ref()).await
            {
                warn!(%error, "Notification cleanup failed");
            }
        }
    }))
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!(job = name, period_secs = period.as_secs(), "Background job started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(job = name, "Background job stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Notification, NotificationId};
    use raffle_testing::test_clock;
    use uuid::Uuid;

    fn notification(read: bool, age_days: i64) -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: Uuid::new_v4(),
            organization_id: None,
            title: "Pago".into(),
            message: "Nuevo pago".into(),
            read,
            created_at: test_clock().now() - ChronoDuration::days(age_days),
        }
    }

    #[tokio::test]
    async fn deletes_only_old_read_notifications() {
        let store = MemoryStore::new();
        for n in [
            notification(true, 31),
            notification(true, 45),
            notification(false, 60),
            notification(true, 29),
        ] {
            store.insert_notification(&n).await.unwrap();
        }

        let deleted = cleanup_notifications(&store, &test_clock()).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.count_notifications().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn periodic_job_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let handle = spawn_periodic("test", Duration::from_millis(10), rx, move || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(counter.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    fn zero_interval_disables_cleanup() {
        let (_tx, rx) = watch::channel(false);
        let handle = spawn_notification_cleanup(
            Arc::new(MemoryStore::new()),
            Arc::new(test_clock()),
            Duration::ZERO,
            rx,
        );
        assert!(handle.is_none());
    }
}
