//! Timer-driven loops.
//!
//! Every loop is a tokio task ticking on its own interval and listening on
//! a child of the engine's cancellation token. A tick that fails logs and
//! waits for the next one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use affinity_core::Result;

use crate::engine::Engine;

const MIN_PERIOD: Duration = Duration::from_secs(1);

fn from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60)).max(MIN_PERIOD)
}

fn from_hours(hours: f64) -> Duration {
    Duration::try_from_secs_f64(hours * 3600.0)
        .unwrap_or(MIN_PERIOD)
        .max(MIN_PERIOD)
}

fn log_tick<T>(task: &'static str, result: Result<T>) {
    if let Err(e) = result {
        warn!(task, error = %e, "Tick failed");
    }
}

impl Engine {
    /// Restore persisted state and spawn every loop. A second call while
    /// running does nothing.
    pub async fn start(self: &Arc<Self>) {
        if !self.handles.lock().is_empty() {
            warn!("Engine already started");
            return;
        }
        match self.restore_mood().await {
            Ok(mood) => debug!(mood = mood.label(), "Mood restored"),
            Err(e) => warn!(error = %e, "Failed to restore mood"),
        }

        let c = &self.config;
        let handles = vec![
            self.spawn_loop("decay", from_hours(c.engine.decay_interval_hours), |e, now| async move {
                log_tick("decay", e.decay_tick(now).await);
            }),
            self.spawn_loop("loneliness", from_minutes(c.loneliness.check_interval_minutes), |e, now| async move {
                log_tick("loneliness", e.loneliness_tick(now).await);
            }),
            self.spawn_loop("proactive", from_minutes(c.proactive.check_interval_minutes), |e, now| async move {
                log_tick("proactive", e.proactive_tick(now).await);
            }),
            self.spawn_loop("continuation", from_minutes(c.continuation.check_interval_minutes), |e, now| async move {
                log_tick("continuation", e.continuation_tick(now).await);
            }),
            self.spawn_loop(
                "idle_sweep",
                Duration::from_secs(c.continuation.idle_sweep_seconds).max(MIN_PERIOD),
                |e, now| async move {
                    e.idle_sweep(now).await;
                },
            ),
            self.spawn_loop("maintenance", from_hours(c.memory.maintenance_interval_hours), |e, now| async move {
                e.maintenance_tick(now).await;
            }),
            self.spawn_loop(
                "reminders",
                Duration::from_secs(c.reminders.poll_interval_seconds).max(MIN_PERIOD),
                |e, now| async move {
                    log_tick("reminders", e.reminder_tick(now).await);
                },
            ),
            self.spawn_loop("reminder_cleanup", from_minutes(c.reminders.cleanup_interval_minutes), |e, now| async move {
                log_tick("reminder_cleanup", e.reminder_cleanup(now).await);
            }),
            self.spawn_loop("mood", from_minutes(c.engine.mood_interval_minutes), |e, now| async move {
                e.mood_tick(now).await;
            }),
        ];
        let count = handles.len();
        self.handles.lock().extend(handles);
        info!(loops = count, persona = %c.general.persona_name, "Engine started");
    }

    /// Cancel every loop and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        self.state.cancel.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Loop task panicked");
            }
        }
        self.pool.close();
        info!("Engine stopped");
    }

    /// Whether [`Engine::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>, DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let engine = Arc::clone(self);
        let token = self.state.cancel.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, period_secs = period.as_secs(), "Loop started");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => tick(Arc::clone(&engine), Utc::now()).await,
                }
            }
            debug!(task = name, "Loop stopped");
        })
    }
}
