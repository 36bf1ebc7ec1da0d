//! Temporal service: delayed, cancellable event injection.
//!
//! Every timer is a tokio task sleeping for its duration. The pending map is
//! the single decision point: whichever of the firing task and `cancel`
//! removes the entry first wins, so a timer fires at most once and a
//! cancelled timer never fires. A fired timer does not touch instance state
//! itself; it posts the event through an [`EventSink`] from the blocking
//! pool, which enters the target's serialized dispatch path.

use crate::error::CoreError;
use crate::event::Payload;
use crate::instance::InstanceRef;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(uuid::Uuid);

impl TimerId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Receiver of fired timer events.
pub trait EventSink: Send + Sync {
    fn post(&self, target: &InstanceRef, event: &str, payload: Payload);
}

struct PendingTimer {
    target: InstanceRef,
    event: String,
    fire_at: Instant,
    abort: Option<AbortHandle>,
}

/// Schedules events for later delivery.
pub struct TimerService {
    pending: Arc<DashMap<TimerId, PendingTimer>>,
    sink: Weak<dyn EventSink>,
    driver: Option<Handle>,
}

impl TimerService {
    /// Creates a service posting to `sink`. `driver` is the tokio runtime used
    /// when `schedule` is called outside of one.
    pub fn new(sink: Weak<dyn EventSink>, driver: Option<Handle>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            sink,
            driver,
        }
    }

    /// Arranges for `event` to be dispatched to `target` once `delay` elapses.
    pub fn schedule(
        &self,
        target: &InstanceRef,
        delay: Duration,
        event: &str,
    ) -> Result<TimerId, CoreError> {
        let fire_at = Instant::now()
            .checked_add(delay)
            .ok_or(CoreError::InvalidDuration {
                secs: delay.as_secs_f64(),
            })?;
        let driver = Handle::try_current()
            .ok()
            .or_else(|| self.driver.clone())
            .ok_or(CoreError::NoTimerDriver)?;

        let id = TimerId::generate();
        self.pending.insert(
            id,
            PendingTimer {
                target: target.clone(),
                event: event.to_string(),
                fire_at,
                abort: None,
            },
        );

        let pending = self.pending.clone();
        let sink = self.sink.clone();
        let task = driver.spawn(async move {
            tokio::time::sleep(delay).await;

            let Some((_, timer)) = pending.remove(&id) else {
                return;
            };
            let Some(sink) = sink.upgrade() else {
                tracing::debug!("{} expired after its runtime was dropped", id);
                return;
            };

            tracing::info!(
                "{} expired; dispatching {} to {}",
                id,
                timer.event,
                timer.target
            );
            let posted = tokio::task::spawn_blocking(move || {
                sink.post(&timer.target, &timer.event, Payload::empty());
            })
            .await;
            if let Err(e) = posted {
                tracing::error!("{} dispatch failed: {}", id, e);
            }
        });

        // The task may already have fired and removed the entry.
        if let Some(mut entry) = self.pending.get_mut(&id) {
            entry.abort = Some(task.abort_handle());
        }

        tracing::debug!(
            "{} scheduled: {} to {} in {:?}",
            id,
            event,
            target,
            delay
        );
        Ok(id)
    }

    /// [`schedule`](Self::schedule) with the delay given in seconds.
    pub fn schedule_secs(
        &self,
        target: &InstanceRef,
        secs: f64,
        event: &str,
    ) -> Result<TimerId, CoreError> {
        let delay =
            Duration::try_from_secs_f64(secs).map_err(|_| CoreError::InvalidDuration { secs })?;
        self.schedule(target, delay, event)
    }

    /// Prevents a pending timer from firing. Returns false for unknown,
    /// fired or already cancelled timers.
    pub fn cancel(&self, id: &TimerId) -> bool {
        match self.pending.remove(id) {
            Some((_, timer)) => {
                if let Some(abort) = timer.abort {
                    abort.abort();
                }
                tracing::debug!("{} cancelled", id);
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer aimed at `target`.
    pub fn cancel_for(&self, target: &InstanceRef) -> usize {
        let ids: Vec<TimerId> = self
            .pending
            .iter()
            .filter(|entry| &entry.value().target == target)
            .map(|entry| *entry.key())
            .collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TimerId> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_pending(&self, id: &TimerId) -> bool {
        self.pending.contains_key(id)
    }

    /// Time left before a pending timer fires.
    pub fn remaining(&self, id: &TimerId) -> Option<Duration> {
        self.pending
            .get(id)
            .map(|timer| timer.fire_at.saturating_duration_since(Instant::now()))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
