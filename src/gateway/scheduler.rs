//! Periodic task scheduler
//!
//! Each periodic task is an interval loop that only emits a [`TaskKind`] tick
//! to the gateway coordinator; the work itself runs on the coordinator task.
//! At most one tick per kind is pending at a time: a tick firing while the
//! previous one of the same kind has not been taken by the coordinator is
//! dropped rather than queued.

use crate::observability::metrics;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    Reconnect,
    Sampling,
    CloudRelay,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Reconnect, TaskKind::Sampling, TaskKind::CloudRelay];

    const fn index(&self) -> usize {
        match self {
            TaskKind::Reconnect => 0,
            TaskKind::Sampling => 1,
            TaskKind::CloudRelay => 2,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            TaskKind::Reconnect => "reconnect",
            TaskKind::Sampling => "sampling",
            TaskKind::CloudRelay => "cloud_relay",
        }
    }

    pub const fn bounds(&self) -> PeriodBounds {
        match self {
            TaskKind::Reconnect => PeriodBounds::from_secs(5, 180, 15),
            TaskKind::Sampling => PeriodBounds::from_secs(1, 120, 30),
            TaskKind::CloudRelay => PeriodBounds::from_secs(15, 600, 60),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepted range and default of a task period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub min: Duration,
    pub max: Duration,
    pub default: Duration,
}

impl PeriodBounds {
    pub const fn from_secs(min: u64, max: u64, default: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
            default: Duration::from_secs(default),
        }
    }
}

/// Clamp a requested period in seconds to the task bounds (pure function)
///
/// Non-finite requests fall back to the default period.
pub fn clamp_period(requested_secs: f64, bounds: PeriodBounds) -> Duration {
    if !requested_secs.is_finite() {
        return bounds.default;
    }

    let secs = requested_secs.clamp(bounds.min.as_secs_f64(), bounds.max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTask {
    pub name: &'static str,
    pub kind: TaskKind,
    pub period: Duration,
}

impl PeriodicTask {
    pub fn new(kind: TaskKind, requested_secs: f64) -> Self {
        let period = clamp_period(requested_secs, kind.bounds());
        if (period.as_secs_f64() - requested_secs).abs() > f64::EPSILON {
            info!(
                task = kind.name(),
                requested_secs,
                period_secs = period.as_secs_f64(),
                "Task period clamped"
            );
        }

        Self {
            name: kind.name(),
            kind,
            period,
        }
    }
}

/// One "tick pending" flag per task kind
#[derive(Debug, Default)]
struct PendingTicks([AtomicBool; TaskKind::ALL.len()]);

impl PendingTicks {
    /// Mark a tick as pending; returns `false` if one already was
    fn mark(&self, kind: TaskKind) -> bool {
        !self.0[kind.index()].swap(true, Ordering::AcqRel)
    }

    fn clear(&self, kind: TaskKind) {
        self.0[kind.index()].store(false, Ordering::Release);
    }
}

/// Owns the interval tasks emitting ticks to the coordinator
///
/// The tick channel needs room for one tick of every kind, see
/// [`TaskKind::ALL`].
pub struct Scheduler {
    ticks: mpsc::Sender<TaskKind>,
    pending: Arc<PendingTicks>,
    tasks: Vec<PeriodicTask>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(ticks: mpsc::Sender<TaskKind>) -> Self {
        Self {
            ticks,
            pending: Arc::new(PendingTicks::default()),
            tasks: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Record that the coordinator took a tick, so the next one of its kind is sent
    pub fn acknowledge(&self, kind: TaskKind) {
        self.pending.clear(kind);
    }

    pub fn tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Start emitting ticks for a task, the first one after a full period
    pub fn start(&mut self, task: PeriodicTask) {
        let handle =
            Self::spawn_interval_task(task, self.ticks.clone(), Arc::clone(&self.pending));
        info!(task = task.name, period_secs = task.period.as_secs_f64(), "Periodic task started");
        self.tasks.push(task);
        self.handles.push(handle);
    }

    fn spawn_interval_task(
        task: PeriodicTask,
        ticks: mpsc::Sender<TaskKind>,
        pending: Arc<PendingTicks>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(task.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // First tick completes immediately, skip it

            loop {
                interval.tick().await;

                if !pending.mark(task.kind) {
                    metrics().tick_dropped();
                    debug!(task = task.name, "Previous tick still pending, tick dropped");
                    continue;
                }

                match ticks.try_send(task.kind) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        pending.clear(task.kind);
                        metrics().tick_dropped();
                        debug!(task = task.name, "Tick channel full, tick dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(task = task.name, "Tick receiver closed, stopping task");
                        break;
                    }
                }
            }
        })
    }

    /// Stop every periodic task and wait for them to finish
    pub async fn stop_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Periodic task shutdown error: {}", e);
                }
            }
        }

        if !self.tasks.is_empty() {
            info!(count = self.tasks.len(), "Periodic tasks stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
