use std::time::Duration;

use tracing::debug;

/// Handle to one recurring callback registered with [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Callbacks the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    PlaybackTick,
    ExportPoll,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: TaskId,
    kind: TaskKind,
    interval: Duration,
    next_due: Duration,
}

/// Single-threaded cooperative timer table.
///
/// Nothing runs on its own: the owner asks for due tasks with
/// [`Scheduler::take_due`] and dispatches them on its own thread. Each due task
/// is rescheduled one interval after the time it was taken, so a late host
/// never receives a burst of catch-up callbacks.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a recurring task first due one `interval` after `now`.
    pub fn schedule(&mut self, kind: TaskKind, interval: Duration, now: Duration) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(ScheduledTask {
            id,
            kind,
            interval,
            next_due: now.saturating_add(interval),
        });
        debug!(task = id.0, ?kind, ?interval, "task scheduled");
        id
    }

    /// Removes a task. Cancelling an unknown or already cancelled task is a
    /// no-op; returns whether anything was removed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            debug!(task = id.0, "task cancelled");
        }
        removed
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns every task due at `now`, in registration order, and pushes each
    /// one interval into the future.
    pub fn take_due(&mut self, now: Duration) -> Vec<(TaskId, TaskKind)> {
        let mut due = Vec::new();
        for task in &mut self.tasks {
            if task.next_due <= now {
                due.push((task.id, task.kind));
                task.next_due = now.saturating_add(task.interval);
            }
        }
        due
    }

    /// Time left until the earliest task is due, `None` when idle.
    pub fn time_until_next(&self, now: Duration) -> Option<Duration> {
        self.tasks
            .iter()
            .map(|task| task.next_due.saturating_sub(now))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Scheduler, TaskKind};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn due_tasks_are_rescheduled_from_the_time_they_were_taken() {
        let mut scheduler = Scheduler::new();
        let tick = scheduler.schedule(TaskKind::PlaybackTick, ms(50), ms(0));

        assert!(scheduler.take_due(ms(49)).is_empty());
        assert_eq!(
            scheduler.take_due(ms(180)),
            vec![(tick, TaskKind::PlaybackTick)]
        );
        assert!(scheduler.take_due(ms(229)).is_empty());
        assert_eq!(scheduler.take_due(ms(230)).len(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut scheduler = Scheduler::new();
        let poll = scheduler.schedule(TaskKind::ExportPoll, ms(1_000), ms(0));

        assert!(scheduler.cancel(poll));
        assert!(!scheduler.cancel(poll));
        assert!(!scheduler.is_scheduled(poll));
        assert!(scheduler.take_due(ms(5_000)).is_empty());
    }

    #[test]
    fn time_until_next_reports_earliest_deadline() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.time_until_next(ms(0)), None);

        scheduler.schedule(TaskKind::ExportPoll, ms(1_000), ms(0));
        scheduler.schedule(TaskKind::PlaybackTick, ms(50), ms(20));

        assert_eq!(scheduler.time_until_next(ms(30)), Some(ms(40)));
        assert_eq!(scheduler.time_until_next(ms(2_000)), Some(ms(0)));
    }
}
