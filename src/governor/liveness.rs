use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::governor::handle::{WorkerHandle, WorkerState};

/// Wall-clock liveness ceiling for starting and busy workers.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Time elapsed since `reference`; zero if the clock went backwards
    pub fn idle_time(&self, reference: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (now - reference).to_std().unwrap_or_default()
    }

    pub fn is_stale(&self, reference: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.idle_time(reference, now) > self.timeout
    }

    /// Check a worker against the ceiling.
    ///
    /// A worker that has not reported in yet is measured from its spawn
    /// time. A running worker is only judged while it holds a task, from
    /// the later of the last counter movement and the task assignment, so
    /// time spent idle before the task never counts.
    ///
    /// # Returns
    ///
    /// The idle time when the worker is stale, `None` otherwise.
    pub fn check(
        &self,
        handle: &WorkerHandle,
        last_running_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let reference = match handle.state() {
            WorkerState::Starting => handle.spawn_time,
            WorkerState::Running => {
                let assigned = handle.task_assigned_at?;
                match last_running_time {
                    Some(progress) if progress > assigned => progress,
                    _ => assigned,
                }
            }
            WorkerState::Terminated(_) => return None,
        };

        if self.is_stale(reference, now) {
            Some(self.idle_time(reference, now))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crate::governor::handle::TerminationReason;

    fn busy_handle(assigned: DateTime<Utc>) -> WorkerHandle {
        let mut handle = WorkerHandle::new("worker-00", 1, 0, 0, assigned);
        handle.mark_running(1, assigned);
        handle.assign_task(assigned);
        handle
    }

    #[test]
    fn test_stale_after_timeout() {
        let monitor = LivenessMonitor::new(Duration::from_secs(60));
        let start = Utc::now();
        let handle = busy_handle(start);

        assert!(monitor.check(&handle, None, start + ChronoDuration::seconds(59)).is_none());
        let idle = monitor.check(&handle, None, start + ChronoDuration::seconds(61)).unwrap();
        assert_eq!(idle, Duration::from_secs(61));
    }

    #[test]
    fn test_progress_resets_reference() {
        let monitor = LivenessMonitor::new(Duration::from_secs(60));
        let start = Utc::now();
        let handle = busy_handle(start);
        let progress = start + ChronoDuration::seconds(50);

        assert!(monitor
            .check(&handle, Some(progress), start + ChronoDuration::seconds(100))
            .is_none());
        assert!(monitor
            .check(&handle, Some(progress), start + ChronoDuration::seconds(111))
            .is_some());
    }

    #[test]
    fn test_idle_period_before_assignment_is_ignored() {
        let monitor = LivenessMonitor::new(Duration::from_secs(60));
        let start = Utc::now();
        let assigned = start + ChronoDuration::seconds(600);
        let handle = busy_handle(assigned);

        assert!(monitor
            .check(&handle, Some(start), assigned + ChronoDuration::seconds(10))
            .is_none());
    }

    #[test]
    fn test_idle_worker_is_never_stale() {
        let monitor = LivenessMonitor::new(Duration::from_secs(1));
        let start = Utc::now();
        let mut handle = WorkerHandle::new("worker-00", 1, 0, 0, start);
        handle.mark_running(1, start);

        assert!(monitor.check(&handle, None, start + ChronoDuration::hours(1)).is_none());
    }

    #[test]
    fn test_worker_that_never_reports_in_is_stale() {
        let monitor = LivenessMonitor::new(Duration::from_secs(30));
        let spawned = Utc::now();
        let handle = WorkerHandle::new("worker-00", 1, 0, 0, spawned);

        assert!(monitor.check(&handle, None, spawned + ChronoDuration::seconds(29)).is_none());
        let idle = monitor.check(&handle, None, spawned + ChronoDuration::seconds(31)).unwrap();
        assert_eq!(idle, Duration::from_secs(31));
    }

    #[test]
    fn test_terminated_worker_is_not_checked() {
        let monitor = LivenessMonitor::new(Duration::from_secs(1));
        let spawned = Utc::now();
        let mut handle = WorkerHandle::new("worker-00", 1, 0, 0, spawned);
        handle.mark_terminated(TerminationReason::Crashed);

        assert!(monitor.check(&handle, None, spawned + ChronoDuration::hours(1)).is_none());
    }

    #[test]
    fn test_clock_going_backwards() {
        let monitor = LivenessMonitor::new(Duration::from_secs(1));
        let now = Utc::now();
        assert_eq!(monitor.idle_time(now, now - ChronoDuration::seconds(5)), Duration::ZERO);
        assert!(!monitor.is_stale(now, now - ChronoDuration::seconds(5)));
    }
}
