//! Deferred jobs run from the monitor loop.
//!
//! Event handlers run on whatever thread emitted the event, often the
//! actuator's I/O worker. Work that would re-enter the actuator from there
//! is armed here instead and picked up on the next monitor cycle.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Set of deferred jobs, one bit each.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeferredJob(u8);

impl DeferredJob {
    /// No job.
    pub const NONE: Self = Self(0);
    /// Call `couple()` on the actuator.
    pub const RECOUPLE_ACTUATOR: Self = Self(1);

    const NAMED: [(Self, &'static str); 1] = [(Self::RECOUPLE_ACTUATOR, "recouple_actuator")];

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The single-bit jobs in this set.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::NAMED
            .into_iter()
            .map(|(job, _)| job)
            .filter(move |job| self.contains(*job))
    }
}

impl BitOr for DeferredJob {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DeferredJob {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DeferredJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("DeferredJob(none)");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(job, _)| self.contains(*job))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "DeferredJob({})", names.join(" | "))
    }
}

/// Lock-protected set of armed jobs.
#[derive(Debug, Default)]
pub struct JobQueue {
    armed: Mutex<DeferredJob>,
}

impl JobQueue {
    /// An empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: Mutex::new(DeferredJob::NONE),
        }
    }

    /// Arm `job`. Arming an armed job is a no-op.
    pub fn arm(&self, job: DeferredJob) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        *armed |= job;
        debug!(job = ?job, pending = ?*armed, "deferred job armed");
    }

    /// Currently armed jobs.
    #[must_use]
    pub fn pending(&self) -> DeferredJob {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear and return every armed job.
    pub fn take(&self) -> DeferredJob {
        std::mem::take(&mut *self.armed.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Take the armed jobs and run each once with `runner`.
    ///
    /// The lock is released before `runner` is called, so a job may re-arm
    /// itself. Returns the jobs that ran.
    pub fn drain<F>(&self, mut runner: F) -> DeferredJob
    where
        F: FnMut(DeferredJob),
    {
        let jobs = self.take();
        for job in jobs.iter() {
            debug!(job = ?job, "running deferred job");
            runner(job);
        }
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_is_idempotent() {
        let queue = JobQueue::new();
        assert!(queue.pending().is_empty());
        queue.arm(DeferredJob::RECOUPLE_ACTUATOR);
        queue.arm(DeferredJob::RECOUPLE_ACTUATOR);
        assert_eq!(queue.pending(), DeferredJob::RECOUPLE_ACTUATOR);
        assert_eq!(queue.pending().bits(), 1);
    }

    #[test]
    fn test_drain_runs_once_and_clears() {
        let queue = JobQueue::new();
        queue.arm(DeferredJob::RECOUPLE_ACTUATOR);

        let mut runs = 0;
        let ran = queue.drain(|job| {
            assert_eq!(job, DeferredJob::RECOUPLE_ACTUATOR);
            runs += 1;
        });
        assert_eq!(ran, DeferredJob::RECOUPLE_ACTUATOR);
        assert_eq!(runs, 1);
        assert!(queue.pending().is_empty());

        assert!(queue.drain(|_| runs += 1).is_empty());
        assert_eq!(runs, 1);
    }

    #[test]
    fn test_job_may_rearm_itself() {
        let queue = JobQueue::new();
        queue.arm(DeferredJob::RECOUPLE_ACTUATOR);
        queue.drain(|job| queue.arm(job));
        assert_eq!(queue.pending(), DeferredJob::RECOUPLE_ACTUATOR);
    }

    #[test]
    fn test_debug_names() {
        assert_eq!(format!("{:?}", DeferredJob::NONE), "DeferredJob(none)");
        assert_eq!(
            format!("{:?}", DeferredJob::RECOUPLE_ACTUATOR),
            "DeferredJob(recouple_actuator)"
        );
    }
}
