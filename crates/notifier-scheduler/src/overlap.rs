//! Overlap control for recurring jobs.
//!
//! A tick that arrives while the previous run of the same job is still in
//! flight is either dropped (`Skip`) or allowed to run alongside it
//! (`Concurrent`). The email job always uses `Skip`: two batches over the
//! same user list would double-send.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Policy for handling overlapping job executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverlapPolicy {
    /// Drop the tick if a previous run is still active.
    #[default]
    Skip,

    /// Allow concurrent executions.
    Concurrent,
}

/// Tracks whether a job has a run in flight.
///
/// Acquisition is lock-free; the returned [`RunPermit`] releases the slot on
/// drop, including when the run panics.
#[derive(Debug)]
pub struct OverlapGuard {
    in_flight: Arc<AtomicBool>,
    skipped: AtomicU64,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            skipped: AtomicU64::new(0),
            policy,
        }
    }

    /// Claim the run slot.
    ///
    /// Returns `None` when the policy is `Skip` and another run holds the
    /// slot. The refusal is counted in [`OverlapGuard::skipped`].
    pub fn try_acquire(&self) -> Option<RunPermit> {
        match self.policy {
            OverlapPolicy::Skip => {
                if self
                    .in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Some(RunPermit {
                        slot: Some(self.in_flight.clone()),
                    })
                } else {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
            OverlapPolicy::Concurrent => Some(RunPermit { slot: None }),
        }
    }

    /// Whether a `Skip` run currently holds the slot.
    ///
    /// Always `false` under `Concurrent`.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of ticks refused since the guard was created.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Held for the duration of one run.
#[derive(Debug)]
pub struct RunPermit {
    slot: Option<Arc<AtomicBool>>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Some(slot) = &self.slot {
            slot.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_skip_refuses_second_permit() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);

        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.is_running());

        assert!(guard.try_acquire().is_none());
        assert_eq!(guard.skipped(), 1);

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
        assert_eq!(guard.skipped(), 1);
    }

    #[test]
    fn test_concurrent_always_grants() {
        let guard = OverlapGuard::new(OverlapPolicy::Concurrent);

        let a = guard.try_acquire();
        let b = guard.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(!guard.is_running());
        assert_eq!(guard.skipped(), 0);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));

        let inner = guard.clone();
        let result = thread::spawn(move || {
            let _permit = inner.try_acquire().unwrap();
            panic!("run blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_only_one_thread_wins() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let permit = guard.try_acquire();
                    let won = permit.is_some();
                    // Hold the slot long enough for every contender to try.
                    thread::sleep(Duration::from_millis(50));
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(guard.skipped(), 7);
    }

    #[test]
    fn test_default_policy_is_skip() {
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Skip);
        assert_eq!(
            OverlapGuard::new(OverlapPolicy::default()).policy(),
            OverlapPolicy::Skip
        );
    }
}
