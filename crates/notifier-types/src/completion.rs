//! Process-wide completion signal.
//!
//! The email job sets this once a run delivered and acknowledged every
//! pending user. Display collaborators read it to decide whether results
//! are ready. All clones share the same underlying state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "last batch fully delivered" flag.
///
/// Starts `false`. Only the email job writes it, and the scheduler never
/// runs two batches at once, so a plain atomic is enough.
///
/// # Example
///
/// ```
/// use notifier_types::CompletionFlag;
///
/// let flag = CompletionFlag::new();
/// let reader = flag.clone();
///
/// flag.mark_complete();
/// assert!(reader.is_complete());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag {
    complete: Arc<AtomicBool>,
}

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the most recent finished batch sent everything it found.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Clear the flag. Only called when `completion.reset_on_pending`
    /// is enabled and a new run found pending users.
    pub fn clear(&self) {
        self.complete.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_incomplete() {
        assert!(!CompletionFlag::new().is_complete());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = CompletionFlag::new();
        let other = flag.clone();

        flag.mark_complete();
        assert!(other.is_complete());

        other.clear();
        assert!(!flag.is_complete());
    }

    #[test]
    fn test_concurrent_readers() {
        use std::thread;

        let flag = CompletionFlag::new();
        flag.mark_complete();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flag = flag.clone();
                thread::spawn(move || flag.is_complete())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
