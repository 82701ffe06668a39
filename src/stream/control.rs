use super::ConsumptionSource;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Pause/resume switch for the single consumption source of this process.
///
/// Built once at startup and shared by `Arc`. The paused flag and the call
/// into the source change together under one lock, so the source always ends
/// in the state `is_paused` reports and never sees a double pause or resume.
pub struct ConsumptionControl {
    source: Arc<dyn ConsumptionSource>,
    paused: Mutex<bool>,
}

impl ConsumptionControl {
    pub fn new(source: Arc<dyn ConsumptionSource>) -> Self {
        Self {
            source,
            paused: Mutex::new(false),
        }
    }

    pub fn consumer_id(&self) -> &str {
        self.source.consumer_id()
    }

    // Source calls never panic mid-transition, so a poisoned flag is still accurate
    fn state(&self) -> MutexGuard<'_, bool> {
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop delivery. Returns `true` if this call changed the state.
    pub fn pause(&self) -> bool {
        let mut paused = self.state();
        if *paused {
            return false;
        }

        self.source.pause();
        *paused = true;
        drop(paused);

        warn!(consumer_id = %self.consumer_id(), "Consumer paused");
        true
    }

    /// Restart delivery. Returns `true` if this call changed the state.
    pub fn resume(&self) -> bool {
        let mut paused = self.state();
        if !*paused {
            return false;
        }

        self.source.resume();
        *paused = false;
        drop(paused);

        warn!(consumer_id = %self.consumer_id(), "Consumer resumed");
        true
    }

    pub fn is_paused(&self) -> bool {
        *self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        /// What the source itself believes
        paused: AtomicBool,
    }

    impl ConsumptionSource for CountingSource {
        fn consumer_id(&self) -> &str {
            "test-consumer"
        }

        fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            // Widen the window between the flag change and the source call
            std::thread::yield_now();
            self.paused.store(true, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            std::thread::yield_now();
            self.paused.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_pause_twice_issues_one_call() {
        let source = Arc::new(CountingSource::default());
        let control = ConsumptionControl::new(source.clone());

        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.is_paused());
        assert_eq!(source.pauses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resume_when_running_is_noop() {
        let source = Arc::new(CountingSource::default());
        let control = ConsumptionControl::new(source.clone());

        assert!(!control.resume());
        assert!(!control.is_paused());
        assert_eq!(source.resumes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let source = Arc::new(CountingSource::default());
        let control = ConsumptionControl::new(source.clone());

        assert!(control.pause());
        assert!(control.resume());
        assert!(!control.resume());
        assert!(control.pause());

        assert_eq!(source.pauses.load(Ordering::SeqCst), 2);
        assert_eq!(source.resumes.load(Ordering::SeqCst), 1);
        assert_eq!(control.consumer_id(), "test-consumer");
    }

    #[test]
    fn test_concurrent_pause_issues_one_call() {
        let source = Arc::new(CountingSource::default());
        let control = Arc::new(ConsumptionControl::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let control = Arc::clone(&control);
                std::thread::spawn(move || control.pause())
            })
            .collect();

        let changed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();

        assert_eq!(changed, 1);
        assert_eq!(source.pauses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_racing_pause_and_resume_leave_source_in_reported_state() {
        let source = Arc::new(CountingSource::default());
        let control = Arc::new(ConsumptionControl::new(source.clone()));

        for _ in 0..200 {
            let pauser = {
                let control = Arc::clone(&control);
                std::thread::spawn(move || control.pause())
            };
            let resumer = {
                let control = Arc::clone(&control);
                std::thread::spawn(move || control.resume())
            };
            pauser.join().unwrap();
            resumer.join().unwrap();

            assert_eq!(source.paused.load(Ordering::SeqCst), control.is_paused());
        }

        let pauses = source.pauses.load(Ordering::SeqCst);
        let resumes = source.resumes.load(Ordering::SeqCst);
        assert!(pauses == resumes || pauses == resumes + 1);
    }
}
