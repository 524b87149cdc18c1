use log::error;
use std::thread;

/// Runs a task somewhere other than the caller's realtime path.
pub trait Scheduler: Send + Sync {
    fn spawn<F>(&self, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static;
}

/// One short-lived OS thread per task.
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn<F>(&self, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(f) {
            error!("Failed to spawn task '{}': {}", name, e);
        }
    }
}

/// Runs the task on the calling thread. For tests.
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn spawn<F>(&self, _name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        f();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_thread_scheduler_spawn() {
        let scheduler = ThreadScheduler::new();
        let flag = Arc::new(Mutex::new(false));
        let flag_clone = flag.clone();

        scheduler.spawn("test-task", move || {
            let mut flag = flag_clone.lock().unwrap();
            *flag = true;
        });

        // Give the thread a moment to execute
        thread::sleep(Duration::from_millis(50));
        assert!(*flag.lock().unwrap());
    }

    #[test]
    fn test_inline_scheduler_runs_immediately() {
        let flag = Arc::new(Mutex::new(false));
        let flag_clone = flag.clone();
        InlineScheduler.spawn("inline", move || *flag_clone.lock().unwrap() = true);
        assert!(*flag.lock().unwrap());
    }
}
