//! Delayed task execution for request delays and polling intervals.

use std::thread;
use std::time::Duration;

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Default scheduler: one short-lived thread per delayed task.
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            task();
        });
    }
}

/// Runs tasks inline on the calling thread, ignoring delays. Keeps
/// single-threaded callers and tests deterministic.
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}
