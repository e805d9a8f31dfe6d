//! The task-submission boundary.
//!
//! The engine assumes nothing about an executor beyond "tasks submitted are
//! eventually run"; a calling-thread executor is a legal implementation and
//! is what the tests use. The [`Latch`] is the countdown primitive behind
//! the hot-source fan-out barrier and `join`.

use std::sync::{Condvar, Mutex};

/// Anything that can run submitted tasks.
pub trait Executor: Send + Sync {
  fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs every task synchronously on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallingThreadExecutor;

impl Executor for CallingThreadExecutor {
  fn execute(&self, task: Box<dyn FnOnce() + Send>) { task() }
}

#[cfg(feature = "futures-executor")]
impl Executor for futures::executor::ThreadPool {
  fn execute(&self, task: Box<dyn FnOnce() + Send>) {
    self.spawn_ok(async move { task() })
  }
}

/// Submits tasks to a tokio runtime as blocking work.
#[cfg(feature = "tokio-executor")]
#[derive(Clone)]
pub struct TokioExecutor(tokio::runtime::Handle);

#[cfg(feature = "tokio-executor")]
impl TokioExecutor {
  pub fn new(handle: tokio::runtime::Handle) -> Self { Self(handle) }
}

#[cfg(feature = "tokio-executor")]
impl Executor for TokioExecutor {
  fn execute(&self, task: Box<dyn FnOnce() + Send>) {
    self.0.spawn_blocking(task);
  }
}

/// Countdown latch: `wait` blocks until `count_down` was called the number
/// of times given at construction.
pub struct Latch {
  remaining: Mutex<usize>,
  zeroed: Condvar,
}

impl Latch {
  pub fn new(count: usize) -> Self {
    Self { remaining: Mutex::new(count), zeroed: Condvar::new() }
  }

  pub fn count_down(&self) {
    let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
    *remaining = remaining.saturating_sub(1);
    if *remaining == 0 {
      self.zeroed.notify_all();
    }
  }

  pub fn wait(&self) {
    let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
    while *remaining > 0 {
      remaining = self
        .zeroed
        .wait(remaining)
        .unwrap_or_else(|e| e.into_inner());
    }
  }
}

/// Counts its latch down when dropped, so a panicking task still releases
/// the waiting broadcaster.
pub(crate) struct LatchGuard(pub(crate) std::sync::Arc<Latch>);

impl Drop for LatchGuard {
  fn drop(&mut self) { self.0.count_down() }
}
