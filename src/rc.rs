//! Shared-ownership helpers for sinks and operator bookkeeping.
//!
//! Multi-source operators hand the same downstream sink to several producer
//! threads; [`MutArc`] is the uniform pointer type for that, and [`WeakArc`]
//! is its non-owning companion used by the lifetime-bound observers.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::{error::Failure, observation::Observation, observer::Observer};

/// Shared mutable cell, `Arc<Mutex<T>>` with the locking folded away.
pub struct MutArc<T>(Arc<Mutex<T>>);

impl<T> MutArc<T> {
  pub fn own(value: T) -> Self { Self(Arc::new(Mutex::new(value))) }

  pub fn lock(&self) -> MutexGuard<'_, T> {
    self.0.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Downgrade to a non-owning handle.
  pub fn downgrade(&self) -> WeakArc<T> { WeakArc(Arc::downgrade(&self.0)) }
}

impl<T> Clone for MutArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T: Default> Default for MutArc<T> {
  fn default() -> Self { Self::own(T::default()) }
}

/// Non-owning handle to a [`MutArc`]. Upgrading fails once the last owner
/// dropped the value, which is exactly the liveness check the
/// reference-bound observers need.
pub struct WeakArc<T>(Weak<Mutex<T>>);

impl<T> WeakArc<T> {
  pub fn upgrade(&self) -> Option<MutArc<T>> { self.0.upgrade().map(MutArc) }
}

impl<T> Clone for WeakArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

/// A shared sink: every handle delivers into the same underlying observer.
impl<M, O> Observer<M> for MutArc<O>
where
  O: Observer<M> + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.lock().on_observe(observation)
  }

  fn on_next(&mut self, message: M) { self.lock().on_next(message) }

  fn on_complete(&mut self) { self.lock().on_complete() }

  fn on_fail(&mut self, failure: Failure) { self.lock().on_fail(failure) }
}
