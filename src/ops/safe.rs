//! Protocol-enforcing decorator.
//!
//! Sits between a producer and an untrusted sink. It accounts demand so a
//! message arriving without an outstanding request becomes an
//! [`UnexpectedMessageError`] failure, it drops deliveries before observe,
//! after cancellation and after a terminal event, it tolerates a second
//! attach by cancelling the new upstream, and it contains panics escaping
//! the sink by translating them into a failure event on the same
//! subscription and cancelling upstream.

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use crate::{
  error::{Failure, SinkPanicError, UnexpectedMessageError, failure},
  observation::{Observation, ObservationLike, RequestCount},
  observer::Observer,
};

/// Demand-accounting observation handed to the guarded sink. Requests are
/// recorded locally and forwarded upstream.
struct SafeGuard {
  upstream: Observation,
  demand: Mutex<RequestCount>,
  terminated: AtomicBool,
}

impl SafeGuard {
  fn terminate(&self) { self.terminated.store(true, Ordering::SeqCst) }

  fn is_terminated(&self) -> bool { self.terminated.load(Ordering::SeqCst) }
}

impl ObservationLike for SafeGuard {
  fn request(&self, count: u64) {
    if self.is_terminated() {
      return;
    }
    self
      .demand
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .request(count);
    self.upstream.request(count);
  }

  fn pending_requests(&self) -> u64 {
    self
      .demand
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .count()
  }

  fn cancel(&self) { self.upstream.cancel() }

  fn is_cancelled(&self) -> bool { self.upstream.is_cancelled() }
}

pub struct SafeObserver<O> {
  downstream: O,
  guard: Option<Arc<SafeGuard>>,
}

impl<O> SafeObserver<O> {
  pub fn new(downstream: O) -> Self { Self { downstream, guard: None } }

  /// The guarded observation, once observed.
  pub fn observation(&self) -> Option<Observation> {
    self
      .guard
      .clone()
      .map(|guard| Observation::from_arc(guard as _))
  }
}

/// Run one delivery into the guarded sink, translating an escaping panic
/// into a failure event on the same subscription.
fn deliver<M, O>(guard: &SafeGuard, downstream: &mut O, event: impl FnOnce(&mut O))
where
  O: Observer<M>,
{
  let outcome = catch_unwind(AssertUnwindSafe(|| event(downstream)));
  if let Err(payload) = outcome {
    guard.terminate();
    guard.upstream.cancel();
    downstream.on_fail(failure(SinkPanicError::from_panic(payload)));
  }
}

impl<M, O> Observer<M> for SafeObserver<O>
where
  O: Observer<M>,
{
  fn on_observe(&mut self, observation: Observation) {
    if self.guard.is_some() {
      tracing::debug!("duplicate observe on an exclusive sink; cancelling");
      observation.cancel();
      return;
    }
    let guard = Arc::new(SafeGuard {
      upstream: observation,
      demand: Mutex::new(RequestCount::new()),
      terminated: AtomicBool::new(false),
    });
    self.guard = Some(guard.clone());
    let handle = Observation::from_arc(guard.clone() as _);
    deliver(&guard, &mut self.downstream, |downstream| {
      downstream.on_observe(handle)
    });
  }

  fn on_next(&mut self, message: M) {
    let guard = match &self.guard {
      Some(guard) => guard.clone(),
      None => return,
    };
    if guard.is_terminated() || guard.upstream.is_cancelled() {
      return;
    }
    let granted = {
      let mut demand = guard.demand.lock().unwrap_or_else(|e| e.into_inner());
      if demand.is_fulfilled() {
        false
      } else {
        demand.fulfil();
        true
      }
    };
    if granted {
      deliver(&guard, &mut self.downstream, |downstream| {
        downstream.on_next(message)
      });
    } else {
      guard.terminate();
      guard.upstream.cancel();
      self.downstream.on_fail(failure(UnexpectedMessageError));
    }
  }

  fn on_complete(&mut self) {
    let guard = match &self.guard {
      Some(guard) => guard.clone(),
      None => return,
    };
    if guard.is_terminated() || guard.upstream.is_cancelled() {
      return;
    }
    guard.terminate();
    deliver(&guard, &mut self.downstream, |downstream| {
      downstream.on_complete()
    });
  }

  fn on_fail(&mut self, failure: Failure) {
    let guard = match &self.guard {
      Some(guard) => guard.clone(),
      None => return,
    };
    if guard.is_terminated() || guard.upstream.is_cancelled() {
      return;
    }
    guard.terminate();
    deliver(&guard, &mut self.downstream, |downstream| {
      downstream.on_fail(failure)
    });
  }
}
