//! Degenerate source that terminates immediately.
//!
//! Every subscriber receives its observation and then the failure, with no
//! demand required. Requests are accepted and discarded; pending demand
//! reports unbounded so callers that inspect it stay well-formed.

use std::{
  marker::PhantomData,
  sync::atomic::{AtomicBool, Ordering},
};

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, UNBOUNDED},
  observer::Observer,
};

/// Source that fails each subscription with a freshly supplied cause.
pub struct FailingObservable<M, F> {
  supplier: F,
  _marker: PhantomData<fn() -> M>,
}

impl<M, F> FailingObservable<M, F>
where
  F: Fn() -> Failure,
{
  pub fn new(supplier: F) -> Self {
    Self { supplier, _marker: PhantomData }
  }
}

impl<M, F: Clone> Clone for FailingObservable<M, F> {
  fn clone(&self) -> Self {
    Self { supplier: self.supplier.clone(), _marker: PhantomData }
  }
}

impl<M, F> Observable<M> for FailingObservable<M, F>
where
  M: Send + 'static,
  F: Fn() -> Failure + Clone + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    deliver_failure(observer, (self.supplier)())
  }
}

/// Attach `observer` and immediately fail it with `cause`. Shared with the
/// value-state sources.
pub(crate) fn deliver_failure<M, O>(mut observer: O, cause: Failure) -> Observation
where
  O: Observer<M>,
{
  let observation = Observation::new(DiscardingObservation {
    cancelled: AtomicBool::new(false),
  });
  observer.on_observe(observation.clone());
  if !observation.is_cancelled() {
    observer.on_fail(cause);
  }
  observation
}

/// Accepts and discards demand; only cancellation is recorded.
struct DiscardingObservation {
  cancelled: AtomicBool,
}

impl ObservationLike for DiscardingObservation {
  fn request(&self, _count: u64) {}

  fn pending_requests(&self) -> u64 { UNBOUNDED }

  fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst) }

  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}

/// An already-completed source: observation, then completion.
pub struct EmptyObservable<M> {
  _marker: PhantomData<fn() -> M>,
}

impl<M> EmptyObservable<M> {
  pub fn new() -> Self { Self { _marker: PhantomData } }
}

impl<M> Default for EmptyObservable<M> {
  fn default() -> Self { Self::new() }
}

impl<M> Clone for EmptyObservable<M> {
  fn clone(&self) -> Self { Self::new() }
}

impl<M> Observable<M> for EmptyObservable<M>
where
  M: Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let mut observer = observer;
    let observation = Observation::new(DiscardingObservation {
      cancelled: AtomicBool::new(false),
    });
    observer.on_observe(observation.clone());
    if !observation.is_cancelled() {
      observer.on_complete();
    }
    observation
  }
}

#[cfg(test)]
mod test {
  use std::sync::{Arc as StdArc, Mutex};

  use super::*;
  use crate::error::{AlreadyCompletedError, failure};

  struct Events(StdArc<Mutex<Vec<String>>>);

  impl Observer<i32> for Events {
    fn on_observe(&mut self, observation: Observation) {
      observation.request_next();
      self.0.lock().unwrap().push("observe".into());
    }

    fn on_next(&mut self, message: i32) {
      self.0.lock().unwrap().push(format!("next {message}"));
    }

    fn on_complete(&mut self) {
      self.0.lock().unwrap().push("complete".into());
    }

    fn on_fail(&mut self, failure: Failure) {
      self.0.lock().unwrap().push(format!("fail {failure}"));
    }
  }

  #[test]
  fn fails_immediately_regardless_of_demand() {
    let events = StdArc::new(Mutex::new(Vec::new()));
    let source = FailingObservable::new(|| failure(AlreadyCompletedError));
    let observation = source.observe(Events(events.clone()));

    assert_eq!(
      *events.lock().unwrap(),
      vec![
        "observe".to_string(),
        format!("fail {}", AlreadyCompletedError)
      ]
    );
    assert_eq!(observation.pending_requests(), UNBOUNDED);
  }

  #[test]
  fn each_subscription_gets_a_fresh_cause() {
    let events = StdArc::new(Mutex::new(Vec::new()));
    let source = FailingObservable::new(|| failure(AlreadyCompletedError));
    source.observe(Events(events.clone()));
    source.observe(Events(events.clone()));
    assert_eq!(events.lock().unwrap().len(), 4);
  }

  #[test]
  fn empty_completes_immediately() {
    let events = StdArc::new(Mutex::new(Vec::new()));
    EmptyObservable::new().observe(Events(events.clone()));
    assert_eq!(
      *events.lock().unwrap(),
      vec!["observe".to_string(), "complete".into()]
    );
  }
}
