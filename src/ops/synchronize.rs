//! Serialization point across concurrently-driven sources.
//!
//! Wraps every protocol event in a lock on a shared mutex. Callers that
//! drive several sources into related sinks pass the same mutex to each
//! `synchronize_on` so the deliveries never overlap.

use std::sync::{Arc, Mutex};

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

#[derive(Clone)]
pub struct SynchronizeOp<S> {
  pub(crate) source: S,
  pub(crate) mutex: Arc<Mutex<()>>,
}

impl<M, S> Observable<M> for SynchronizeOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(SynchronizedObserver {
      inner: PassthroughObserver::new(observer),
      mutex: self.mutex.clone(),
    })
  }
}

pub struct SynchronizedObserver<O> {
  inner: PassthroughObserver<O>,
  mutex: Arc<Mutex<()>>,
}

impl<M, O> Observer<M> for SynchronizedObserver<O>
where
  O: Observer<M>,
{
  fn on_observe(&mut self, observation: Observation) {
    let _guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    let _guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
    self.inner.pass_next(message);
  }

  fn on_complete(&mut self) {
    let _guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
    self.inner.pass_complete();
  }

  fn on_fail(&mut self, failure: Failure) {
    let _guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
    self.inner.pass_fail(failure);
  }
}
