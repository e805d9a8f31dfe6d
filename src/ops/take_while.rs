//! Prefix-taking operators.
//!
//! `take_while` forwards messages while the condition holds; the first
//! non-matching element cancels upstream and completes downstream.

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

#[derive(Clone)]
pub struct TakeWhileOp<S, P> {
  pub(crate) source: S,
  pub(crate) condition: P,
}

impl<M, S, P> Observable<M> for TakeWhileOp<S, P>
where
  M: Send + 'static,
  S: Observable<M>,
  P: Fn(&M) -> bool + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(TakeWhileObserver {
      inner: PassthroughObserver::new(observer),
      condition: self.condition.clone(),
      done: false,
    })
  }
}

pub struct TakeWhileObserver<O, P> {
  inner: PassthroughObserver<O>,
  condition: P,
  done: bool,
}

impl<M, O, P> Observer<M> for TakeWhileObserver<O, P>
where
  O: Observer<M>,
  P: Fn(&M) -> bool + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    if self.done {
      return;
    }
    if (self.condition)(&message) {
      self.inner.pass_next(message);
    } else {
      self.done = true;
      if let Some(observation) = self.inner.observation() {
        observation.cancel();
      }
      self.inner.pass_complete();
    }
  }

  fn on_complete(&mut self) {
    if !self.done {
      self.done = true;
      self.inner.pass_complete();
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if !self.done {
      self.done = true;
      self.inner.pass_fail(failure);
    }
  }
}
