//! Decorator base shared by the transform operators.
//!
//! Every operator observer wraps a downstream sink and forwards the four
//! protocol events, keeping hold of the upstream observation so the
//! operator can feed demand or cancel. Operators that need different
//! demand semantics hand a wrapped observation downstream instead of the
//! upstream one.

use crate::{error::Failure, observation::Observation, observer::Observer};

/// Holds the downstream sink and the observation for one attach.
pub struct PassthroughObserver<O> {
  downstream: O,
  observation: Option<Observation>,
}

impl<O> PassthroughObserver<O> {
  pub fn new(downstream: O) -> Self {
    Self { downstream, observation: None }
  }

  /// The upstream observation, once observed.
  pub fn observation(&self) -> Option<&Observation> {
    self.observation.as_ref()
  }

  pub fn downstream(&self) -> &O { &self.downstream }

  pub fn downstream_mut(&mut self) -> &mut O { &mut self.downstream }

  /// Record the observation and forward it downstream unchanged.
  pub fn pass_observe<M>(&mut self, observation: Observation)
  where
    O: Observer<M>,
  {
    self.observation = Some(observation.clone());
    self.downstream.on_observe(observation);
  }

  /// Record the upstream observation but hand a different one downstream.
  pub fn pass_observe_wrapped<M>(
    &mut self,
    upstream: Observation,
    downstream: Observation,
  ) where
    O: Observer<M>,
  {
    self.observation = Some(upstream);
    self.downstream.on_observe(downstream);
  }

  pub fn pass_next<M>(&mut self, message: M)
  where
    O: Observer<M>,
  {
    self.downstream.on_next(message);
  }

  pub fn pass_complete<M>(&mut self)
  where
    O: Observer<M>,
  {
    self.downstream.on_complete();
  }

  pub fn pass_fail<M>(&mut self, failure: Failure)
  where
    O: Observer<M>,
  {
    self.downstream.on_fail(failure);
  }
}
