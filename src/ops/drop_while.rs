//! Prefix-dropping operators.
//!
//! Nothing is forwarded until the condition first fails; from then on every
//! message passes through, including the one that failed the condition.
//! Dropped elements consume upstream demand, so a replacement unit is
//! requested per drop.

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

#[derive(Clone)]
pub struct DropWhileOp<S, P> {
  pub(crate) source: S,
  pub(crate) condition: P,
}

impl<M, S, P> Observable<M> for DropWhileOp<S, P>
where
  M: Send + 'static,
  S: Observable<M>,
  P: Fn(&M) -> bool + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(DropWhileObserver {
      inner: PassthroughObserver::new(observer),
      condition: self.condition.clone(),
      dropping: true,
    })
  }
}

pub struct DropWhileObserver<O, P> {
  inner: PassthroughObserver<O>,
  condition: P,
  dropping: bool,
}

impl<M, O, P> Observer<M> for DropWhileObserver<O, P>
where
  O: Observer<M>,
  P: Fn(&M) -> bool + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    if self.dropping {
      if (self.condition)(&message) {
        if let Some(observation) = self.inner.observation() {
          observation.request_next();
        }
        return;
      }
      self.dropping = false;
    }
    self.inner.pass_next(message);
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.inner.pass_fail(failure); }
}

#[cfg(test)]
mod test {
  use crate::{
    prelude::*,
    testing::{collector, drain, push_into},
  };

  #[test]
  fn drops_the_matching_prefix_only() {
    let collected = collector();
    observable::of(vec![1, 2, 9, 3])
      .drop_while(|v| *v < 5)
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![9, 3]);
  }

  #[test]
  fn drop_skips_the_leading_count() {
    let collected = collector();
    observable::of(1..=5)
      .drop(2)
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![3, 4, 5]);
  }

  #[test]
  fn non_matching_head_passes_everything() {
    let collected = collector();
    observable::of(vec![9, 1, 2])
      .drop_while(|v| *v < 5)
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![9, 1, 2]);
  }
}
