//! Event materialization.
//!
//! Wraps each raw value, and any failure, into a [`ValueState`] message so
//! a failure can flow through the same channel as a value. A failure
//! becomes a `problem` state followed by completion; the stream downstream
//! of `materialize` never fails.

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
  property::ValueState,
};

#[derive(Clone)]
pub struct MaterializeOp<S> {
  pub(crate) source: S,
}

impl<M, S> Observable<ValueState<M>> for MaterializeOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<ValueState<M>> + 'static,
  {
    self.source.observe(MaterializingObserver {
      inner: PassthroughObserver::new(observer),
    })
  }
}

pub struct MaterializingObserver<O> {
  inner: PassthroughObserver<O>,
}

impl<M, O> Observer<M> for MaterializingObserver<O>
where
  O: Observer<ValueState<M>>,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    self.inner.pass_next(ValueState::value(message));
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) {
    self.inner.pass_next(ValueState::problem(failure));
    self.inner.pass_complete();
  }
}

#[cfg(test)]
mod test {
  use crate::{
    error::{AlreadyCompletedError, failure},
    prelude::*,
    testing::{collector, drain, push_into},
  };

  #[test]
  fn values_become_value_states() {
    let collected = collector();
    observable::of(vec![1, 2])
      .materialize()
      .subscribe(push_into(&collected));
    let states = drain(&collected);
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].try_get(), Some(1));
    assert_eq!(states[1].try_get(), Some(2));
  }

  #[test]
  fn failure_becomes_a_problem_state_then_completion() {
    let collected = collector();
    let completions = collector();
    let on_complete = {
      let completions = completions.clone();
      crate::observer::on_completion(move || completions.lock().unwrap().push(()))
    };

    observable::failing::<i32, _>(|| failure(AlreadyCompletedError))
      .materialize()
      .then(on_complete)
      .subscribe(push_into(&collected));

    let states = drain(&collected);
    assert_eq!(states.len(), 1);
    assert!(states[0].try_get().is_none());
    assert!(states[0].problem().is_some());
    assert_eq!(drain(&completions).len(), 1);
  }
}
