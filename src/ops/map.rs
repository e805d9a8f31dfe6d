//! Stateless 1:1 transform.

use std::marker::PhantomData;

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

pub struct MapOp<S, F, M> {
  pub(crate) source: S,
  pub(crate) mapping: F,
  pub(crate) _marker: PhantomData<fn(M)>,
}

impl<S: Clone, F: Clone, M> Clone for MapOp<S, F, M> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      mapping: self.mapping.clone(),
      _marker: PhantomData,
    }
  }
}

impl<M, T, S, F> Observable<T> for MapOp<S, F, M>
where
  M: Send + 'static,
  T: Send + 'static,
  S: Observable<M>,
  F: Fn(M) -> T + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<T> + 'static,
  {
    self.source.observe(MappingObserver {
      inner: PassthroughObserver::new(observer),
      mapping: self.mapping.clone(),
    })
  }
}

pub struct MappingObserver<O, F> {
  inner: PassthroughObserver<O>,
  mapping: F,
}

impl<M, T, O, F> Observer<M> for MappingObserver<O, F>
where
  O: Observer<T>,
  F: Fn(M) -> T + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    let mapped = (self.mapping)(message);
    self.inner.pass_next(mapped);
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
  fn maps_each_message() {
    let collected = collector();
    observable::of(vec![1, 2, 3])
      .map(|v| v * 2)
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![2, 4, 6]);
  }

  #[test]
  fn maps_across_types() {
    let collected = collector();
    observable::of(vec![1, 2])
      .map(|v| format!("#{v}"))
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec!["#1".to_string(), "#2".into()]);
  }
}
