//! Predicate filter.
//!
//! A rejected element still cost one unit of upstream demand but delivers
//! nothing downstream, so the observer requests a replacement unit for each
//! reject. Downstream demand is therefore eventually honored even through
//! long runs of rejected elements.

use std::marker::PhantomData;

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

#[derive(Clone)]
pub struct FilterOp<S, P> {
  pub(crate) source: S,
  pub(crate) condition: P,
}

impl<M, S, P> Observable<M> for FilterOp<S, P>
where
  M: Send + 'static,
  S: Observable<M>,
  P: Fn(&M) -> bool + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(FilteringObserver {
      inner: PassthroughObserver::new(observer),
      condition: self.condition.clone(),
    })
  }
}

pub struct FilteringObserver<O, P> {
  inner: PassthroughObserver<O>,
  condition: P,
}

impl<M, O, P> Observer<M> for FilteringObserver<O, P>
where
  O: Observer<M>,
  P: Fn(&M) -> bool + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    if (self.condition)(&message) {
      self.inner.pass_next(message);
    } else if let Some(observation) = self.inner.observation() {
      observation.request_next();
    }
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.inner.pass_fail(failure); }
}

pub struct PartialMapOp<S, F, M> {
  pub(crate) source: S,
  pub(crate) mapping: F,
  pub(crate) _marker: PhantomData<fn(M)>,
}

impl<S: Clone, F: Clone, M> Clone for PartialMapOp<S, F, M> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      mapping: self.mapping.clone(),
      _marker: PhantomData,
    }
  }
}

impl<M, T, S, F> Observable<T> for PartialMapOp<S, F, M>
where
  M: Send + 'static,
  T: Send + 'static,
  S: Observable<M>,
  F: Fn(M) -> Option<T> + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<T> + 'static,
  {
    self.source.observe(PartialMappingObserver {
      inner: PassthroughObserver::new(observer),
      mapping: self.mapping.clone(),
    })
  }
}

/// Transform and filter in one step: a mapping producing nothing costs one
/// unit of upstream demand, replenished like a filter reject.
pub struct PartialMappingObserver<O, F> {
  inner: PassthroughObserver<O>,
  mapping: F,
}

impl<M, T, O, F> Observer<M> for PartialMappingObserver<O, F>
where
  O: Observer<T>,
  F: Fn(M) -> Option<T> + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    match (self.mapping)(message) {
      Some(mapped) => self.inner.pass_next(mapped),
      None => {
        if let Some(observation) = self.inner.observation() {
          observation.request_next();
        }
      }
    }
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.inner.pass_fail(failure); }
}

#[cfg(test)]
mod test {
  use crate::{
    prelude::*,
    testing::{RecordingObserver, collector, drain, held, push_into},
  };

  #[test]
  fn passes_only_matching_messages() {
    let collected = collector();
    observable::of(1..=10)
      .filter(|v| v % 2 == 0)
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![2, 4, 6, 8, 10]);
  }

  #[test]
  fn bounded_demand_is_honored_through_rejects() {
    let (observer, events, observation) = RecordingObserver::new(1);
    observable::of(1..=10)
      .filter(|v| v % 2 == 0)
      .observe(observer);

    // One request, one matching message, despite the reject of `1`.
    assert_eq!(drain(&events), vec!["observe".to_string(), "next 2".into()]);

    held(&observation).request_next();
    assert_eq!(
      drain(&events),
      vec!["observe".to_string(), "next 2".into(), "next 4".into()]
    );
  }

  #[test]
  fn rejecting_everything_still_completes() {
    let (observer, events, _observation) = RecordingObserver::new(1);
    observable::of(vec![1, 3, 5]).filter(|v| v % 2 == 0).observe(observer);
    assert_eq!(drain(&events), vec!["observe".to_string(), "complete".into()]);
  }

  #[test]
  fn partial_map_transforms_and_filters_at_once() {
    let collected = collector();
    observable::of(vec!["1", "x", "3"])
      .partial_map(|v: &str| v.parse::<i32>().ok())
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![1, 3]);
  }
}
