//! Shared helpers for unit tests.

use std::sync::{Arc, Mutex};

use crate::{error::Failure, observation::Observation, observer::Observer};

pub(crate) type Collected<T> = Arc<Mutex<Vec<T>>>;

pub(crate) fn collector<T>() -> Collected<T> {
  Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn push_into<T: Send + 'static>(
  collected: &Collected<T>,
) -> impl FnMut(T) + Send + 'static {
  let collected = collected.clone();
  move |v| collected.lock().unwrap().push(v)
}

pub(crate) fn drain<T: Clone>(collected: &Collected<T>) -> Vec<T> {
  collected.lock().unwrap().clone()
}

/// Observer recording every protocol event as a line, with a fixed demand
/// issued at observe time and the observation handle exposed for the test.
pub(crate) struct RecordingObserver<M> {
  events: Collected<String>,
  observation: Arc<Mutex<Option<Observation>>>,
  demand_on_observe: u64,
  _marker: std::marker::PhantomData<fn(M)>,
}

impl<M> RecordingObserver<M> {
  pub(crate) fn new(
    demand_on_observe: u64,
  ) -> (Self, Collected<String>, Arc<Mutex<Option<Observation>>>) {
    let events = collector();
    let observation = Arc::new(Mutex::new(None));
    (
      Self {
        events: events.clone(),
        observation: observation.clone(),
        demand_on_observe,
        _marker: std::marker::PhantomData,
      },
      events,
      observation,
    )
  }
}

pub(crate) fn held(observation: &Arc<Mutex<Option<Observation>>>) -> Observation {
  observation.lock().unwrap().clone().expect("observed")
}

impl<M> Observer<M> for RecordingObserver<M>
where
  M: std::fmt::Debug + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    *self.observation.lock().unwrap() = Some(observation.clone());
    self.events.lock().unwrap().push("observe".into());
    if self.demand_on_observe > 0 {
      observation.request(self.demand_on_observe);
    }
  }

  fn on_next(&mut self, message: M) {
    self.events.lock().unwrap().push(format!("next {message:?}"));
  }

  fn on_complete(&mut self) {
    self.events.lock().unwrap().push("complete".into());
  }

  fn on_fail(&mut self, failure: Failure) {
    self.events.lock().unwrap().push(format!("fail {failure}"));
  }
}
