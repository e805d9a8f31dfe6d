//! Side-observer injection.
//!
//! `then` splices an action observer in front of the downstream sink,
//! `then_after` behind it. Both receive the same observation handle, so an
//! action can drive demand on behalf of the chain; the demand-priming
//! operators (`request_unbounded`, `request_next`, `then_request_next`) are
//! built from exactly that.

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
};

#[derive(Clone)]
pub struct ThenOp<S, A> {
  pub(crate) source: S,
  pub(crate) action: A,
  pub(crate) action_first: bool,
}

impl<M, S, A> Observable<M> for ThenOp<S, A>
where
  M: Clone + Send + 'static,
  S: Observable<M>,
  A: Observer<M> + Clone + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(MultiplePassthroughObserver {
      downstream: observer,
      action: self.action.clone(),
      action_first: self.action_first,
    })
  }
}

/// Forwards each protocol event to two sinks in a fixed order.
pub struct MultiplePassthroughObserver<O, A> {
  downstream: O,
  action: A,
  action_first: bool,
}

impl<O, A> MultiplePassthroughObserver<O, A> {
  pub fn new(downstream: O, action: A) -> Self {
    Self { downstream, action, action_first: true }
  }

  pub fn after(downstream: O, action: A) -> Self {
    Self { downstream, action, action_first: false }
  }
}

impl<M, O, A> Observer<M> for MultiplePassthroughObserver<O, A>
where
  M: Clone,
  O: Observer<M>,
  A: Observer<M>,
{
  fn on_observe(&mut self, observation: Observation) {
    if self.action_first {
      self.action.on_observe(observation.clone());
      self.downstream.on_observe(observation);
    } else {
      self.downstream.on_observe(observation.clone());
      self.action.on_observe(observation);
    }
  }

  fn on_next(&mut self, message: M) {
    if self.action_first {
      self.action.on_next(message.clone());
      self.downstream.on_next(message);
    } else {
      self.downstream.on_next(message.clone());
      self.action.on_next(message);
    }
  }

  fn on_complete(&mut self) {
    if self.action_first {
      self.action.on_complete();
      self.downstream.on_complete();
    } else {
      self.downstream.on_complete();
      self.action.on_complete();
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if self.action_first {
      self.action.on_fail(failure.clone());
      self.downstream.on_fail(failure);
    } else {
      self.downstream.on_fail(failure.clone());
      self.action.on_fail(failure);
    }
  }
}

#[cfg(test)]
mod test {
  use crate::{
    prelude::*,
    testing::{collector, drain},
  };

  #[test]
  fn action_sees_events_before_the_downstream() {
    let order = collector();
    let action_log = {
      let order = order.clone();
      crate::observer::for_observation(move |_o: &Observation, m: i32| {
        order.lock().unwrap().push(format!("action {m}"))
      })
    };
    let sink_log = {
      let order = order.clone();
      move |m: i32| order.lock().unwrap().push(format!("sink {m}"))
    };

    observable::of(vec![1, 2]).then(action_log).subscribe(sink_log);
    assert_eq!(
      drain(&order),
      vec![
        "action 1".to_string(),
        "sink 1".into(),
        "action 2".into(),
        "sink 2".into()
      ]
    );
  }

  #[test]
  fn then_after_reverses_the_order() {
    let order = collector();
    let action_log = {
      let order = order.clone();
      crate::observer::for_observation(move |_o: &Observation, m: i32| {
        order.lock().unwrap().push(format!("action {m}"))
      })
    };
    let sink_log = {
      let order = order.clone();
      move |m: i32| order.lock().unwrap().push(format!("sink {m}"))
    };

    observable::of(vec![1]).then_after(action_log).subscribe(sink_log);
    assert_eq!(
      drain(&order),
      vec!["sink 1".to_string(), "action 1".into()]
    );
  }

  #[test]
  fn request_unbounded_primes_the_chain() {
    // The recording sink requests nothing itself; the priming action does.
    let (sink, events, _observation) =
      crate::testing::RecordingObserver::<i32>::new(0);
    observable::of(vec![1, 2, 3])
      .request_unbounded()
      .observe(sink);
    assert_eq!(
      crate::testing::drain(&events),
      vec![
        "observe".to_string(),
        "next 1".into(),
        "next 2".into(),
        "next 3".into(),
        "complete".into()
      ]
    );
  }

  #[test]
  fn then_request_next_pulls_one_message_at_a_time() {
    let (sink, events, _observation) =
      crate::testing::RecordingObserver::<i32>::new(1);
    observable::of(vec![1, 2, 3])
      .then_request_next()
      .observe(sink);
    assert_eq!(
      crate::testing::drain(&events),
      vec![
        "observe".to_string(),
        "next 1".into(),
        "next 2".into(),
        "next 3".into(),
        "complete".into()
      ]
    );
  }
}
