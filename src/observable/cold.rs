//! Demand-driven pull source.
//!
//! Every attach gets an independent cursor over the backing sequence.
//! `request(n)` synchronously advances the cursor and delivers up to `n`
//! elements on the calling thread, fewer if the sequence is exhausted,
//! followed immediately by completion. `request(UNBOUNDED)` drains the
//! whole sequence. A trampolined drain loop makes re-entrant requests from
//! inside `on_next` safe: nested demand accumulates into the active loop.

use std::sync::{Arc, Mutex};

use crate::{
  observable::Observable,
  observation::{Observation, ObservationLike, RequestCount},
  observer::Observer,
  ops::safe::SafeObserver,
};

/// Reusable pull source; each subscriber iterates the backing sequence
/// independently.
#[derive(Clone)]
pub struct ColdObservable<I> {
  sequence: I,
}

impl<I> ColdObservable<I> {
  pub fn new(sequence: I) -> Self { Self { sequence } }
}

impl<M, I> Observable<M> for ColdObservable<I>
where
  M: Send + 'static,
  I: IntoIterator<Item = M> + Clone + Send + Sync + 'static,
  I::IntoIter: Send,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let cursor = Arc::new(ColdCursor {
      state: Mutex::new(CursorState {
        iterator: self.sequence.clone().into_iter(),
        demand: RequestCount::new(),
        draining: false,
        cancelled: false,
        terminated: false,
      }),
      observer: Mutex::new(Some(Box::new(SafeObserver::new(observer)))),
    });
    let observation = Observation::from_arc(cursor.clone() as _);
    // Demand requested from inside `on_observe` lands in the drain below.
    cursor
      .state
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .draining = true;
    cursor.deliver(|observer| observer.on_observe(observation.clone()));
    cursor.drain();
    observation
  }
}

/// One-element backing sequence that evaluates its supplier lazily, on the
/// first pull of each subscription.
#[derive(Clone)]
pub struct SupplierSequence<F> {
  supplier: F,
}

impl<F> SupplierSequence<F> {
  pub(crate) fn new(supplier: F) -> Self { Self { supplier } }
}

impl<M, F> IntoIterator for SupplierSequence<F>
where
  F: FnMut() -> M,
{
  type Item = M;
  type IntoIter = SupplierIter<F>;

  fn into_iter(self) -> Self::IntoIter {
    SupplierIter { supplier: Some(self.supplier) }
  }
}

pub struct SupplierIter<F> {
  supplier: Option<F>,
}

impl<M, F> Iterator for SupplierIter<F>
where
  F: FnMut() -> M,
{
  type Item = M;

  fn next(&mut self) -> Option<M> {
    self.supplier.take().map(|mut supplier| supplier())
  }
}

struct CursorState<It> {
  iterator: It,
  demand: RequestCount,
  draining: bool,
  cancelled: bool,
  terminated: bool,
}

struct ColdCursor<It: Iterator> {
  state: Mutex<CursorState<It>>,
  observer: Mutex<Option<Box<dyn Observer<It::Item>>>>,
}

impl<It: Iterator> ColdCursor<It> {
  /// Take the sink out of its slot, invoke, put it back. The slot is empty
  /// exactly while a delivery is on the stack, which structurally enforces
  /// one delivery context per subscription.
  fn deliver(&self, event: impl FnOnce(&mut Box<dyn Observer<It::Item>>)) {
    let taken = self
      .observer
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take();
    let Some(mut observer) = taken else { return };
    event(&mut observer);
    let mut slot = self.observer.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_none() {
      *slot = Some(observer);
    }
  }

  fn drop_observer(&self) {
    self
      .observer
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take();
  }

  /// Flush outstanding demand. Callers must have set the `draining` flag;
  /// the loop clears it on exit.
  fn drain(&self) {
    loop {
      enum Step<M> {
        Deliver(M),
        Exhausted,
        Rest,
      }
      let step = {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.cancelled {
          state.draining = false;
          return;
        }
        if state.demand.is_fulfilled() {
          state.draining = false;
          Step::Rest
        } else {
          match state.iterator.next() {
            Some(message) => {
              state.demand.fulfil();
              Step::Deliver(message)
            }
            None => {
              state.terminated = true;
              state.draining = false;
              Step::Exhausted
            }
          }
        }
      };
      match step {
        Step::Deliver(message) => {
          self.deliver(|observer| observer.on_next(message))
        }
        Step::Exhausted => {
          self.deliver(|observer| observer.on_complete());
          self.drop_observer();
          return;
        }
        Step::Rest => return,
      }
    }
  }
}

impl<It> ObservationLike for ColdCursor<It>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request(&self, count: u64) {
    {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      if state.cancelled || state.terminated {
        return;
      }
      state.demand.request(count);
      if state.draining {
        // A drain loop lower on the stack (or on another thread) picks up
        // the new demand.
        return;
      }
      state.draining = true;
    }
    self.drain();
  }

  fn pending_requests(&self) -> u64 {
    self
      .state
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .demand
      .count()
  }

  fn cancel(&self) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if state.cancelled {
      return;
    }
    state.cancelled = true;
    drop(state);
    self.drop_observer();
  }

  fn is_cancelled(&self) -> bool {
    self
      .state
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .cancelled
  }
}

#[cfg(test)]
mod test {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{error::Failure, observation::UNBOUNDED};

  #[derive(Clone, Default)]
  struct Probe {
    events: Arc<Mutex<Vec<String>>>,
  }

  struct ProbeObserver {
    events: Arc<Mutex<Vec<String>>>,
    observation: Arc<Mutex<Option<Observation>>>,
    demand_on_observe: u64,
  }

  impl Probe {
    fn observer(&self, demand_on_observe: u64) -> (ProbeObserver, Arc<Mutex<Option<Observation>>>) {
      let observation = Arc::new(Mutex::new(None));
      (
        ProbeObserver {
          events: self.events.clone(),
          observation: observation.clone(),
          demand_on_observe,
        },
        observation,
      )
    }

    fn events(&self) -> Vec<String> { self.events.lock().unwrap().clone() }
  }

  impl Observer<i32> for ProbeObserver {
    fn on_observe(&mut self, observation: Observation) {
      *self.observation.lock().unwrap() = Some(observation.clone());
      if self.demand_on_observe > 0 {
        observation.request(self.demand_on_observe);
      }
    }

    fn on_next(&mut self, message: i32) {
      self.events.lock().unwrap().push(format!("next {message}"));
    }

    fn on_complete(&mut self) {
      self.events.lock().unwrap().push("complete".into());
    }

    fn on_fail(&mut self, failure: Failure) {
      self.events.lock().unwrap().push(format!("fail {failure}"));
    }
  }

  #[test]
  fn delivers_nothing_without_demand() {
    let probe = Probe::default();
    let (observer, _) = probe.observer(0);
    ColdObservable::new(vec![1, 2, 3]).observe(observer);
    assert!(probe.events().is_empty());
  }

  #[test]
  fn delivers_up_to_the_requested_count() {
    let probe = Probe::default();
    let (observer, observation) = probe.observer(2);
    ColdObservable::new(vec![1, 2, 3]).observe(observer);
    assert_eq!(probe.events(), vec!["next 1".to_string(), "next 2".into()]);

    let observation = observation.lock().unwrap().clone().unwrap();
    observation.request_next();
    assert_eq!(
      probe.events(),
      vec!["next 1".to_string(), "next 2".into(), "next 3".into()]
    );
  }

  #[test]
  fn unbounded_request_drains_and_completes() {
    let probe = Probe::default();
    let (observer, _) = probe.observer(UNBOUNDED);
    ColdObservable::new(vec![1, 2]).observe(observer);
    assert_eq!(
      probe.events(),
      vec!["next 1".to_string(), "next 2".into(), "complete".into()]
    );
  }

  #[test]
  fn exhaustion_mid_request_completes_immediately() {
    let probe = Probe::default();
    let (observer, _) = probe.observer(10);
    ColdObservable::new(vec![1, 2]).observe(observer);
    assert_eq!(
      probe.events(),
      vec!["next 1".to_string(), "next 2".into(), "complete".into()]
    );
  }

  #[test]
  fn each_subscriber_gets_an_independent_cursor() {
    let source = ColdObservable::new(vec![1, 2, 3]);
    let first = Probe::default();
    let second = Probe::default();
    let (observer, _) = first.observer(UNBOUNDED);
    source.observe(observer);
    let (observer, _) = second.observer(UNBOUNDED);
    source.observe(observer);
    assert_eq!(first.events(), second.events());
    assert_eq!(first.events().len(), 4);
  }

  #[test]
  fn cancel_mid_drain_suppresses_further_delivery() {
    let probe = Probe::default();
    let events = probe.events.clone();

    struct CancellingObserver {
      events: Arc<Mutex<Vec<String>>>,
      observation: Option<Observation>,
    }

    impl Observer<i32> for CancellingObserver {
      fn on_observe(&mut self, observation: Observation) {
        self.observation = Some(observation.clone());
        observation.request_unbounded();
      }

      fn on_next(&mut self, message: i32) {
        self.events.lock().unwrap().push(format!("next {message}"));
        if message == 2 {
          self.observation.as_ref().unwrap().cancel();
        }
      }

      fn on_complete(&mut self) {
        self.events.lock().unwrap().push("complete".into());
      }
    }

    ColdObservable::new(1..=5).observe(CancellingObserver {
      events,
      observation: None,
    });
    assert_eq!(probe.events(), vec!["next 1".to_string(), "next 2".into()]);
  }

  #[test]
  fn reentrant_request_from_delivery_keeps_flowing() {
    let probe = Probe::default();
    let events = probe.events.clone();

    struct PullingObserver {
      events: Arc<Mutex<Vec<String>>>,
      observation: Option<Observation>,
    }

    impl Observer<i32> for PullingObserver {
      fn on_observe(&mut self, observation: Observation) {
        self.observation = Some(observation.clone());
        observation.request_next();
      }

      fn on_next(&mut self, message: i32) {
        self.events.lock().unwrap().push(format!("next {message}"));
        self.observation.as_ref().unwrap().request_next();
      }

      fn on_complete(&mut self) {
        self.events.lock().unwrap().push("complete".into());
      }
    }

    ColdObservable::new(1..=3).observe(PullingObserver { events, observation: None });
    assert_eq!(
      probe.events(),
      vec![
        "next 1".to_string(),
        "next 2".into(),
        "next 3".into(),
        "complete".into()
      ]
    );
  }

  #[test]
  fn request_after_completion_is_a_no_op() {
    let probe = Probe::default();
    let (observer, observation) = probe.observer(UNBOUNDED);
    ColdObservable::new(vec![1]).observe(observer);
    let observation = observation.lock().unwrap().clone().unwrap();
    observation.request_next();
    observation.cancel();
    assert_eq!(probe.events(), vec!["next 1".to_string(), "complete".into()]);
  }
}
