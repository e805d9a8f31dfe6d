//! Backpressure introduction by reduction.
//!
//! The reducing observer requests unbounded demand upstream and folds every
//! incoming message into a running accumulation. Nothing is forwarded until
//! downstream demand is available; each grant forwards exactly one folded
//! value and resets the fold. Completion with a pending fold is deferred
//! until the fold is drained by the next request.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, RequestCount},
  observer::Observer,
  ops::serialize::SerializedObserver,
};

pub struct ReduceBackpressureOp<S, I, A, M> {
  pub(crate) source: S,
  pub(crate) initial: I,
  pub(crate) accumulator: A,
  pub(crate) _marker: PhantomData<fn(M)>,
}

impl<S: Clone, I: Clone, A: Clone, M> Clone for ReduceBackpressureOp<S, I, A, M> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      initial: self.initial.clone(),
      accumulator: self.accumulator.clone(),
      _marker: PhantomData,
    }
  }
}

impl<M, R, S, I, A> Observable<R> for ReduceBackpressureOp<S, I, A, M>
where
  M: Send + 'static,
  R: Send + 'static,
  S: Observable<M>,
  I: Fn(M) -> R + Clone + Send + 'static,
  A: Fn(R, M) -> R + Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<R> + 'static,
  {
    self.source.observe(BackpressureReducingObserver {
      shared: Arc::new(ReduceShared {
        state: Mutex::new(ReduceState {
          current: None,
          demand: RequestCount::new(),
          complete: false,
          completion_sent: false,
          upstream: None,
        }),
        downstream: SerializedObserver::new(observer),
      }),
      initial: self.initial.clone(),
      accumulator: self.accumulator.clone(),
    })
  }
}

struct ReduceState<R> {
  current: Option<R>,
  demand: RequestCount,
  complete: bool,
  completion_sent: bool,
  upstream: Option<Observation>,
}

struct ReduceShared<R, O> {
  state: Mutex<ReduceState<R>>,
  downstream: SerializedObserver<R, O>,
}

impl<R, O> ReduceShared<R, O>
where
  R: Send,
  O: Observer<R>,
{
  fn lock_state(&self) -> std::sync::MutexGuard<'_, ReduceState<R>> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Forward the fold if demand allows, then any deferred completion.
  fn flush(&self) {
    let (message, completed) = {
      let mut state = self.lock_state();
      let message = if state.current.is_some() && !state.demand.is_fulfilled() {
        state.demand.fulfil();
        state.current.take()
      } else {
        None
      };
      let completed =
        state.complete && state.current.is_none() && !state.completion_sent;
      if completed {
        state.completion_sent = true;
      }
      (message, completed)
    };
    let mut downstream = self.downstream.clone();
    if let Some(message) = message {
      downstream.on_next(message);
    }
    if completed {
      downstream.on_complete();
    }
  }
}

pub struct BackpressureReducingObserver<R, O, I, A> {
  shared: Arc<ReduceShared<R, O>>,
  initial: I,
  accumulator: A,
}

impl<M, R, O, I, A> Observer<M> for BackpressureReducingObserver<R, O, I, A>
where
  M: Send + 'static,
  R: Send + 'static,
  O: Observer<R> + 'static,
  I: Fn(M) -> R + Send,
  A: Fn(R, M) -> R + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.shared.lock_state().upstream = Some(observation.clone());
    let handle = Observation::new(ReduceObservation { shared: self.shared.clone() });
    self.shared.downstream.clone().on_observe(handle);
    observation.request_unbounded();
  }

  fn on_next(&mut self, message: M) {
    {
      let mut state = self.shared.lock_state();
      if state.complete {
        return;
      }
      state.current = Some(match state.current.take() {
        None => (self.initial)(message),
        Some(current) => (self.accumulator)(current, message),
      });
    }
    self.shared.flush();
  }

  fn on_complete(&mut self) {
    self.shared.lock_state().complete = true;
    self.shared.flush();
  }

  fn on_fail(&mut self, failure: Failure) {
    {
      let mut state = self.shared.lock_state();
      state.complete = true;
      state.completion_sent = true;
      state.current = None;
    }
    self.shared.downstream.clone().on_fail(failure);
  }
}

struct ReduceObservation<R, O> {
  shared: Arc<ReduceShared<R, O>>,
}

impl<R, O> ObservationLike for ReduceObservation<R, O>
where
  R: Send + 'static,
  O: Observer<R> + 'static,
{
  fn request(&self, count: u64) {
    self.shared.lock_state().demand.request(count);
    self.shared.flush();
  }

  fn pending_requests(&self) -> u64 {
    self.shared.lock_state().demand.count()
  }

  fn cancel(&self) {
    let upstream = self.shared.lock_state().upstream.clone();
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }

  fn is_cancelled(&self) -> bool {
    self
      .shared
      .lock_state()
      .upstream
      .as_ref()
      .map(Observation::is_cancelled)
      .unwrap_or(false)
  }
}

/// Sequence accumulator with a hard capacity; insertion past the maximum is
/// rejected and the element dropped, capping unbounded buffering.
#[derive(Clone, Debug)]
pub struct MaximumCapacityVec<T> {
  items: Vec<T>,
  capacity: usize,
}

impl<T> MaximumCapacityVec<T> {
  pub fn new(capacity: usize) -> Self {
    Self { items: Vec::new(), capacity }
  }

  /// Returns false, dropping `item`, once the capacity is reached.
  pub fn push(&mut self, item: T) -> bool {
    if self.items.len() >= self.capacity {
      tracing::debug!(capacity = self.capacity, "aggregation capacity reached");
      return false;
    }
    self.items.push(item);
    true
  }

  pub fn len(&self) -> usize { self.items.len() }

  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  pub fn into_vec(self) -> Vec<T> { self.items }
}
