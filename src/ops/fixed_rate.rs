//! Time-driven demand.
//!
//! Converts wall-clock ticks into upstream requests: one message is pulled
//! per period, after an initial delay. Downstream demand is not consulted;
//! the tick is the demand. Cancelling the subscription cancels the
//! underlying timer task, so no scheduled work leaks.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike},
  observer::Observer,
  scheduler::{self, TimerHandle},
};

#[derive(Clone)]
pub struct FixedRateOp<S> {
  pub(crate) source: S,
  pub(crate) delay: Duration,
  pub(crate) period: Duration,
}

impl<M, S> Observable<M> for FixedRateOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let shared = Arc::new(Mutex::new(FixedRateState { upstream: None, timer: None }));
    let handle = Observation::new(FixedRateObservation { shared: shared.clone() });
    self.source.observe(FixedRateObserver {
      downstream: observer,
      handle: handle.clone(),
      shared,
      delay: self.delay,
      period: self.period,
    });
    handle
  }
}

struct FixedRateState {
  upstream: Option<Observation>,
  timer: Option<TimerHandle>,
}

pub struct FixedRateObserver<O> {
  downstream: O,
  handle: Observation,
  shared: Arc<Mutex<FixedRateState>>,
  delay: Duration,
  period: Duration,
}

impl<O> FixedRateObserver<O> {
  fn stop_timer(&self) {
    let timer = self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .timer
      .take();
    if let Some(timer) = timer {
      timer.cancel();
    }
  }
}

impl<M, O> Observer<M> for FixedRateObserver<O>
where
  M: Send,
  O: Observer<M>,
{
  fn on_observe(&mut self, observation: Observation) {
    {
      let mut state = self.shared.lock().unwrap_or_else(|e| e.into_inner());
      state.upstream = Some(observation.clone());
      let tick_target = observation.clone();
      state.timer = Some(scheduler::schedule_at_fixed_rate(
        self.delay,
        self.period,
        move || tick_target.request_next(),
      ));
    }
    self.downstream.on_observe(self.handle.clone());
  }

  fn on_next(&mut self, message: M) { self.downstream.on_next(message); }

  fn on_complete(&mut self) {
    self.stop_timer();
    self.downstream.on_complete();
  }

  fn on_fail(&mut self, failure: Failure) {
    self.stop_timer();
    self.downstream.on_fail(failure);
  }
}

/// Requests are absorbed (time drives demand); cancellation stops the
/// timer task and the upstream subscription.
struct FixedRateObservation {
  shared: Arc<Mutex<FixedRateState>>,
}

impl FixedRateObservation {
  fn lock(&self) -> std::sync::MutexGuard<'_, FixedRateState> {
    self.shared.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl ObservationLike for FixedRateObservation {
  fn request(&self, _count: u64) {}

  fn pending_requests(&self) -> u64 {
    self
      .lock()
      .upstream
      .as_ref()
      .map(Observation::pending_requests)
      .unwrap_or(0)
  }

  fn cancel(&self) {
    let (upstream, timer) = {
      let mut state = self.lock();
      (state.upstream.clone(), state.timer.take())
    };
    if let Some(timer) = timer {
      timer.cancel();
    }
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }

  fn is_cancelled(&self) -> bool {
    self
      .lock()
      .upstream
      .as_ref()
      .map(Observation::is_cancelled)
      .unwrap_or(false)
  }
}
