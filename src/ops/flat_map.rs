//! Demand-redistributing composition.
//!
//! Each upstream message is mapped to an inner source and subscribed. One
//! downstream demand accumulator feeds the inner observations through a
//! [`RequestAllocator`]; with no inner observations to satisfy a request,
//! one more message is pulled from upstream. Inner completion returns its
//! unused demand to the accumulator. The first inner failure wins: all
//! sibling observations and the upstream are cancelled and the failure
//! propagates downstream immediately.
//!
//! Bookkeeping lives under a private mutex which is never held around a
//! downstream delivery or an allocation, since either can synchronously
//! re-enter the operator.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, RequestCount},
  observer::Observer,
  ops::{request_allocator::RequestAllocator, serialize::SerializedObserver},
};

pub struct FlatMapOp<S, F, A, M> {
  pub(crate) source: S,
  pub(crate) mapping: F,
  pub(crate) allocator: A,
  pub(crate) _marker: PhantomData<fn(M)>,
}

impl<S: Clone, F: Clone, A: Clone, M> Clone for FlatMapOp<S, F, A, M> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      mapping: self.mapping.clone(),
      allocator: self.allocator.clone(),
      _marker: PhantomData,
    }
  }
}

impl<M, U, S, S2, F, A> Observable<U> for FlatMapOp<S, F, A, M>
where
  M: Send + 'static,
  U: Send + 'static,
  S: Observable<M>,
  S2: Observable<U>,
  F: Fn(M) -> S2 + Clone + Send + Sync + 'static,
  A: RequestAllocator + Clone + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<U> + 'static,
  {
    let shared = Arc::new(FlatMapShared {
      state: Mutex::new(FlatMapState {
        upstream: None,
        inners: SmallVec::new(),
        outstanding: RequestCount::new(),
        next_id: 0,
        cancelled: false,
      }),
      downstream: SerializedObserver::new(observer),
      allocator: Box::new(self.allocator.clone()),
    });
    self.source.observe(FlatMappingObserver {
      shared,
      mapping: self.mapping.clone(),
    })
  }
}

struct FlatMapState {
  upstream: Option<Observation>,
  inners: SmallVec<[(u64, Observation); 2]>,
  outstanding: RequestCount,
  next_id: u64,
  cancelled: bool,
}

struct FlatMapShared<M, O> {
  state: Mutex<FlatMapState>,
  downstream: SerializedObserver<M, O>,
  allocator: Box<dyn RequestAllocator>,
}

impl<M, O> FlatMapShared<M, O>
where
  M: Send,
  O: Observer<M>,
{
  fn lock_state(&self) -> std::sync::MutexGuard<'_, FlatMapState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn downstream(&self) -> SerializedObserver<M, O> { self.downstream.clone() }

  /// Route outstanding demand: allocate among the inner observations, or
  /// pull one more message from upstream when there are none.
  fn allocate_requests(&self) {
    enum Action {
      Idle,
      Pull(Observation),
      Grant(u64, SmallVec<[Observation; 4]>),
    }

    let action = {
      let mut state = self.lock_state();
      if state.cancelled || state.outstanding.is_fulfilled() {
        Action::Idle
      } else if state.inners.is_empty() {
        match state.upstream.clone() {
          Some(upstream) => Action::Pull(upstream),
          None => Action::Idle,
        }
      } else {
        let count = state.outstanding.take();
        let observations = state
          .inners
          .iter()
          .map(|(_, observation)| observation.clone())
          .collect();
        Action::Grant(count, observations)
      }
    };

    match action {
      Action::Idle => {}
      Action::Pull(upstream) => upstream.request_next(),
      Action::Grant(count, observations) => {
        let remaining = self.allocator.allocate(count, &observations);
        if remaining > 0 {
          self.lock_state().outstanding.request(remaining);
        }
      }
    }
  }

  fn cancel_all(&self) {
    let (upstream, inners) = {
      let mut state = self.lock_state();
      state.cancelled = true;
      (
        state.upstream.clone(),
        std::mem::take(&mut state.inners),
      )
    };
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
    for (_, observation) in inners {
      observation.cancel();
    }
  }
}

pub struct FlatMappingObserver<M, O, F> {
  shared: Arc<FlatMapShared<M, O>>,
  mapping: F,
}

impl<M, U, S2, O, F> Observer<M> for FlatMappingObserver<U, O, F>
where
  M: Send + 'static,
  U: Send + 'static,
  S2: Observable<U>,
  O: Observer<U> + 'static,
  F: Fn(M) -> S2 + Send + Sync + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    self.shared.lock_state().upstream = Some(observation);
    let handle = Observation::new(FlatMapObservation { shared: self.shared.clone() });
    self.shared.downstream().on_observe(handle);
  }

  fn on_next(&mut self, message: M) {
    let cancelled = self.shared.lock_state().cancelled;
    if cancelled {
      return;
    }
    let inner_source = (self.mapping)(message);
    inner_source.observe(InnerObserver {
      shared: self.shared.clone(),
      id: None,
    });
  }

  fn on_complete(&mut self) {
    self.shared.downstream().on_complete();
  }

  fn on_fail(&mut self, failure: Failure) {
    self.shared.cancel_all();
    self.shared.downstream().on_fail(failure);
  }
}

/// The downstream-facing observation: demand lands in the accumulator and
/// is immediately routed; cancellation fans out to upstream and every
/// inner observation.
struct FlatMapObservation<M, O> {
  shared: Arc<FlatMapShared<M, O>>,
}

impl<M, O> ObservationLike for FlatMapObservation<M, O>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
{
  fn request(&self, count: u64) {
    self.shared.lock_state().outstanding.request(count);
    self.shared.allocate_requests();
  }

  fn pending_requests(&self) -> u64 {
    let observations: SmallVec<[Observation; 4]> = {
      let state = self.shared.lock_state();
      state
        .inners
        .iter()
        .map(|(_, observation)| observation.clone())
        .collect()
    };
    observations
      .iter()
      .map(Observation::pending_requests)
      .fold(0u64, u64::saturating_add)
  }

  fn cancel(&self) { self.shared.cancel_all(); }

  fn is_cancelled(&self) -> bool { self.shared.lock_state().cancelled }
}

/// Sink attached to each mapped inner source.
struct InnerObserver<M, O> {
  shared: Arc<FlatMapShared<M, O>>,
  id: Option<u64>,
}

impl<M, O> Observer<M> for InnerObserver<M, O>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    {
      let mut state = self.shared.lock_state();
      if state.cancelled {
        drop(state);
        observation.cancel();
        return;
      }
      let id = state.next_id;
      state.next_id += 1;
      self.id = Some(id);
      state.inners.push((id, observation));
    }
    self.shared.allocate_requests();
  }

  fn on_next(&mut self, message: M) {
    self.shared.downstream().on_next(message);
    let starved = {
      let state = self.shared.lock_state();
      self
        .id
        .and_then(|id| {
          state
            .inners
            .iter()
            .find(|(candidate, _)| *candidate == id)
        })
        .map(|(_, observation)| observation.pending_requests() == 0)
        .unwrap_or(false)
    };
    if starved {
      self.shared.allocate_requests();
    }
  }

  fn on_complete(&mut self) {
    let returned = {
      let mut state = self.shared.lock_state();
      match self.id {
        Some(id) => match state.inners.iter().position(|(candidate, _)| *candidate == id) {
          Some(index) => {
            let (_, observation) = state.inners.remove(index);
            let returned = observation.pending_requests();
            state.outstanding.request(returned);
            true
          }
          None => false,
        },
        None => false,
      }
    };
    if returned {
      self.shared.allocate_requests();
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    self.shared.cancel_all();
    self.shared.downstream().on_fail(failure);
  }
}
