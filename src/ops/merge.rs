//! N-way merge without fine-grained demand.
//!
//! Every inner source is subscribed up front with an unbounded request;
//! the shared bookkeeping exists only for cancellation fan-out and for
//! counting completions. The merged sequence completes when the last inner
//! source completes; the first inner failure cancels the siblings and
//! propagates downstream.

use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, UNBOUNDED},
  observer::Observer,
  ops::serialize::SerializedObserver,
};

#[derive(Clone)]
pub struct MergeOp<S> {
  pub(crate) sources: Vec<S>,
}

impl<M, S> Observable<M> for MergeOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let shared = Arc::new(MergeShared {
      state: Mutex::new(MergeState {
        observations: SmallVec::new(),
        remaining: self.sources.len(),
        cancelled: false,
        terminated: false,
      }),
      downstream: SerializedObserver::new(observer),
    });

    let handle = Observation::new(MergeObservation { shared: shared.clone() });
    shared.downstream().on_observe(handle.clone());

    if self.sources.is_empty() {
      shared.complete_once();
      return handle;
    }
    for source in &self.sources {
      source.observe(MergingObserver { shared: shared.clone() });
    }
    handle
  }
}

struct MergeState {
  observations: SmallVec<[Observation; 4]>,
  remaining: usize,
  cancelled: bool,
  terminated: bool,
}

struct MergeShared<M, O> {
  state: Mutex<MergeState>,
  downstream: SerializedObserver<M, O>,
}

impl<M, O> MergeShared<M, O>
where
  M: Send,
  O: Observer<M>,
{
  fn lock_state(&self) -> std::sync::MutexGuard<'_, MergeState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn downstream(&self) -> SerializedObserver<M, O> { self.downstream.clone() }

  fn complete_once(&self) {
    let deliver = {
      let mut state = self.lock_state();
      if state.terminated || state.cancelled {
        false
      } else {
        state.terminated = true;
        true
      }
    };
    if deliver {
      self.downstream().on_complete();
    }
  }

  fn fail_once(&self, failure: Failure) {
    let siblings = {
      let mut state = self.lock_state();
      if state.terminated || state.cancelled {
        None
      } else {
        state.terminated = true;
        Some(std::mem::take(&mut state.observations))
      }
    };
    if let Some(siblings) = siblings {
      for observation in siblings {
        observation.cancel();
      }
      self.downstream().on_fail(failure);
    }
  }
}

pub struct MergingObserver<M, O> {
  shared: Arc<MergeShared<M, O>>,
}

impl<M, O> Observer<M> for MergingObserver<M, O>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    let rejected = {
      let mut state = self.shared.lock_state();
      if state.cancelled || state.terminated {
        true
      } else {
        state.observations.push(observation.clone());
        false
      }
    };
    if rejected {
      observation.cancel();
    } else {
      observation.request_unbounded();
    }
  }

  fn on_next(&mut self, message: M) {
    let suppressed = {
      let state = self.shared.lock_state();
      state.cancelled || state.terminated
    };
    if !suppressed {
      self.shared.downstream().on_next(message);
    }
  }

  fn on_complete(&mut self) {
    let last = {
      let mut state = self.shared.lock_state();
      state.remaining = state.remaining.saturating_sub(1);
      state.remaining == 0
    };
    if last {
      self.shared.complete_once();
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    self.shared.fail_once(failure);
  }
}

/// Downstream handle: demand is not redistributed (inners run unbounded),
/// cancellation fans out to every inner observation.
struct MergeObservation<M, O> {
  shared: Arc<MergeShared<M, O>>,
}

impl<M, O> ObservationLike for MergeObservation<M, O>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
{
  fn request(&self, _count: u64) {}

  fn pending_requests(&self) -> u64 { UNBOUNDED }

  fn cancel(&self) {
    let observations = {
      let mut state = self.shared.lock_state();
      state.cancelled = true;
      std::mem::take(&mut state.observations)
    };
    for observation in observations {
      observation.cancel();
    }
  }

  fn is_cancelled(&self) -> bool { self.shared.lock_state().cancelled }
}
