//! Value prefixing.
//!
//! Each subscriber's first granted request delivers a freshly supplied
//! value before any upstream message; remaining demand flows upstream
//! untouched.

use std::sync::{Arc, Mutex};

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, UNBOUNDED},
  observer::Observer,
  ops::serialize::SerializedObserver,
};

#[derive(Clone)]
pub struct PrefixOp<S, F> {
  pub(crate) source: S,
  pub(crate) supplier: F,
}

impl<M, S, F> Observable<M> for PrefixOp<S, F>
where
  M: Send + 'static,
  S: Observable<M>,
  F: Fn() -> M + Clone + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(PrefixingObserver {
      downstream: SerializedObserver::new(observer),
      supplier: Arc::new(self.supplier.clone()),
      shared: Arc::new(Mutex::new(PrefixState { sent: false, upstream: None })),
    })
  }
}

struct PrefixState {
  sent: bool,
  upstream: Option<Observation>,
}

pub struct PrefixingObserver<M, O, F> {
  downstream: SerializedObserver<M, O>,
  supplier: Arc<F>,
  shared: Arc<Mutex<PrefixState>>,
}

impl<M, O, F> Observer<M> for PrefixingObserver<M, O, F>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
  F: Fn() -> M + Send + Sync + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .upstream = Some(observation);
    let wrapped = Observation::new(PrefixObservation {
      shared: self.shared.clone(),
      deliver: {
        let supplier = self.supplier.clone();
        let downstream = self.downstream.clone();
        Box::new(move || downstream.clone().on_next(supplier()))
      },
    });
    self.downstream.on_observe(wrapped);
  }

  fn on_next(&mut self, message: M) { self.downstream.on_next(message); }

  fn on_complete(&mut self) { self.downstream.on_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.downstream.on_fail(failure); }
}

struct PrefixObservation {
  shared: Arc<Mutex<PrefixState>>,
  deliver: Box<dyn Fn() + Send + Sync>,
}

impl ObservationLike for PrefixObservation {
  fn request(&self, count: u64) {
    let (deliver_prefix, forward) = {
      let mut state = self.shared.lock().unwrap_or_else(|e| e.into_inner());
      if !state.sent && count > 0 {
        state.sent = true;
        let forward = if count == UNBOUNDED { count } else { count - 1 };
        (true, forward)
      } else {
        (false, count)
      }
    };
    if deliver_prefix {
      (self.deliver)();
    }
    if forward > 0 {
      if let Some(upstream) = self.upstream() {
        upstream.request(forward);
      }
    }
  }

  fn pending_requests(&self) -> u64 {
    self
      .upstream()
      .map(|upstream| upstream.pending_requests())
      .unwrap_or(0)
  }

  fn cancel(&self) {
    if let Some(upstream) = self.upstream() {
      upstream.cancel();
    }
  }

  fn is_cancelled(&self) -> bool {
    self
      .upstream()
      .map(|upstream| upstream.is_cancelled())
      .unwrap_or(false)
  }
}

impl PrefixObservation {
  fn upstream(&self) -> Option<Observation> {
    self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .upstream
      .clone()
  }
}
