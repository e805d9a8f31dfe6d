//! Resubscribing operators.
//!
//! `repeating` starts the source over on completion, `retrying` on
//! failure. Downstream sees a single continuous subscription: the facade
//! observation survives resubscriptions, forwards cancellation to whichever
//! upstream is current, and re-issues unfulfilled demand to each new
//! generation.

use std::sync::{Arc, Mutex};

use crate::{
  error::Failure,
  observable::Observable,
  observation::{Observation, ObservationLike, RequestCount},
  observer::Observer,
  ops::serialize::SerializedObserver,
};

#[derive(Clone)]
pub struct RepeatOp<S> {
  pub(crate) source: S,
}

impl<M, S> Observable<M> for RepeatOp<S>
where
  M: Send + 'static,
  S: Observable<M> + Clone + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let shared = resubscribing_core(self.source.clone(), observer);
    self
      .source
      .observe(ResubscribingObserver { shared, mode: Mode::OnComplete })
  }
}

#[derive(Clone)]
pub struct RetryOp<S> {
  pub(crate) source: S,
}

impl<M, S> Observable<M> for RetryOp<S>
where
  M: Send + 'static,
  S: Observable<M> + Clone + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    let shared = resubscribing_core(self.source.clone(), observer);
    self
      .source
      .observe(ResubscribingObserver { shared, mode: Mode::OnFail })
  }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
  OnComplete,
  OnFail,
}

fn resubscribing_core<M, S, O>(
  source: S,
  observer: O,
) -> Arc<ResubscribeShared<M, S, O>>
where
  M: Send + 'static,
  S: Observable<M> + Send + Sync + 'static,
  O: Observer<M> + 'static,
{
  Arc::new(ResubscribeShared {
    source,
    downstream: SerializedObserver::new(observer),
    facade: Arc::new(Facade {
      state: Mutex::new(FacadeState {
        demand: RequestCount::new(),
        upstream: None,
        cancelled: false,
        observed: false,
      }),
    }),
  })
}

struct ResubscribeShared<M, S, O> {
  source: S,
  downstream: SerializedObserver<M, O>,
  facade: Arc<Facade>,
}

struct FacadeState {
  demand: RequestCount,
  upstream: Option<Observation>,
  cancelled: bool,
  observed: bool,
}

/// The downstream-facing observation, stable across resubscriptions.
struct Facade {
  state: Mutex<FacadeState>,
}

impl Facade {
  fn lock(&self) -> std::sync::MutexGuard<'_, FacadeState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl ObservationLike for Facade {
  fn request(&self, count: u64) {
    let upstream = {
      let mut state = self.lock();
      if state.cancelled {
        return;
      }
      state.demand.request(count);
      state.upstream.clone()
    };
    if let Some(upstream) = upstream {
      upstream.request(count);
    }
  }

  fn pending_requests(&self) -> u64 { self.lock().demand.count() }

  fn cancel(&self) {
    let upstream = {
      let mut state = self.lock();
      state.cancelled = true;
      state.upstream.clone()
    };
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }

  fn is_cancelled(&self) -> bool { self.lock().cancelled }
}

struct ResubscribingObserver<M, S, O> {
  shared: Arc<ResubscribeShared<M, S, O>>,
  mode: Mode,
}

impl<M, S, O> ResubscribingObserver<M, S, O>
where
  M: Send + 'static,
  S: Observable<M> + Send + Sync + 'static,
  O: Observer<M> + 'static,
{
  fn resubscribe(&self) {
    if self.shared.facade.lock().cancelled {
      return;
    }
    self.shared.source.observe(ResubscribingObserver {
      shared: self.shared.clone(),
      mode: self.mode,
    });
  }
}

impl<M, S, O> Observer<M> for ResubscribingObserver<M, S, O>
where
  M: Send + 'static,
  S: Observable<M> + Send + Sync + 'static,
  O: Observer<M> + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    let (first, refill) = {
      let mut state = self.shared.facade.lock();
      if state.cancelled {
        drop(state);
        observation.cancel();
        return;
      }
      state.upstream = Some(observation.clone());
      let first = !state.observed;
      state.observed = true;
      (first, state.demand.count())
    };
    if first {
      let handle = Observation::from_arc(self.shared.facade.clone() as _);
      self.shared.downstream.clone().on_observe(handle);
    } else if refill > 0 {
      // Demand granted downstream outlives a single generation.
      observation.request(refill);
    }
  }

  fn on_next(&mut self, message: M) {
    self.shared.facade.lock().demand.fulfil();
    self.shared.downstream.clone().on_next(message);
  }

  fn on_complete(&mut self) {
    match self.mode {
      Mode::OnComplete => self.resubscribe(),
      Mode::OnFail => self.shared.downstream.clone().on_complete(),
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    match self.mode {
      Mode::OnComplete => self.shared.downstream.clone().on_fail(failure),
      Mode::OnFail => self.resubscribe(),
    }
  }
}

#[cfg(test)]
mod test {
  use crate::{
    prelude::*,
    testing::{RecordingObserver, drain, held},
  };

  #[test]
  fn repeating_starts_over_on_completion() {
    let (observer, events, _observation) = RecordingObserver::new(5);
    observable::of(vec![1, 2]).repeating().observe(observer);
    assert_eq!(
      drain(&events),
      vec![
        "observe".to_string(),
        "next 1".into(),
        "next 2".into(),
        "next 1".into(),
        "next 2".into(),
        "next 1".into()
      ]
    );
  }

  #[test]
  fn downstream_observes_only_once_across_generations() {
    let (observer, events, _observation) = RecordingObserver::new(4);
    observable::of(vec![1]).repeating().observe(observer);
    let events = drain(&events);
    assert_eq!(events.iter().filter(|e| *e == "observe").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "next 1").count(), 4);
  }

  #[test]
  fn cancel_stops_the_cycle() {
    let (observer, events, observation) = RecordingObserver::new(3);
    observable::of(vec![1, 2]).repeating().observe(observer);
    held(&observation).cancel();
    let before = drain(&events).len();
    held(&observation).request(10);
    assert_eq!(drain(&events).len(), before);
  }

  #[test]
  fn retrying_starts_over_on_failure() {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::error::{AlreadyCompletedError, failure};

    let attempts = std::sync::Arc::new(AtomicU64::new(0));
    let flaky = {
      let attempts = attempts.clone();
      observable::from_supplier(move || attempts.fetch_add(1, Ordering::SeqCst))
        .concat_map(|attempt| {
          if attempt < 2 {
            observable::failing(|| failure(AlreadyCompletedError)).boxed()
          } else {
            observable::of(vec![attempt]).boxed()
          }
        })
    };

    let (observer, events, _observation) = RecordingObserver::new(1);
    flaky.retrying().observe(observer);

    // Two failing attempts were retried away; the third delivered.
    assert_eq!(drain(&events), vec!["observe".to_string(), "next 2".into()]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }
}
