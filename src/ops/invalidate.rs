//! Invalidate / lazy-revalidate.
//!
//! Decouples "notified that something changed" from "pay the cost of
//! reading the new value". Downstream receives an [`Invalidation`] token
//! instead of the message; the token resolves the latest upstream value at
//! its first `revalidate` and is frozen thereafter. At most one
//! unrevalidated token is outstanding: further upstream messages update
//! what that token will resolve to. Revalidation is what requests the next
//! message upstream.

use std::sync::{Arc, Mutex};

use crate::{
  error::{Failure, MissingValueError},
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

#[derive(Clone)]
pub struct InvalidateOp<S> {
  pub(crate) source: S,
}

impl<M, S> Observable<Invalidation<M>> for InvalidateOp<S>
where
  M: Clone + Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<Invalidation<M>> + 'static,
  {
    self.source.observe(InvalidatingLazyRevalidatingObserver {
      inner: PassthroughObserver::new(observer),
      outstanding: None,
    })
  }
}

enum TokenValue<M> {
  Latest(Result<M, Failure>),
  Frozen(Result<M, Failure>),
}

struct TokenState<M> {
  value: TokenValue<M>,
  upstream: Option<Observation>,
}

/// Deferred read of the newest upstream value. `revalidate` resolves and
/// freezes the value, and requests the next message upstream; the token
/// never changes after its first revalidation.
pub struct Invalidation<M> {
  state: Arc<Mutex<TokenState<M>>>,
}

impl<M> Clone for Invalidation<M> {
  fn clone(&self) -> Self { Self { state: self.state.clone() } }
}

impl<M> std::fmt::Debug for Invalidation<M> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Invalidation").finish_non_exhaustive()
  }
}

impl<M> Invalidation<M>
where
  M: Clone,
{
  pub fn revalidate(&self) -> Result<M, MissingValueError> {
    let (result, first) = {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      match &state.value {
        TokenValue::Frozen(frozen) => (frozen.clone(), false),
        TokenValue::Latest(latest) => {
          let frozen = latest.clone();
          state.value = TokenValue::Frozen(frozen.clone());
          (frozen, true)
        }
      }
    };
    if first {
      let upstream = {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.upstream.clone()
      };
      if let Some(upstream) = upstream {
        upstream.request_next();
      }
    }
    result.map_err(MissingValueError::caused_by)
  }

  fn is_revalidated(&self) -> bool {
    matches!(
      self.state.lock().unwrap_or_else(|e| e.into_inner()).value,
      TokenValue::Frozen(_)
    )
  }

  fn refresh(&self, message: M) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if let TokenValue::Latest(_) = state.value {
      state.value = TokenValue::Latest(Ok(message));
    }
  }
}

pub struct InvalidatingLazyRevalidatingObserver<M, O> {
  inner: PassthroughObserver<O>,
  outstanding: Option<Invalidation<M>>,
}

impl<M, O> InvalidatingLazyRevalidatingObserver<M, O>
where
  M: Clone + Send,
  O: Observer<Invalidation<M>>,
{
  fn emit(&mut self, value: Result<M, Failure>) {
    let token = Invalidation {
      state: Arc::new(Mutex::new(TokenState {
        value: TokenValue::Latest(value),
        upstream: self.inner.observation().cloned(),
      })),
    };
    self.outstanding = Some(token.clone());
    self.inner.pass_next(token);
  }
}

impl<M, O> Observer<M> for InvalidatingLazyRevalidatingObserver<M, O>
where
  M: Clone + Send + 'static,
  O: Observer<Invalidation<M>>,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    match &self.outstanding {
      Some(token) if !token.is_revalidated() => token.refresh(message),
      _ => self.emit(Ok(message)),
    }
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) {
    self.emit(Err(failure.clone()));
    self.inner.pass_fail(failure);
  }
}

#[cfg(test)]
mod test {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{
    error::{AlreadyCompletedError, failure},
    prelude::*,
    testing::{collector, drain},
  };

  fn tokens() -> (Arc<Mutex<Vec<Invalidation<i32>>>>, impl FnMut(Invalidation<i32>) + Send) {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    (collected.clone(), move |token| {
      sink.lock().unwrap().push(token)
    })
  }

  #[test]
  fn a_second_message_reuses_the_outstanding_token() {
    let live = HotObservable::new();
    let (collected, sink) = tokens();
    live.clone().invalidate_lazy_revalidate().subscribe(sink);

    live.next(1).next(2);
    let collected = collected.lock().unwrap();
    assert_eq!(collected.len(), 1);
    // The unrevalidated token tracks the newest value.
    assert_eq!(collected[0].revalidate().unwrap(), 2);
    assert_eq!(collected[0].revalidate().unwrap(), 2);
  }

  #[test]
  fn revalidating_each_token_yields_every_message() {
    let live = HotObservable::new();
    let seen = collector();
    let sink = {
      let seen = seen.clone();
      move |token: Invalidation<i32>| {
        seen.lock().unwrap().push(token.revalidate().unwrap())
      }
    };
    live.clone().invalidate_lazy_revalidate().subscribe(sink);

    live.next(1).next(2).next(3);
    assert_eq!(drain(&seen), vec![1, 2, 3]);
  }

  #[test]
  fn token_is_frozen_after_first_revalidation() {
    let live = HotObservable::new();
    let (collected, sink) = tokens();
    live.clone().invalidate_lazy_revalidate().subscribe(sink);

    live.next(1);
    let first = collected.lock().unwrap()[0].clone();
    assert_eq!(first.revalidate().unwrap(), 1);
    live.next(2);
    assert_eq!(first.revalidate().unwrap(), 1);
    // The second message minted a fresh token since the first was frozen.
    assert_eq!(collected.lock().unwrap().len(), 2);
  }

  #[test]
  fn failure_mints_a_problem_token_then_fails() {
    let live = HotObservable::<i32>::new();
    let (collected, sink) = tokens();
    let failures = collector();
    let on_fail = {
      let failures = failures.clone();
      crate::observer::on_failure(move |f| failures.lock().unwrap().push(format!("{f}")))
    };
    live
      .clone()
      .invalidate_lazy_revalidate()
      .then(on_fail)
      .subscribe(sink);

    live.fail(failure(AlreadyCompletedError));

    let collected = collected.lock().unwrap();
    assert_eq!(collected.len(), 1);
    let error = collected[0].revalidate().unwrap_err();
    assert!(error.cause().is_some());
    assert_eq!(drain(&failures).len(), 1);
  }

  #[test]
  fn revalidation_requests_the_next_message() {
    // Against a demand-driven source the revalidation is the pull: without
    // it nothing further is delivered.
    struct TokenObserver {
      collected: Arc<Mutex<Vec<Invalidation<i32>>>>,
    }

    impl Observer<Invalidation<i32>> for TokenObserver {
      fn on_observe(&mut self, observation: Observation) {
        observation.request_next();
      }

      fn on_next(&mut self, token: Invalidation<i32>) {
        self.collected.lock().unwrap().push(token);
      }
    }

    let collected = Arc::new(Mutex::new(Vec::new()));
    observable::of(vec![1, 2, 3])
      .invalidate_lazy_revalidate()
      .observe(TokenObserver { collected: collected.clone() });

    assert_eq!(collected.lock().unwrap().len(), 1);

    let token = collected.lock().unwrap()[0].clone();
    assert_eq!(token.revalidate().unwrap(), 1);

    // The revalidation pulled the next message, minting a second token.
    let second = collected.lock().unwrap().get(1).cloned();
    assert_eq!(second.unwrap().revalidate().unwrap(), 2);
  }
}
