//! Lifetime-bound auto-disposal.
//!
//! The decorator never owns the true sink (or its owner): it holds a
//! non-owning [`WeakArc`] handle and resolves it per delivery. The real
//! owner keeps the owning handle; dropping it is the disposal signal, which
//! the decorator discovers on the next delivery and answers by cancelling
//! the subscription.

use std::sync::{Arc, Weak};

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
  rc::{MutArc, WeakArc},
};

/// Forwards events to a weakly-held sink; cancels once the sink is gone.
pub struct ReferenceObserver<O> {
  target: WeakArc<O>,
  observation: Option<Observation>,
}

impl<O> ReferenceObserver<O> {
  /// The caller keeps the owning [`MutArc`]; the subscription holds only
  /// the weak side.
  pub fn weak(target: &MutArc<O>) -> Self {
    Self { target: target.downgrade(), observation: None }
  }

  fn resolve(&self) -> Option<MutArc<O>> {
    let resolved = self.target.upgrade();
    if resolved.is_none() {
      if let Some(observation) = &self.observation {
        tracing::trace!("sink dropped; cancelling subscription");
        observation.cancel();
      }
    }
    resolved
  }
}

impl<M, O> Observer<M> for ReferenceObserver<O>
where
  M: Send,
  O: Observer<M> + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.observation = Some(observation.clone());
    if let Some(target) = self.resolve() {
      target.lock().on_observe(observation);
    }
  }

  fn on_next(&mut self, message: M) {
    if let Some(target) = self.resolve() {
      target.lock().on_next(message);
    }
  }

  fn on_complete(&mut self) {
    if let Some(target) = self.resolve() {
      target.lock().on_complete();
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if let Some(target) = self.resolve() {
      target.lock().on_fail(failure);
    }
  }
}

/// A message paired with a freshly-resolved handle to its owner, so
/// observer logic can reach owner state without itself keeping the owner
/// alive.
pub struct OwnedMessage<W, M> {
  owner: Arc<W>,
  message: M,
}

impl<W, M> OwnedMessage<W, M> {
  pub fn owner(&self) -> &Arc<W> { &self.owner }

  pub fn message(&self) -> &M { &self.message }

  pub fn into_message(self) -> M { self.message }
}

#[derive(Clone)]
pub struct WeakReferenceOwnedOp<S, W> {
  pub(crate) source: S,
  pub(crate) owner: Weak<W>,
}

impl<M, S, W> Observable<OwnedMessage<W, M>> for WeakReferenceOwnedOp<S, W>
where
  M: Send + 'static,
  S: Observable<M>,
  W: Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<OwnedMessage<W, M>> + 'static,
  {
    self.source.observe(ReferenceOwnedObserver {
      inner: PassthroughObserver::new(observer),
      owner: self.owner.clone(),
    })
  }
}

/// Holds the owner (not the sink) weakly and wraps each message together
/// with a fresh owner handle.
pub struct ReferenceOwnedObserver<O, W> {
  inner: PassthroughObserver<O>,
  owner: Weak<W>,
}

impl<O, W> ReferenceOwnedObserver<O, W> {
  pub fn weak(owner: &Arc<W>, downstream: O) -> Self {
    Self {
      inner: PassthroughObserver::new(downstream),
      owner: Arc::downgrade(owner),
    }
  }
}

impl<M, O, W> Observer<M> for ReferenceOwnedObserver<O, W>
where
  M: Send,
  O: Observer<OwnedMessage<W, M>>,
  W: Send + Sync,
{
  fn on_observe(&mut self, observation: Observation) {
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, message: M) {
    match self.owner.upgrade() {
      Some(owner) => self.inner.pass_next(OwnedMessage { owner, message }),
      None => {
        if let Some(observation) = self.inner.observation() {
          tracing::trace!("owner dropped; cancelling subscription");
          observation.cancel();
        }
      }
    }
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.inner.pass_fail(failure); }
}
