//! The sink side of the protocol.
//!
//! An [`Observer`] receives, in order: its [`Observation`] handle, zero or
//! more messages, and exactly one of completion or failure. Producers only
//! deliver a message while the observation has outstanding demand.

use std::marker::PhantomData;

use crate::{error::Failure, observation::Observation};

/// The four-callback sink contract.
///
/// `on_observe` hands over the subscription handle; a sink that wants
/// messages must request demand through it, either here or later. The
/// default completion and failure handlers do nothing, so small sinks only
/// implement what they care about.
pub trait Observer<M>: Send {
  /// Receive the subscription handle for this attach.
  fn on_observe(&mut self, observation: Observation) {
    let _ = observation;
  }

  /// Receive a message. Called only while outstanding demand is nonzero;
  /// each call consumes one unit of demand unless the subscription is
  /// unbounded.
  fn on_next(&mut self, message: M);

  /// The sequence ended normally. At most one terminal event is ever
  /// delivered, and no message follows it.
  fn on_complete(&mut self) {}

  /// The sequence ended with the given cause.
  fn on_fail(&mut self, failure: Failure) {
    let _ = failure;
  }
}

impl<M, O> Observer<M> for Box<O>
where
  O: Observer<M> + ?Sized,
{
  fn on_observe(&mut self, observation: Observation) {
    (**self).on_observe(observation)
  }

  fn on_next(&mut self, message: M) { (**self).on_next(message) }

  fn on_complete(&mut self) { (**self).on_complete() }

  fn on_fail(&mut self, failure: Failure) { (**self).on_fail(failure) }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Closure sink: the closure handles messages, termination is ignored.
///
/// Requests unbounded demand on observe, so `subscribe(|m| ...)` just works
/// against demand-driven sources. Sinks that want pull semantics implement
/// [`Observer`] directly and own their demand.
#[derive(Clone)]
pub struct FnObserver<F> {
  next: F,
}

impl<F> FnObserver<F> {
  pub fn new(next: F) -> Self { Self { next } }
}

impl<M, F> Observer<M> for FnObserver<F>
where
  F: FnMut(M) + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    observation.request_unbounded();
  }

  fn on_next(&mut self, message: M) { (self.next)(message) }
}

/// Sink that only acts on the observation handle; messages are discarded.
/// Used to splice demand decisions into a chain with `then`.
pub fn on_observation<M, F>(action: F) -> OnObservationObserver<M, F>
where
  F: FnMut(Observation) + Send,
{
  OnObservationObserver { action, _marker: PhantomData }
}

#[derive(Clone)]
pub struct OnObservationObserver<M, F> {
  action: F,
  _marker: PhantomData<fn(M)>,
}

impl<M, F> Observer<M> for OnObservationObserver<M, F>
where
  F: FnMut(Observation) + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    (self.action)(observation)
  }

  fn on_next(&mut self, _message: M) {}
}

/// Sink that only acts on completion.
pub fn on_completion<M, F>(action: F) -> OnCompletionObserver<M, F>
where
  F: FnMut() + Send,
{
  OnCompletionObserver { action, _marker: PhantomData }
}

#[derive(Clone)]
pub struct OnCompletionObserver<M, F> {
  action: F,
  _marker: PhantomData<fn(M)>,
}

impl<M, F> Observer<M> for OnCompletionObserver<M, F>
where
  F: FnMut() + Send,
{
  fn on_next(&mut self, _message: M) {}

  fn on_complete(&mut self) { (self.action)() }
}

/// Sink that only acts on failure.
pub fn on_failure<M, F>(action: F) -> OnFailureObserver<M, F>
where
  F: FnMut(Failure) + Send,
{
  OnFailureObserver { action, _marker: PhantomData }
}

#[derive(Clone)]
pub struct OnFailureObserver<M, F> {
  action: F,
  _marker: PhantomData<fn(M)>,
}

impl<M, F> Observer<M> for OnFailureObserver<M, F>
where
  F: FnMut(Failure) + Send,
{
  fn on_next(&mut self, _message: M) {}

  fn on_fail(&mut self, failure: Failure) { (self.action)(failure) }
}

/// Message sink with access to its own observation, for handlers that need
/// to feed demand back per message (e.g. request one more after each).
pub fn for_observation<M, F>(action: F) -> ForObservationObserver<M, F>
where
  F: FnMut(&Observation, M) + Send,
{
  ForObservationObserver { action, observation: None, _marker: PhantomData }
}

#[derive(Clone)]
pub struct ForObservationObserver<M, F> {
  action: F,
  observation: Option<Observation>,
  _marker: PhantomData<fn(M)>,
}

impl<M, F> Observer<M> for ForObservationObserver<M, F>
where
  F: FnMut(&Observation, M) + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.observation = Some(observation);
  }

  fn on_next(&mut self, message: M) {
    if let Some(observation) = &self.observation {
      (self.action)(observation, message);
    }
  }
}
