//! The producer side of the protocol and the operator surface.
//!
//! An [`Observable`] is a reusable, re-subscribable description of a
//! message sequence. Operators are default methods: each wraps the
//! receiver in an operator source, and subscribing walks the composition
//! chain down to the root, each layer decorating the sink on the way.
//!
//! The observation returned from `observe` is the disposable for the
//! attach; demand is driven through the handle the sink receives in
//! `on_observe`.

use std::{
  marker::PhantomData,
  pin::Pin,
  sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
  },
  task::{Context, Poll},
  time::Duration,
};

use futures::channel::oneshot;

use crate::{
  error::{AlreadyCompletedError, Failure, failure},
  executor::{Executor, Latch},
  observation::Observation,
  observer::{FnObserver, Observer},
  ops::{
    drop_while::DropWhileOp,
    execute_on::ExecuteOnOp,
    filter::{FilterOp, PartialMapOp},
    fixed_rate::FixedRateOp,
    flat_map::FlatMapOp,
    invalidate::InvalidateOp,
    map::MapOp,
    materialize::MaterializeOp,
    merge::MergeOp,
    prefix::PrefixOp,
    reduce::{MaximumCapacityVec, ReduceBackpressureOp},
    reference::{ReferenceObserver, WeakReferenceOwnedOp},
    repeat::{RepeatOp, RetryOp},
    request_allocator::{RequestAllocator, balanced, sequential},
    stream::{self, ObservableStream},
    synchronize::SynchronizeOp,
    take_while::TakeWhileOp,
    then::ThenOp,
  },
  property::ValueState,
  rc::MutArc,
};

pub mod cold;
pub mod failing;
pub mod hot;

pub use cold::ColdObservable;
pub use failing::{EmptyObservable, FailingObservable};
pub use hot::HotObservable;

/// Reusable producer of a message sequence.
pub trait Observable<M: Send + 'static> {
  /// Attach a sink. The sink receives its observation first, then messages
  /// as demanded, then exactly one terminal event. The returned
  /// observation is the disposable for this attach: cancelling it is
  /// always safe, idempotent, and allowed from any thread.
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static;

  /// Attach a closure sink with unbounded demand.
  fn subscribe<F>(&self, next: F) -> Observation
  where
    F: FnMut(M) + Send + 'static,
  {
    self.observe(FnObserver::new(next))
  }

  /// Type-erase into a shareable, re-subscribable handle.
  fn boxed(self) -> SharedObservable<M>
  where
    Self: Sized + Send + Sync + 'static,
  {
    SharedObservable::new(self)
  }

  /// Apply `transformation` to the receiver. Exists to keep the order of
  /// operations readable in method chains.
  fn compose<T, F>(self, transformation: F) -> T
  where
    Self: Sized,
    F: FnOnce(Self) -> T,
  {
    transformation(self)
  }

  /// Pass events to `action` directly before the downstream sink.
  fn then<A>(self, action: A) -> ThenOp<Self, A>
  where
    Self: Sized,
    A: Observer<M> + Clone + 'static,
  {
    ThenOp { source: self, action, action_first: true }
  }

  /// Pass events to `action` directly after the downstream sink.
  fn then_after<A>(self, action: A) -> ThenOp<Self, A>
  where
    Self: Sized,
    A: Observer<M> + Clone + 'static,
  {
    ThenOp { source: self, action, action_first: false }
  }

  /// Prime every subscription with an unbounded request.
  fn request_unbounded(self) -> ThenOp<Self, crate::observer::OnObservationObserver<M, fn(Observation)>>
  where
    Self: Sized,
    M: Clone,
  {
    self.then(crate::observer::on_observation(
      (|observation: Observation| observation.request_unbounded()) as fn(Observation),
    ))
  }

  /// Prime every subscription with a single request.
  fn request_next(self) -> ThenOp<Self, crate::observer::OnObservationObserver<M, fn(Observation)>>
  where
    Self: Sized,
    M: Clone,
  {
    self.then(crate::observer::on_observation(
      (|observation: Observation| observation.request_next()) as fn(Observation),
    ))
  }

  /// Request one more message after each delivery: pull semantics with a
  /// window of one.
  fn then_request_next(
    self,
  ) -> ThenOp<Self, crate::observer::ForObservationObserver<M, fn(&Observation, M)>>
  where
    Self: Sized,
    M: Clone,
  {
    self.then(crate::observer::for_observation(
      (|observation: &Observation, _message: M| observation.request_next())
        as fn(&Observation, M),
    ))
  }

  /// Transform each message.
  fn map<T, F>(self, mapping: F) -> MapOp<Self, F, M>
  where
    Self: Sized,
    T: Send + 'static,
    F: Fn(M) -> T + Clone + Send + 'static,
  {
    MapOp { source: self, mapping, _marker: PhantomData }
  }

  /// Pass along only messages matching `condition`.
  fn filter<P>(self, condition: P) -> FilterOp<Self, P>
  where
    Self: Sized,
    P: Fn(&M) -> bool + Clone + Send + 'static,
  {
    FilterOp { source: self, condition }
  }

  /// Transform and filter in one step.
  fn partial_map<T, F>(self, mapping: F) -> PartialMapOp<Self, F, M>
  where
    Self: Sized,
    T: Send + 'static,
    F: Fn(M) -> Option<T> + Clone + Send + 'static,
  {
    PartialMapOp { source: self, mapping, _marker: PhantomData }
  }

  /// Forward while `condition` holds, then cancel upstream and complete.
  fn take_while<P>(self, condition: P) -> TakeWhileOp<Self, P>
  where
    Self: Sized,
    P: Fn(&M) -> bool + Clone + Send + 'static,
  {
    TakeWhileOp { source: self, condition }
  }

  /// Forward at most `count` messages.
  fn take(self, count: u64) -> TakeWhileOp<Self, impl Fn(&M) -> bool + Clone + Send + 'static>
  where
    Self: Sized,
  {
    let counter = Arc::new(AtomicI64::new(count.min(i64::MAX as u64) as i64));
    self.take_while(move |_| counter.fetch_sub(1, Ordering::SeqCst) > 0)
  }

  /// Drop while `condition` holds, then pass everything through.
  fn drop_while<P>(self, condition: P) -> DropWhileOp<Self, P>
  where
    Self: Sized,
    P: Fn(&M) -> bool + Clone + Send + 'static,
  {
    DropWhileOp { source: self, condition }
  }

  /// Drop the first `count` messages.
  fn drop(self, count: u64) -> DropWhileOp<Self, impl Fn(&M) -> bool + Clone + Send + 'static>
  where
    Self: Sized,
  {
    let counter = Arc::new(AtomicI64::new(count.min(i64::MAX as u64) as i64));
    self.drop_while(move |_| counter.fetch_sub(1, Ordering::SeqCst) > 0)
  }

  /// Serialize all protocol events on a private mutex.
  fn synchronize(self) -> SynchronizeOp<Self>
  where
    Self: Sized,
  {
    self.synchronize_on(Arc::new(Mutex::new(())))
  }

  /// Serialize all protocol events on the given mutex, shared with
  /// whatever else the caller synchronizes on it.
  fn synchronize_on(self, mutex: Arc<Mutex<()>>) -> SynchronizeOp<Self>
  where
    Self: Sized,
  {
    SynchronizeOp { source: self, mutex }
  }

  /// Map each message to an inner source and merge, distributing
  /// downstream demand by `allocator`.
  fn flat_map<T, S2, F, A>(self, mapping: F, allocator: A) -> FlatMapOp<Self, F, A, M>
  where
    Self: Sized,
    T: Send + 'static,
    S2: Observable<T>,
    F: Fn(M) -> S2 + Clone + Send + Sync + 'static,
    A: RequestAllocator + Clone + 'static,
  {
    FlatMapOp { source: self, mapping, allocator, _marker: PhantomData }
  }

  /// Merge the mapped sources eagerly: unbounded requests are made to the
  /// upstream and to every inner source, so neither needs to support
  /// backpressure and the result does not either.
  fn merge_map<T, S2, F>(
    self,
    mapping: F,
  ) -> FlatMapOp<
    ThenOp<Self, crate::observer::OnObservationObserver<M, fn(Observation)>>,
    impl Fn(M) -> ThenOp<S2, crate::observer::OnObservationObserver<T, fn(Observation)>>
      + Clone
      + Send
      + Sync
      + 'static,
    crate::ops::request_allocator::BalancedAllocator,
    M,
  >
  where
    Self: Sized,
    M: Clone,
    T: Clone + Send + 'static,
    S2: Observable<T>,
    F: Fn(M) -> S2 + Clone + Send + Sync + 'static,
  {
    self
      .request_unbounded()
      .flat_map(move |message| mapping(message).request_unbounded(), balanced())
  }

  /// Concatenate the mapped sources: sequential allocation preserves
  /// per-source ordering.
  fn concat_map<T, S2, F>(
    self,
    mapping: F,
  ) -> FlatMapOp<Self, F, crate::ops::request_allocator::SequentialAllocator, M>
  where
    Self: Sized,
    T: Send + 'static,
    S2: Observable<T>,
    F: Fn(M) -> S2 + Clone + Send + Sync + 'static,
  {
    self.flat_map(mapping, sequential())
  }

  /// Fold messages while downstream demand is unavailable; each grant
  /// forwards one folded value. `identity` seeds each fold.
  fn reduce_backpressure<R, I, A>(
    self,
    identity: I,
    accumulator: A,
  ) -> ReduceBackpressureOp<Self, impl Fn(M) -> R + Clone + Send + 'static, A, M>
  where
    Self: Sized,
    R: Send + 'static,
    I: Fn() -> R + Clone + Send + 'static,
    A: Fn(R, M) -> R + Clone + Send + 'static,
  {
    let seed = {
      let accumulator = accumulator.clone();
      move |message| accumulator(identity(), message)
    };
    ReduceBackpressureOp { source: self, initial: seed, accumulator, _marker: PhantomData }
  }

  /// As [`reduce_backpressure`](Observable::reduce_backpressure), seeding
  /// each fold from its first message.
  fn reduce_backpressure_initial<R, I, A>(
    self,
    initial: I,
    accumulator: A,
  ) -> ReduceBackpressureOp<Self, I, A, M>
  where
    Self: Sized,
    R: Send + 'static,
    I: Fn(M) -> R + Clone + Send + 'static,
    A: Fn(R, M) -> R + Clone + Send + 'static,
  {
    ReduceBackpressureOp { source: self, initial, accumulator, _marker: PhantomData }
  }

  /// Coalesce pending messages with a binary operator until demanded.
  fn coalesce_backpressure<A>(
    self,
    operator: A,
  ) -> ReduceBackpressureOp<Self, impl Fn(M) -> M + Clone + Send + 'static, A, M>
  where
    Self: Sized,
    A: Fn(M, M) -> M + Clone + Send + 'static,
  {
    self.reduce_backpressure_initial(|message| message, operator)
  }

  /// Buffer into batches between downstream requests.
  fn collect_backpressure(
    self,
  ) -> ReduceBackpressureOp<
    Self,
    impl Fn(M) -> Vec<M> + Clone + Send + 'static,
    impl Fn(Vec<M>, M) -> Vec<M> + Clone + Send + 'static,
    M,
  >
  where
    Self: Sized,
  {
    self.reduce_backpressure(Vec::new, |mut batch, message| {
      batch.push(message);
      batch
    })
  }

  /// Buffer into capacity-bounded batches between downstream requests;
  /// messages past the capacity are dropped.
  fn aggregate_backpressure(
    self,
    capacity: usize,
  ) -> MapOp<
    ReduceBackpressureOp<
      Self,
      impl Fn(M) -> MaximumCapacityVec<M> + Clone + Send + 'static,
      impl Fn(MaximumCapacityVec<M>, M) -> MaximumCapacityVec<M> + Clone + Send + 'static,
      M,
    >,
    impl Fn(MaximumCapacityVec<M>) -> Vec<M> + Clone + Send + 'static,
    MaximumCapacityVec<M>,
  >
  where
    Self: Sized,
  {
    self
      .reduce_backpressure(
        move || MaximumCapacityVec::new(capacity),
        |mut batch, message| {
          batch.push(message);
          batch
        },
      )
      .map(MaximumCapacityVec::into_vec)
  }

  /// Fold the whole sequence, resolving the future on completion.
  fn reduce<R, I, A>(&self, identity: I, accumulator: A) -> FutureValue<R>
  where
    R: Send + 'static,
    I: Fn() -> R + Send + 'static,
    A: Fn(R, M) -> R + Send + 'static,
  {
    let (sender, receiver) = oneshot::channel();
    self.observe(ReducingObserver {
      fold: Some(identity()),
      accumulator,
      sender: Some(sender),
    });
    FutureValue(receiver)
  }

  /// Collect the whole sequence, resolving the future on completion.
  fn collect(&self) -> FutureValue<Vec<M>> {
    self.reduce(Vec::new, |mut collected, message| {
      collected.push(message);
      collected
    })
  }

  /// Wrap values and failures into [`ValueState`] messages.
  fn materialize(self) -> MaterializeOp<Self>
  where
    Self: Sized,
  {
    MaterializeOp { source: self }
  }

  /// Start the source over on completion.
  fn repeating(self) -> RepeatOp<Self>
  where
    Self: Sized,
    Self: Clone + Send + Sync + 'static,
  {
    RepeatOp { source: self }
  }

  /// Start the source over on failure.
  fn retrying(self) -> RetryOp<Self>
  where
    Self: Sized,
    Self: Clone + Send + Sync + 'static,
  {
    RetryOp { source: self }
  }

  /// Deliver a supplied value to each subscriber before upstream messages.
  fn prefixing<F>(self, supplier: F) -> PrefixOp<Self, F>
  where
    Self: Sized,
    F: Fn() -> M + Clone + Send + Sync + 'static,
  {
    PrefixOp { source: self, supplier }
  }

  /// Replace messages with lazily-revalidated invalidation tokens.
  fn invalidate_lazy_revalidate(self) -> InvalidateOp<Self>
  where
    Self: Sized,
    M: Clone,
  {
    InvalidateOp { source: self }
  }

  /// Observe with a weakly-held sink: the caller keeps the owning handle,
  /// and dropping it cancels the subscription on the next delivery.
  fn observe_weakly<O>(&self, sink: &MutArc<O>) -> Observation
  where
    O: Observer<M> + Send + 'static,
  {
    self.observe(ReferenceObserver::weak(sink))
  }

  /// Wrap each message with a freshly-resolved handle to `owner`, held
  /// weakly; the subscription cancels once the owner is dropped.
  fn weak_reference_owned<W>(self, owner: &Arc<W>) -> WeakReferenceOwnedOp<Self, W>
  where
    Self: Sized,
    W: Send + Sync + 'static,
  {
    WeakReferenceOwnedOp { source: self, owner: Arc::downgrade(owner) }
  }

  /// Re-emit every event as a task on `executor`.
  fn execute_on(self, executor: Arc<dyn Executor>) -> ExecuteOnOp<Self>
  where
    Self: Sized,
  {
    ExecuteOnOp { source: self, executor }
  }

  /// Pull one message per period, after an initial delay.
  fn request_fixed_rate(self, delay: Duration, period: Duration) -> FixedRateOp<Self>
  where
    Self: Sized,
  {
    FixedRateOp { source: self, delay, period }
  }

  /// Bridge into a `futures::Stream` of `Result<M, Failure>`.
  fn into_stream(self) -> ObservableStream<M>
  where
    Self: Sized,
  {
    stream::into_stream(&self)
  }

  /// Pump this source into a fresh multicast source.
  fn reemit(&self) -> HotObservable<M>
  where
    M: Clone + Sync,
  {
    let hot = HotObservable::new();
    self.observe(ReemitObserver { hot: hot.clone() });
    hot
  }

  /// Block the calling thread until the source terminates.
  fn join(&self) {
    let latch = Arc::new(Latch::new(1));
    self.observe(JoinObserver { latch: latch.clone() });
    latch.wait();
  }

  /// The next message as a future: resolves to the message, to
  /// [`AlreadyCompletedError`] if the source completes first, or to the
  /// failure cause.
  fn get_next(&self) -> FutureValue<M> {
    let (sender, receiver) = oneshot::channel();
    self.observe(NextMessageObserver { sender: Some(sender), observation: None });
    FutureValue(receiver)
  }

  /// As [`get_next`](Observable::get_next), resolving completion to `None`
  /// instead of a fault.
  fn try_get_next(&self) -> FutureValue<Option<M>> {
    let (sender, receiver) = oneshot::channel();
    self.observe(TryNextMessageObserver { sender: Some(sender), observation: None });
    FutureValue(receiver)
  }
}

// ============================================================================
// Type erasure
// ============================================================================

/// Object-safe subset of [`Observable`] for boxed composition.
pub trait DynObservable<M>: Send + Sync {
  fn observe_dyn(&self, observer: Box<dyn Observer<M>>) -> Observation;
}

impl<M, S> DynObservable<M> for S
where
  M: Send + 'static,
  S: Observable<M> + Send + Sync,
{
  fn observe_dyn(&self, observer: Box<dyn Observer<M>>) -> Observation {
    self.observe(observer)
  }
}

/// Cloneable, type-erased source handle.
pub struct SharedObservable<M>(Arc<dyn DynObservable<M>>);

impl<M> SharedObservable<M>
where
  M: Send + 'static,
{
  pub fn new<S>(source: S) -> Self
  where
    S: Observable<M> + Send + Sync + 'static,
  {
    Self(Arc::new(source))
  }
}

impl<M> Clone for SharedObservable<M> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<M> Observable<M> for SharedObservable<M>
where
  M: Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.0.observe_dyn(Box::new(observer))
  }
}

// ============================================================================
// Static factories
// ============================================================================

/// Demand-driven source over the given sequence.
pub fn of<I>(messages: I) -> ColdObservable<I>
where
  I: IntoIterator + Clone,
{
  ColdObservable::new(messages)
}

/// Demand-driven source over the given sequence.
pub fn from_iter<I>(messages: I) -> ColdObservable<I>
where
  I: IntoIterator + Clone,
{
  ColdObservable::new(messages)
}

/// Source of a single, lazily supplied message.
pub fn from_supplier<M, F>(supplier: F) -> ColdObservable<cold::SupplierSequence<F>>
where
  F: FnMut() -> M + Clone,
{
  ColdObservable::new(cold::SupplierSequence::new(supplier))
}

/// Source that completes immediately.
pub fn empty<M>() -> EmptyObservable<M> { EmptyObservable::new() }

/// Source that fails each subscription with a freshly supplied cause.
pub fn failing<M, F>(supplier: F) -> FailingObservable<M, F>
where
  M: Send + 'static,
  F: Fn() -> Failure + Clone + Send + Sync + 'static,
{
  FailingObservable::new(supplier)
}

/// A constant value cell holding `value`.
pub fn value<T>(value: T) -> ValueState<T> { ValueState::value(value) }

/// A constant value cell in a failure state.
pub fn failing_value<T>(cause: Failure) -> ValueState<T> {
  ValueState::problem(cause)
}

/// Merge several sources into one sequence; ordering between sources is
/// unspecified.
pub fn merge<M, S>(sources: Vec<S>) -> MergeOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  MergeOp { sources }
}

/// Concatenate several sources, exhausting each before the next.
pub fn concat<M, S>(
  sources: Vec<S>,
) -> FlatMapOp<
  ColdObservable<Vec<S>>,
  impl Fn(S) -> S + Clone + Send + Sync + 'static,
  crate::ops::request_allocator::SequentialAllocator,
  S,
>
where
  M: Send + 'static,
  S: Observable<M> + Clone + Send + Sync + 'static,
{
  of(sources).concat_map(|source| source)
}

/// Counter source ticking at a fixed rate from zero.
pub fn fixed_rate(delay: Duration, period: Duration) -> FixedRateOp<ColdObservable<std::ops::RangeFrom<u64>>> {
  of(0u64..).request_fixed_rate(delay, period)
}

// ============================================================================
// Future helper
// ============================================================================

/// Single pending value resolved by a terminal protocol event.
#[must_use]
pub struct FutureValue<T>(oneshot::Receiver<Result<T, Failure>>);

impl<T> FutureValue<T> {
  /// Block the calling thread for the result.
  pub fn get(self) -> Result<T, Failure> {
    futures::executor::block_on(self)
  }
}

impl<T> std::future::Future for FutureValue<T> {
  type Output = Result<T, Failure>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.0).poll(cx).map(|resolved| match resolved {
      Ok(result) => result,
      Err(oneshot::Canceled) => Err(failure(AlreadyCompletedError)),
    })
  }
}

// ============================================================================
// Terminal observers
// ============================================================================

struct ReducingObserver<R, A> {
  fold: Option<R>,
  accumulator: A,
  sender: Option<oneshot::Sender<Result<R, Failure>>>,
}

impl<M, R, A> Observer<M> for ReducingObserver<R, A>
where
  M: Send,
  R: Send,
  A: Fn(R, M) -> R + Send,
{
  fn on_observe(&mut self, observation: Observation) {
    observation.request_unbounded();
  }

  fn on_next(&mut self, message: M) {
    if let Some(fold) = self.fold.take() {
      self.fold = Some((self.accumulator)(fold, message));
    }
  }

  fn on_complete(&mut self) {
    if let (Some(sender), Some(fold)) = (self.sender.take(), self.fold.take()) {
      let _ = sender.send(Ok(fold));
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Err(failure));
    }
  }
}

struct NextMessageObserver<M> {
  sender: Option<oneshot::Sender<Result<M, Failure>>>,
  observation: Option<Observation>,
}

impl<M> Observer<M> for NextMessageObserver<M>
where
  M: Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.observation = Some(observation.clone());
    observation.request_next();
  }

  fn on_next(&mut self, message: M) {
    if let Some(observation) = &self.observation {
      observation.cancel();
    }
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Ok(message));
    }
  }

  fn on_complete(&mut self) {
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Err(failure(AlreadyCompletedError)));
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Err(failure));
    }
  }
}

struct TryNextMessageObserver<M> {
  sender: Option<oneshot::Sender<Result<Option<M>, Failure>>>,
  observation: Option<Observation>,
}

impl<M> Observer<M> for TryNextMessageObserver<M>
where
  M: Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.observation = Some(observation.clone());
    observation.request_next();
  }

  fn on_next(&mut self, message: M) {
    if let Some(observation) = &self.observation {
      observation.cancel();
    }
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Ok(Some(message)));
    }
  }

  fn on_complete(&mut self) {
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Ok(None));
    }
  }

  fn on_fail(&mut self, failure: Failure) {
    if let Some(sender) = self.sender.take() {
      let _ = sender.send(Err(failure));
    }
  }
}

struct JoinObserver {
  latch: Arc<Latch>,
}

impl<M> Observer<M> for JoinObserver
where
  M: Send,
{
  fn on_observe(&mut self, observation: Observation) {
    observation.request_unbounded();
  }

  fn on_next(&mut self, _message: M) {}

  fn on_complete(&mut self) { self.latch.count_down(); }

  fn on_fail(&mut self, _failure: Failure) { self.latch.count_down(); }
}

struct ReemitObserver<M> {
  hot: HotObservable<M>,
}

impl<M> Observer<M> for ReemitObserver<M>
where
  M: Clone + Send + Sync + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    observation.request_unbounded();
  }

  fn on_next(&mut self, message: M) { self.hot.next(message); }

  fn on_complete(&mut self) { self.hot.complete(); }

  fn on_fail(&mut self, failure: Failure) { self.hot.fail(failure); }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::testing::{collector, drain, push_into};

  #[test]
  fn get_next_resolves_the_first_message() {
    let next = of(vec![7, 8]).get_next().get().unwrap();
    assert_eq!(next, 7);
  }

  #[test]
  fn get_next_on_an_empty_source_is_a_fault() {
    let result = of(Vec::<i32>::new()).get_next().get();
    assert!(result.unwrap_err().downcast_ref::<AlreadyCompletedError>().is_some());
  }

  #[test]
  fn try_get_next_resolves_completion_to_none() {
    let result = of(Vec::<i32>::new()).try_get_next().get().unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn join_returns_once_the_source_completes() {
    // A synchronous source: join's observer drives it to completion on
    // this thread, so the latch is already released by observe time.
    of(vec![1, 2, 3]).join();
  }

  #[test]
  fn join_returns_across_threads() {
    let live = HotObservable::<i32>::new();
    let producer = {
      let live = live.clone();
      std::thread::spawn(move || {
        live.next(1);
        live.complete();
      })
    };
    live.join();
    producer.join().unwrap();
  }

  #[test]
  fn reemit_multicasts_a_cold_source() {
    let live = HotObservable::<i32>::new();
    let collected = collector();
    live.clone().subscribe(push_into(&collected));

    // Bridge a hot source through reemit to a second audience.
    let rebroadcast = live.reemit();
    let second = collector();
    rebroadcast.subscribe(push_into(&second));

    live.next(1).next(2);
    assert_eq!(drain(&collected), vec![1, 2]);
    assert_eq!(drain(&second), vec![1, 2]);
  }

  #[test]
  fn compose_applies_in_chain_order() {
    let collected = collector();
    of(vec![1, 2, 3])
      .compose(|source| source.map(|v| v * 10))
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![10, 20, 30]);
  }

  #[test]
  fn concat_factory_preserves_order() {
    let collected = collector();
    concat(vec![of(vec![1, 2]), of(vec![3])]).subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![1, 2, 3]);
  }

  #[test]
  fn boxed_sources_are_resubscribable() {
    let source = of(vec![1, 2]).map(|v| v + 1).boxed();
    for _ in 0..2 {
      let collected = collector();
      source.subscribe(push_into(&collected));
      assert_eq!(drain(&collected), vec![2, 3]);
    }
  }
}
