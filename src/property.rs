//! Observable value cells.
//!
//! A [`ValueState`] is the materialized form of a value channel: a value or
//! a failure cause, never both, never neither. An [`ObservableProperty`] is
//! the mutable cell: a current [`ValueState`] plus change notification
//! through a backing multicast source. Mutation is compare-and-broadcast;
//! every effective mutation produces exactly one change event carrying the
//! previous and new states.

use std::sync::{Arc, Mutex};

use crate::{
  error::{Failure, MissingValueError, failure},
  observable::{Observable, SharedObservable, cold::ColdObservable, failing},
  observable::hot::HotObservable,
  observation::Observation,
  observer::Observer,
  ops::passthrough::PassthroughObserver,
};

// ============================================================================
// ValueState
// ============================================================================

/// A current value or a failure cause, mutually exclusive.
///
/// Also a degenerate source: a value state observes as its single value
/// followed by completion, a problem state as an immediate failure.
#[derive(Clone)]
pub enum ValueState<T> {
  Value(T),
  Problem(Failure),
}

impl<T> ValueState<T> {
  pub fn value(value: T) -> Self { Self::Value(value) }

  pub fn problem(cause: Failure) -> Self { Self::Problem(cause) }

  /// The current value, or a missing-value fault carrying the stored
  /// failure cause.
  pub fn get(&self) -> Result<T, MissingValueError>
  where
    T: Clone,
  {
    match self {
      Self::Value(value) => Ok(value.clone()),
      Self::Problem(cause) => Err(MissingValueError::caused_by(cause.clone())),
    }
  }

  pub fn try_get(&self) -> Option<T>
  where
    T: Clone,
  {
    match self {
      Self::Value(value) => Some(value.clone()),
      Self::Problem(_) => None,
    }
  }

  pub fn is_present(&self) -> bool { matches!(self, Self::Value(_)) }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueState<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
      Self::Problem(cause) => f.debug_tuple("Problem").field(cause).finish(),
    }
  }
}

impl<T> Observable<T> for ValueState<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<T> + 'static,
  {
    match self {
      Self::Value(value) => {
        ColdObservable::new(Some(value.clone())).observe(observer)
      }
      Self::Problem(cause) => {
        failing::deliver_failure(observer, cause.clone())
      }
    }
  }
}

// ============================================================================
// ObservableValue
// ============================================================================

/// A value which can be fetched and observed for replacement.
///
/// Holds a value or a failure cause, never both, never neither. `get` is
/// idempotent and never blocks; `changes` streams (previous, new) pairs for
/// every effective mutation.
pub trait ObservableValue<T>: Observable<T>
where
  T: Clone + Send + 'static,
{
  /// The current value, or a missing-value fault carrying the stored
  /// failure cause.
  fn get(&self) -> Result<T, MissingValueError>;

  fn try_get(&self) -> Option<T> { self.get().ok() }

  fn is_present(&self) -> bool { self.get().is_ok() }

  fn try_get_problem(&self) -> Option<Failure> {
    match self.get() {
      Ok(_) => None,
      Err(missing) => missing.cause().cloned(),
    }
  }

  /// A source of (previous, new) change events.
  fn changes(&self) -> SharedObservable<Change<T>>;
}

impl<T> ObservableValue<T> for ValueState<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn get(&self) -> Result<T, MissingValueError> { ValueState::get(self) }

  fn changes(&self) -> SharedObservable<Change<T>> {
    // A constant never changes.
    crate::observable::empty::<Change<T>>().boxed()
  }
}

impl<T> ObservableValue<T> for ObservableProperty<T>
where
  T: Clone + PartialEq + Send + Sync + 'static,
{
  fn get(&self) -> Result<T, MissingValueError> {
    ObservableProperty::get(self)
  }

  fn changes(&self) -> SharedObservable<Change<T>> {
    ObservableProperty::changes(self)
  }
}

// ============================================================================
// Change events
// ============================================================================

/// A value replacement: the previous and new states, immutable snapshots.
#[derive(Clone)]
pub struct Change<T> {
  previous: ValueState<T>,
  next: ValueState<T>,
}

impl<T> Change<T> {
  pub fn previous_value(&self) -> &ValueState<T> { &self.previous }

  pub fn new_value(&self) -> &ValueState<T> { &self.next }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Change<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Change")
      .field("previous", &self.previous)
      .field("next", &self.next)
      .finish()
  }
}

// ============================================================================
// ObservableProperty
// ============================================================================

/// A mutable value cell observable for replacement.
///
/// Observing delivers the current value (or failure) immediately after the
/// observation handle, then streams subsequent values live. `changes`
/// delivers (previous, new) pairs instead, and keeps flowing across
/// failure states.
pub struct ObservableProperty<T> {
  core: Arc<PropertyCore<T>>,
}

impl<T> Clone for ObservableProperty<T> {
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

struct PropertyCore<T> {
  backing: HotObservable<T>,
  slot: Mutex<ValueState<T>>,
  mutation: Mutex<()>,
}

impl<T> ObservableProperty<T>
where
  T: Clone + PartialEq + Send + Sync + 'static,
{
  pub fn new(initial: T) -> Self { Self::with_state(ValueState::value(initial)) }

  pub fn with_problem(cause: Failure) -> Self {
    Self::with_state(ValueState::problem(cause))
  }

  fn with_state(state: ValueState<T>) -> Self {
    Self {
      core: Arc::new(PropertyCore {
        backing: HotObservable::new(),
        slot: Mutex::new(state),
        mutation: Mutex::new(()),
      }),
    }
  }

  /// The current value, or a missing-value fault carrying the failure.
  pub fn get(&self) -> Result<T, MissingValueError> {
    self.core.current().get()
  }

  pub fn try_get(&self) -> Option<T> { self.core.current().try_get() }

  pub fn is_present(&self) -> bool { self.core.current().is_present() }

  pub fn try_get_problem(&self) -> Option<Failure> {
    self.core.current().problem()
  }

  /// Replace the value. Setting an equal value with no outstanding failure
  /// is a no-op; otherwise the slot is swapped and the new value
  /// broadcast. Returns the previous value, if one was present.
  pub fn set(&self, value: T) -> Option<T> {
    let _mutation = self.core.lock_mutation();
    let previous = {
      let mut slot = self.core.lock_slot();
      if let ValueState::Value(current) = &*slot {
        if *current == value {
          return Some(value);
        }
      }
      std::mem::replace(&mut *slot, ValueState::value(value.clone()))
    };
    self.core.backing.next(value);
    previous.try_get()
  }

  /// Put the cell into a failure state and broadcast the cause. The
  /// backing source is revived so later observers and changes keep
  /// flowing.
  pub fn set_problem(&self, cause: Failure) {
    let _mutation = self.core.lock_mutation();
    *self.core.lock_slot() = ValueState::problem(cause.clone());
    self.core.backing.fail(cause);
    self.core.backing.start();
  }

  /// The get-current-then-watch source over plain values.
  pub fn value(&self) -> ObservableProperty<T> { self.clone() }

  /// A multicast source of (previous, new) change events.
  pub fn changes(&self) -> SharedObservable<Change<T>> {
    SharedObservable::new(PropertyChanges { core: self.core.clone() })
  }
}

impl<T> PropertyCore<T> {
  fn lock_slot(&self) -> std::sync::MutexGuard<'_, ValueState<T>> {
    self.slot.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_mutation(&self) -> std::sync::MutexGuard<'_, ()> {
    self.mutation.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn current(&self) -> ValueState<T>
  where
    T: Clone,
  {
    self.lock_slot().clone()
  }
}

impl<T> Observable<T> for ObservableProperty<T>
where
  T: Clone + PartialEq + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<T> + 'static,
  {
    let attachment = self.core.backing.observe_attachment(observer);
    match self.core.current() {
      ValueState::Value(value) => attachment.deliver_next(value),
      ValueState::Problem(cause) => attachment
        .deliver_fail(failure(MissingValueError::caused_by(cause))),
    }
    Observation::from_arc(attachment as _)
  }
}

// ============================================================================
// Change stream
// ============================================================================

struct PropertyChanges<T> {
  core: Arc<PropertyCore<T>>,
}

impl<T> Observable<Change<T>> for PropertyChanges<T>
where
  T: Clone + PartialEq + Send + Sync + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<Change<T>> + 'static,
  {
    // Materialize so a failure state flows as a message, repeat so the
    // stream survives the terminal broadcast a failure implies.
    let source = self.core.backing.clone().materialize().repeating();
    source.observe(ChangePairingObserver {
      inner: PassthroughObserver::new(observer),
      core: self.core.clone(),
      previous: None,
    })
  }
}

struct ChangePairingObserver<T, O> {
  inner: PassthroughObserver<O>,
  core: Arc<PropertyCore<T>>,
  previous: Option<ValueState<T>>,
}

impl<T, O> Observer<ValueState<T>> for ChangePairingObserver<T, O>
where
  T: Clone + PartialEq + Send + Sync + 'static,
  O: Observer<Change<T>>,
{
  fn on_observe(&mut self, observation: Observation) {
    self.previous = Some(self.core.current());
    self.inner.pass_observe(observation);
  }

  fn on_next(&mut self, state: ValueState<T>) {
    let previous = self
      .previous
      .replace(state.clone())
      .unwrap_or_else(|| self.core.current());
    self.inner.pass_next(Change { previous, next: state });
  }

  fn on_complete(&mut self) { self.inner.pass_complete(); }

  fn on_fail(&mut self, failure: Failure) { self.inner.pass_fail(failure); }
}
