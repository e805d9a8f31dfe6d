//! Everything needed to build and consume sources.
//!
//! ```rust
//! use backflow::prelude::*;
//!
//! observable::of(1..=10)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 2)
//!   .subscribe(|v| println!("{v}"));
//! ```

pub use crate::{
  error::{
    AlreadyCompletedError, Failure, MissingValueError, UnexpectedMessageError,
    failure,
  },
  executor::{CallingThreadExecutor, Executor, Latch},
  observable,
  observable::{
    ColdObservable, EmptyObservable, FailingObservable, FutureValue,
    HotObservable, Observable, SharedObservable,
  },
  observation::{Observation, ObservationGuard, RequestCount, UNBOUNDED},
  observer::{FnObserver, Observer},
  ops::{
    invalidate::Invalidation,
    passthrough::PassthroughObserver,
    reference::{OwnedMessage, ReferenceObserver},
    request_allocator::{RequestAllocator, balanced, sequential, spread},
    safe::SafeObserver,
    stream::ObservableStream,
  },
  property::{Change, ObservableProperty, ObservableValue, ValueState},
  rc::{MutArc, WeakArc},
};
