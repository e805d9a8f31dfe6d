//! Fault types shared across the protocol.
//!
//! Failure events carry the original cause as a [`Failure`], a cheaply
//! cloneable `Arc` over any error type, so the value that arrives at
//! `on_fail` is always the error that was raised, never a wrapper.
//! Protocol-misuse faults (double completion of a hot source, broadcast on a
//! dead source) are programmer errors and panic instead.

use std::sync::Arc;

use thiserror::Error;

/// The cause carried by a failure event.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Wrap any error into a [`Failure`].
pub fn failure<E>(error: E) -> Failure
where
  E: std::error::Error + Send + Sync + 'static,
{
  Arc::new(error)
}

/// Raised when a current value is requested but the holder is in a failure
/// state, or when a blocking "next message" helper observes termination
/// before any message.
#[derive(Error, Debug, Clone)]
#[error("no value is currently available")]
pub struct MissingValueError {
  problem: Option<Failure>,
}

impl MissingValueError {
  pub fn new() -> Self { Self { problem: None } }

  pub fn caused_by(cause: Failure) -> Self { Self { problem: Some(cause) } }

  /// The failure state that made the value unavailable, if one was recorded.
  pub fn cause(&self) -> Option<&Failure> { self.problem.as_ref() }
}

impl Default for MissingValueError {
  fn default() -> Self { Self::new() }
}

/// Resolved by `get_next` when the sequence completed before producing a
/// message.
#[derive(Error, Debug, Clone, Default)]
#[error("the sequence already completed")]
pub struct AlreadyCompletedError;

/// Delivered when a producer sends a message while the subscription had no
/// outstanding demand.
#[derive(Error, Debug, Clone, Default)]
#[error("message delivered with no outstanding request")]
pub struct UnexpectedMessageError;

/// A panic escaping a sink callback, recovered at the delivery boundary and
/// translated into a failure event on the same subscription.
#[derive(Error, Debug, Clone)]
#[error("sink panicked during delivery: {message}")]
pub struct SinkPanicError {
  message: String,
}

impl SinkPanicError {
  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    let message = payload
      .downcast_ref::<&str>()
      .map(|s| s.to_string())
      .or_else(|| payload.downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "non-string panic payload".to_string());
    Self { message }
  }

  pub fn message(&self) -> &str { &self.message }
}
