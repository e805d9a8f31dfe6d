//! The subscription handle and its demand accounting.
//!
//! An [`Observation`] is created by a producer for every attach and handed to
//! the sink through `on_observe`. It carries the two consumer-side controls
//! of the protocol: demand (`request`) and cancellation (`cancel`), and it
//! doubles as the disposable returned from `observe`.
//!
//! Demand is a saturating counter. An unbounded request is absorbing:
//! further finite requests and fulfilments are no-ops until the subscription
//! ends.

use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

/// Absorbing demand sentinel. `request(UNBOUNDED)` switches a subscription
/// into unbounded mode permanently.
pub const UNBOUNDED: u64 = u64::MAX;

/// Outstanding-demand counter. Saturates at [`UNBOUNDED`] and never goes
/// negative by construction: fulfilment only decrements a nonzero count.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCount {
  count: u64,
}

impl RequestCount {
  pub fn new() -> Self { Self::default() }

  /// Add demand. No-op once unbounded.
  pub fn request(&mut self, count: u64) {
    if self.count != UNBOUNDED {
      self.count = self.count.saturating_add(count);
    }
  }

  /// Consume one unit of demand for a delivery. No-op when unbounded.
  pub fn fulfil(&mut self) {
    if self.count != UNBOUNDED && self.count > 0 {
      self.count -= 1;
    }
  }

  /// Take the whole outstanding count, leaving zero behind.
  pub fn take(&mut self) -> u64 { std::mem::replace(&mut self.count, 0) }

  pub fn is_fulfilled(&self) -> bool { self.count == 0 }

  pub fn is_unbounded(&self) -> bool { self.count == UNBOUNDED }

  pub fn count(&self) -> u64 { self.count }
}

/// The producer-side behavior behind an [`Observation`] handle.
///
/// Implementations must tolerate `request` and `cancel` after termination as
/// no-ops, and must honor a cancellation observed mid-loop before any
/// further delivery.
pub trait ObservationLike: Send + Sync {
  /// Increase outstanding demand. `count == UNBOUNDED` switches the
  /// subscription into unbounded mode permanently.
  fn request(&self, count: u64);

  /// The demand not yet consumed by deliveries.
  fn pending_requests(&self) -> u64;

  /// Cancel the subscription. Idempotent, callable from any thread, and
  /// honored before any further delivery in the same producer loop.
  fn cancel(&self);

  fn is_cancelled(&self) -> bool;
}

/// Cloneable per-attach handle carrying demand and cancellation.
#[derive(Clone)]
pub struct Observation(Arc<dyn ObservationLike>);

impl Observation {
  pub fn new<L>(like: L) -> Self
  where
    L: ObservationLike + 'static,
  {
    Self(Arc::new(like))
  }

  pub(crate) fn from_arc(like: Arc<dyn ObservationLike>) -> Self { Self(like) }

  #[inline]
  pub fn request(&self, count: u64) { self.0.request(count) }

  /// Request one more message.
  #[inline]
  pub fn request_next(&self) { self.request(1) }

  #[inline]
  pub fn request_unbounded(&self) { self.request(UNBOUNDED) }

  #[inline]
  pub fn is_request_unbounded(&self) -> bool {
    self.pending_requests() == UNBOUNDED
  }

  #[inline]
  pub fn pending_requests(&self) -> u64 { self.0.pending_requests() }

  #[inline]
  pub fn cancel(&self) { self.0.cancel() }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.0.is_cancelled() }

  /// Activates cancel-on-drop behavior for this observation.
  ///
  /// **Attention:** if you don't assign the return value to a variable the
  /// observation is cancelled immediately, which is probably not what you
  /// want.
  pub fn cancel_when_dropped(self) -> ObservationGuard {
    ObservationGuard(self)
  }
}

impl Debug for Observation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Observation")
      .field("pending_requests", &self.pending_requests())
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

/// RAII wrapper over an [`Observation`]: cancels when dropped.
#[derive(Debug)]
#[must_use]
pub struct ObservationGuard(Observation);

impl ObservationGuard {
  pub fn observation(&self) -> &Observation { &self.0 }
}

impl Drop for ObservationGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}
