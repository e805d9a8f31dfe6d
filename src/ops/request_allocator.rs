//! Demand distribution strategies for multi-source composition.
//!
//! A flat-mapping operator holds one downstream demand accumulator and N
//! inner subscriptions. The allocator decides how an outstanding downstream
//! request is split among the inner observations, returning whatever it
//! chose not to allocate.

use crate::observation::{Observation, UNBOUNDED};

/// Strategy distributing downstream demand across inner observations.
///
/// `allocate` is invoked outside the operator's bookkeeping lock, so
/// implementations are free to issue requests that deliver synchronously.
pub trait RequestAllocator: Send + Sync {
  /// Distribute up to `count` units of demand among `observations`,
  /// returning the unallocated remainder.
  fn allocate(&self, count: u64, observations: &[Observation]) -> u64;
}

/// One unit to each starved (zero-pending) observation, oldest first, until
/// the request is exhausted.
pub fn balanced() -> BalancedAllocator { BalancedAllocator }

#[derive(Clone, Copy, Debug, Default)]
pub struct BalancedAllocator;

impl RequestAllocator for BalancedAllocator {
  fn allocate(&self, count: u64, observations: &[Observation]) -> u64 {
    let mut remaining = count;
    for observation in observations {
      if remaining == 0 {
        break;
      }
      if observation.pending_requests() == 0 {
        observation.request_next();
        if remaining != UNBOUNDED {
          remaining -= 1;
        }
      }
    }
    remaining
  }
}

/// The whole request to the single oldest observation. Preserves per-source
/// ordering; this is what `concat_map` composes with.
pub fn sequential() -> SequentialAllocator { SequentialAllocator }

#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialAllocator;

impl RequestAllocator for SequentialAllocator {
  fn allocate(&self, count: u64, observations: &[Observation]) -> u64 {
    match observations.first() {
      Some(oldest) => {
        oldest.request(count);
        0
      }
      None => count,
    }
  }
}

/// Raise a demand waterline: grants go to whichever observation currently
/// has the least pending, so all observations converge toward equal pending
/// counts.
pub fn spread() -> SpreadAllocator { SpreadAllocator }

#[derive(Clone, Copy, Debug, Default)]
pub struct SpreadAllocator;

impl RequestAllocator for SpreadAllocator {
  fn allocate(&self, count: u64, observations: &[Observation]) -> u64 {
    if observations.is_empty() {
      return count;
    }
    if count == UNBOUNDED {
      for observation in observations {
        observation.request_unbounded();
      }
      return 0;
    }

    let mut pending: Vec<u64> = observations
      .iter()
      .map(Observation::pending_requests)
      .collect();
    let mut grants = vec![0u64; observations.len()];
    for _ in 0..count {
      let lowest = pending
        .iter()
        .enumerate()
        .min_by_key(|(_, pending)| **pending)
        .map(|(index, _)| index)
        .expect("non-empty observations");
      pending[lowest] = pending[lowest].saturating_add(1);
      grants[lowest] += 1;
    }
    for (observation, grant) in observations.iter().zip(grants) {
      if grant > 0 {
        observation.request(grant);
      }
    }
    0
  }
}
