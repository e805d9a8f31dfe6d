//! Single-delivery-context enforcement for shared sinks.
//!
//! A subscription must see a total order of events with no concurrent or
//! re-entrant delivery. Multi-source operators deliver into one downstream
//! sink from several producers, possibly re-entrantly on the same thread
//! (a sink requesting more demand from inside `on_next` can synchronously
//! produce the next message). [`SerializedObserver`] funnels every event
//! through a queue: the first caller becomes the drainer and delivers
//! events one at a time; nested and concurrent callers enqueue and return.

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use crate::{error::Failure, observation::Observation, observer::Observer};

enum Event<M> {
  Observe(Observation),
  Next(M),
  Complete,
  Fail(Failure),
}

struct SerializedCore<M, O> {
  observer: Mutex<O>,
  queue: Mutex<VecDeque<Event<M>>>,
  draining: AtomicBool,
}

/// Cloneable serialization point in front of a sink.
pub struct SerializedObserver<M, O> {
  core: Arc<SerializedCore<M, O>>,
}

impl<M, O> Clone for SerializedObserver<M, O> {
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

impl<M, O> SerializedObserver<M, O>
where
  M: Send,
  O: Observer<M>,
{
  pub fn new(observer: O) -> Self {
    Self {
      core: Arc::new(SerializedCore {
        observer: Mutex::new(observer),
        queue: Mutex::new(VecDeque::new()),
        draining: AtomicBool::new(false),
      }),
    }
  }

  fn push(&self, event: Event<M>) {
    self
      .core
      .queue
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push_back(event);
    if !self.core.draining.swap(true, Ordering::SeqCst) {
      self.drain();
    }
  }

  fn drain(&self) {
    loop {
      let event = self
        .core
        .queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop_front();
      match event {
        Some(event) => {
          let mut observer = self
            .core
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner());
          match event {
            Event::Observe(observation) => observer.on_observe(observation),
            Event::Next(message) => observer.on_next(message),
            Event::Complete => observer.on_complete(),
            Event::Fail(failure) => observer.on_fail(failure),
          }
        }
        None => {
          self.core.draining.store(false, Ordering::SeqCst);
          // A producer may have enqueued between the empty pop and the
          // store; reclaim the drainer role or leave it to them.
          let queue_empty = self
            .core
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty();
          if queue_empty || self.core.draining.swap(true, Ordering::SeqCst) {
            return;
          }
        }
      }
    }
  }
}

impl<M, O> Observer<M> for SerializedObserver<M, O>
where
  M: Send,
  O: Observer<M>,
{
  fn on_observe(&mut self, observation: Observation) {
    self.push(Event::Observe(observation));
  }

  fn on_next(&mut self, message: M) { self.push(Event::Next(message)); }

  fn on_complete(&mut self) { self.push(Event::Complete); }

  fn on_fail(&mut self, failure: Failure) { self.push(Event::Fail(failure)); }
}

#[cfg(test)]
mod test {
  use std::{sync::Arc, thread};

  use super::*;

  type SharedSink = SerializedObserver<i32, Box<dyn Observer<i32>>>;

  struct Collector {
    seen: Arc<Mutex<Vec<i32>>>,
  }

  impl Observer<i32> for Collector {
    fn on_next(&mut self, message: i32) {
      self.seen.lock().unwrap().push(message);
    }
  }

  struct Reentrant {
    seen: Arc<Mutex<Vec<i32>>>,
    feedback: Arc<Mutex<Option<SharedSink>>>,
  }

  impl Observer<i32> for Reentrant {
    fn on_next(&mut self, message: i32) {
      self.seen.lock().unwrap().push(message);
      if message == 1 {
        // Nested delivery from inside a delivery must not deadlock; the
        // active drainer picks it up after this event returns.
        let feedback = self.feedback.lock().unwrap().clone();
        if let Some(mut feedback) = feedback {
          feedback.on_next(10);
        }
      }
    }
  }

  #[test]
  fn nested_delivery_is_deferred_not_deadlocked() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let feedback = Arc::new(Mutex::new(None));

    let mut serialized: SharedSink = SerializedObserver::new(Box::new(Reentrant {
      seen: seen.clone(),
      feedback: feedback.clone(),
    }));
    *feedback.lock().unwrap() = Some(serialized.clone());

    serialized.on_next(1);
    serialized.on_next(2);

    assert_eq!(*seen.lock().unwrap(), vec![1, 10, 2]);
  }

  #[test]
  fn concurrent_producers_observe_a_total_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let serialized = SerializedObserver::new(Collector { seen: seen.clone() });

    let producers: Vec<_> = (0..4)
      .map(|p| {
        let mut sink = serialized.clone();
        thread::spawn(move || {
          for i in 0..50 {
            sink.on_next(p * 100 + i);
          }
        })
      })
      .collect();
    for producer in producers {
      producer.join().unwrap();
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 200);
    // Per-producer order survives interleaving.
    for p in 0..4 {
      let series: Vec<_> = seen
        .iter()
        .filter(|v| **v / 100 == p)
        .copied()
        .collect();
      let expected: Vec<_> = (0..50).map(|i| p * 100 + i).collect();
      assert_eq!(series, expected);
    }
  }
}
