//! Integration tests for the protocol contract.
//!
//! Exercises cross-operator chains, demand conservation, termination
//! discipline and threading behavior through the public API.

use std::sync::{Arc, Mutex};

use backflow::prelude::*;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_test_writer()
    .try_init();
}

#[derive(Clone, Default)]
struct Probe {
  events: Arc<Mutex<Vec<String>>>,
}

struct ProbeObserver {
  events: Arc<Mutex<Vec<String>>>,
  observation: Arc<Mutex<Option<Observation>>>,
  demand: u64,
}

impl Probe {
  fn observer(&self, demand: u64) -> (ProbeObserver, Arc<Mutex<Option<Observation>>>) {
    let observation = Arc::new(Mutex::new(None));
    (
      ProbeObserver {
        events: self.events.clone(),
        observation: observation.clone(),
        demand,
      },
      observation,
    )
  }

  fn events(&self) -> Vec<String> { self.events.lock().unwrap().clone() }

  fn messages(&self) -> usize {
    self
      .events()
      .iter()
      .filter(|event| event.starts_with("next"))
      .count()
  }

  fn terminals(&self) -> usize {
    self
      .events()
      .iter()
      .filter(|event| *event == "complete" || event.starts_with("fail"))
      .count()
  }
}

impl Observer<i32> for ProbeObserver {
  fn on_observe(&mut self, observation: Observation) {
    *self.observation.lock().unwrap() = Some(observation.clone());
    self.events.lock().unwrap().push("observe".into());
    if self.demand > 0 {
      observation.request(self.demand);
    }
  }

  fn on_next(&mut self, message: i32) {
    self.events.lock().unwrap().push(format!("next {message}"));
  }

  fn on_complete(&mut self) {
    self.events.lock().unwrap().push("complete".into());
  }

  fn on_fail(&mut self, failure: Failure) {
    self.events.lock().unwrap().push(format!("fail {failure}"));
  }
}

fn held(observation: &Arc<Mutex<Option<Observation>>>) -> Observation {
  observation.lock().unwrap().clone().expect("observed")
}

// ============================================================================
// Demand conservation
// ============================================================================

#[test]
fn deliveries_never_exceed_cumulative_requests() {
  for pattern in [vec![1u64, 1, 1], vec![2, 3], vec![0, 5], vec![4]] {
    let probe = Probe::default();
    let (observer, observation) = probe.observer(0);
    observable::of(1..=10).observe(observer);

    let mut requested = 0;
    for step in pattern {
      requested += step;
      held(&observation).request(step);
      assert!(probe.messages() as u64 <= requested);
    }
    assert_eq!(probe.messages() as u64, requested.min(10));
  }
}

#[test]
fn operator_chains_conserve_demand() {
  let probe = Probe::default();
  let (observer, observation) = probe.observer(2);
  observable::of(1..=100)
    .filter(|v| v % 3 == 0)
    .map(|v| v * 2)
    .observe(observer);

  assert_eq!(probe.messages(), 2);
  held(&observation).request(3);
  assert_eq!(probe.messages(), 5);
}

// ============================================================================
// Exactly-once termination
// ============================================================================

#[test]
fn termination_is_exactly_once_across_request_patterns() {
  let patterns: Vec<Vec<u64>> = vec![
    vec![UNBOUNDED],
    vec![1, 1, 1, 1, 1, 1],
    vec![3, 3],
    vec![5, UNBOUNDED],
    vec![2, 0, 4],
  ];
  for pattern in patterns {
    let probe = Probe::default();
    let (observer, observation) = probe.observer(0);
    observable::of(1..=5).observe(observer);

    for step in pattern {
      held(&observation).request(step);
    }
    held(&observation).request(1);
    assert_eq!(probe.messages(), 5);
    assert_eq!(probe.terminals(), 1, "events: {:?}", probe.events());
  }
}

#[test]
fn cancel_interleaved_with_requests_never_terminates_twice() {
  for cancel_after in 0..5 {
    let probe = Probe::default();
    let (observer, observation) = probe.observer(0);
    observable::of(1..=5).observe(observer);

    for step in 0..6 {
      if step == cancel_after {
        held(&observation).cancel();
      }
      held(&observation).request(1);
    }
    assert!(probe.terminals() <= 1);
    assert!(probe.messages() <= cancel_after);
  }
}

#[test]
fn cancellation_is_idempotent_after_termination() {
  let probe = Probe::default();
  let (observer, observation) = probe.observer(UNBOUNDED);
  observable::of(1..=3).observe(observer);

  held(&observation).cancel();
  held(&observation).cancel();
  assert_eq!(probe.terminals(), 1);
}

// ============================================================================
// Multicast fan-out
// ============================================================================

#[test]
fn hot_broadcast_reaches_every_subscription_identically() {
  let live = HotObservable::<i32>::new();
  let probes: Vec<Probe> = (0..4).map(|_| Probe::default()).collect();
  for probe in &probes {
    let (observer, _) = probe.observer(0);
    live.observe(observer);
  }

  live.next(1).next(2);
  live.complete();

  for probe in &probes {
    assert_eq!(probe.events(), probes[0].events());
    assert_eq!(probe.messages(), 2);
    assert_eq!(probe.terminals(), 1);
  }
}

#[test]
fn detached_subscription_misses_later_broadcasts() {
  let live = HotObservable::<i32>::new();
  let keeper = Probe::default();
  let leaver = Probe::default();
  let (observer, _) = keeper.observer(0);
  live.observe(observer);
  let (observer, observation) = leaver.observer(0);
  live.observe(observer);

  live.next(1);
  held(&observation).cancel();
  live.next(2);

  assert_eq!(keeper.messages(), 2);
  assert_eq!(leaver.messages(), 1);
}

// ============================================================================
// flatMap ordering
// ============================================================================

#[test]
fn concat_map_is_ordered_merge_map_is_complete() {
  let collected = Arc::new(Mutex::new(Vec::new()));
  let sink = collected.clone();
  observable::of(vec![vec![1, 2], vec![3, 4]])
    .concat_map(observable::of)
    .subscribe(move |v| sink.lock().unwrap().push(v));
  assert_eq!(*collected.lock().unwrap(), vec![1, 2, 3, 4]);

  let collected = Arc::new(Mutex::new(Vec::new()));
  let sink = collected.clone();
  observable::of(vec![vec![1, 2], vec![3, 4]])
    .merge_map(observable::of)
    .subscribe(move |v| sink.lock().unwrap().push(v));
  let mut merged = collected.lock().unwrap().clone();
  merged.sort_unstable();
  assert_eq!(merged, vec![1, 2, 3, 4]);
}

// ============================================================================
// Reduce draining
// ============================================================================

#[test]
fn reduce_backpressure_drains_one_fold_per_request() {
  let live = HotObservable::<i32>::new();
  let probe = Probe::default();
  let (observer, observation) = probe.observer(0);
  live.clone().reduce_backpressure(|| 0, |sum, v| sum + v).observe(observer);

  live.next(1).next(2).next(3);
  assert_eq!(probe.messages(), 0);

  held(&observation).request(1);
  assert_eq!(probe.events()[1], "next 6");
}

// ============================================================================
// Failure propagation
// ============================================================================

#[test]
fn failure_carries_the_original_cause_through_a_chain() {
  let probe = Probe::default();
  let (observer, _) = probe.observer(UNBOUNDED);
  observable::failing::<i32, _>(|| failure(AlreadyCompletedError))
    .map(|v: i32| v + 1)
    .filter(|v| *v > 0)
    .observe(observer);

  let events = probe.events();
  assert_eq!(events.len(), 2);
  assert_eq!(events[1], format!("fail {AlreadyCompletedError}"));
}

// ============================================================================
// Threads
// ============================================================================

#[test]
fn concurrent_broadcasts_preserve_per_subscription_totals() {
  init_tracing();
  let live = HotObservable::<i32>::new();
  let seen = Arc::new(Mutex::new(0u64));
  {
    let seen = seen.clone();
    live.clone().subscribe(move |_| *seen.lock().unwrap() += 1);
  }

  let mutex = Arc::new(Mutex::new(()));
  let producers: Vec<_> = (0..4)
    .map(|_| {
      let live = live.clone();
      let mutex = mutex.clone();
      std::thread::spawn(move || {
        for i in 0..250 {
          let _guard = mutex.lock().unwrap();
          live.next(i);
        }
      })
    })
    .collect();
  for producer in producers {
    producer.join().unwrap();
  }

  assert_eq!(*seen.lock().unwrap(), 1000);
}

#[test]
fn property_mutations_from_threads_keep_the_cell_consistent() {
  init_tracing();
  let property = Arc::new(ObservableProperty::new(0i64));
  let writers: Vec<_> = (0..4)
    .map(|writer| {
      let property = property.clone();
      std::thread::spawn(move || {
        for i in 0..100 {
          property.set(writer * 1000 + i);
        }
      })
    })
    .collect();
  for writer in writers {
    writer.join().unwrap();
  }

  let last = property.get().unwrap();
  assert!((0..4).any(|writer| (writer * 1000..writer * 1000 + 100).contains(&last)));
}

// ============================================================================
// Value cell end to end
// ============================================================================

#[test]
fn value_cell_round_trip() {
  let property = ObservableProperty::new(1);
  let changes = Arc::new(Mutex::new(Vec::new()));
  let sink = changes.clone();
  property
    .changes()
    .subscribe(move |change: Change<i32>| sink.lock().unwrap().push(change));

  property.set(1);
  property.set(2);
  property.set_problem(failure(AlreadyCompletedError));
  assert!(property.get().is_err());
  property.set(3);
  assert_eq!(property.get().unwrap(), 3);

  let changes = changes.lock().unwrap();
  assert_eq!(changes.len(), 3);
  assert_eq!(changes[0].previous_value().try_get(), Some(1));
  assert_eq!(changes[0].new_value().try_get(), Some(2));
  assert!(!changes[1].new_value().is_present());
  assert_eq!(changes[2].new_value().try_get(), Some(3));
}

#[test]
fn blocking_helpers_work_against_live_sources() {
  let live = HotObservable::<i32>::new();
  let producer = {
    let live = live.clone();
    std::thread::spawn(move || {
      // Give the consumer a moment to attach.
      std::thread::sleep(std::time::Duration::from_millis(10));
      live.next(42);
      live.complete();
    })
  };

  let next = live.get_next().get().unwrap();
  producer.join().unwrap();
  assert_eq!(next, 42);
}
