//! Crate-private timer behind the time-driven operators.
//!
//! A single lazily-started thread runs a deadline heap. Tasks are
//! cancellable handles; cancelling an observation built on a timer task
//! cancels the task, so no scheduled work outlives its subscription.

use std::{
  cmp::Reverse,
  collections::BinaryHeap,
  sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use once_cell::sync::Lazy;

struct TimerTask {
  cancelled: Arc<AtomicBool>,
  period: Option<Duration>,
  action: Mutex<Box<dyn FnMut() + Send>>,
}

struct Entry {
  deadline: Instant,
  sequence: u64,
  task: Arc<TimerTask>,
}

impl PartialEq for Entry {
  fn eq(&self, other: &Self) -> bool {
    self.deadline == other.deadline && self.sequence == other.sequence
  }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Entry {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    (self.deadline, self.sequence).cmp(&(other.deadline, other.sequence))
  }
}

struct Timer {
  queue: Mutex<BinaryHeap<Reverse<Entry>>>,
  tick: Condvar,
  sequence: AtomicU64,
}

static TIMER: Lazy<Timer> = Lazy::new(|| {
  let timer = Timer {
    queue: Mutex::new(BinaryHeap::new()),
    tick: Condvar::new(),
    sequence: AtomicU64::new(0),
  };
  thread::Builder::new()
    .name("backflow-timer".into())
    .spawn(run_loop)
    .expect("failed to spawn timer thread");
  timer
});

fn run_loop() {
  enum Wait {
    Idle,
    Until(Duration),
    Run,
  }

  let timer = &*TIMER;
  let mut queue = timer.queue.lock().unwrap_or_else(|e| e.into_inner());
  loop {
    let now = Instant::now();
    let wait = match queue.peek() {
      None => Wait::Idle,
      Some(Reverse(entry)) if entry.deadline > now => {
        Wait::Until(entry.deadline - now)
      }
      Some(_) => Wait::Run,
    };
    match wait {
      Wait::Idle => {
        queue = timer
          .tick
          .wait(queue)
          .unwrap_or_else(|e| e.into_inner());
      }
      Wait::Until(timeout) => {
        queue = timer
          .tick
          .wait_timeout(queue, timeout)
          .unwrap_or_else(|e| e.into_inner())
          .0;
      }
      Wait::Run => {
        let Reverse(entry) = queue.pop().expect("peeked entry");
        drop(queue);
        let due = !entry.task.cancelled.load(Ordering::SeqCst);
        if due {
          (entry.task.action.lock().unwrap_or_else(|e| e.into_inner()))();
        }
        queue = timer.queue.lock().unwrap_or_else(|e| e.into_inner());
        if due {
          if let Some(period) = entry.task.period {
            if !entry.task.cancelled.load(Ordering::SeqCst) {
              queue.push(Reverse(Entry {
                deadline: entry.deadline + period,
                sequence: timer.sequence.fetch_add(1, Ordering::SeqCst),
                task: entry.task,
              }));
            }
          }
        }
      }
    }
  }
}

/// Handle to scheduled work. Cancelling prevents any further run.
#[derive(Clone)]
pub(crate) struct TimerHandle {
  cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
  pub(crate) fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst) }
}

/// Run `action` after `delay`, then every `period`, until cancelled.
pub(crate) fn schedule_at_fixed_rate(
  delay: Duration,
  period: Duration,
  action: impl FnMut() + Send + 'static,
) -> TimerHandle {
  let task = Arc::new(TimerTask {
    cancelled: Arc::new(AtomicBool::new(false)),
    period: Some(period),
    action: Mutex::new(Box::new(action)),
  });
  let handle = TimerHandle { cancelled: task.cancelled.clone() };
  let timer = &*TIMER;
  timer
    .queue
    .lock()
    .unwrap_or_else(|e| e.into_inner())
    .push(Reverse(Entry {
      deadline: Instant::now() + delay,
      sequence: timer.sequence.fetch_add(1, Ordering::SeqCst),
      task,
    }));
  timer.tick.notify_all();
  handle
}
