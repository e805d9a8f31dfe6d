//! Executor rebinding.
//!
//! Re-emits every protocol event as a task on the given executor. Ordering
//! between events is whatever the executor provides; a single-threaded or
//! calling-thread executor preserves the upstream order exactly.

use std::sync::Arc;

use crate::{
  error::Failure,
  executor::Executor,
  observable::Observable,
  observation::Observation,
  observer::Observer,
  rc::MutArc,
};

#[derive(Clone)]
pub struct ExecuteOnOp<S> {
  pub(crate) source: S,
  pub(crate) executor: Arc<dyn Executor>,
}

impl<M, S> Observable<M> for ExecuteOnOp<S>
where
  M: Send + 'static,
  S: Observable<M>,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    self.source.observe(ExecutorObserver {
      downstream: MutArc::own(observer),
      executor: self.executor.clone(),
    })
  }
}

pub struct ExecutorObserver<O> {
  downstream: MutArc<O>,
  executor: Arc<dyn Executor>,
}

impl<M, O> Observer<M> for ExecutorObserver<O>
where
  M: Send + 'static,
  O: Observer<M> + 'static,
{
  fn on_observe(&mut self, observation: Observation) {
    let downstream = self.downstream.clone();
    self.executor.execute(Box::new(move || {
      downstream.lock().on_observe(observation);
    }));
  }

  fn on_next(&mut self, message: M) {
    let downstream = self.downstream.clone();
    self.executor.execute(Box::new(move || {
      downstream.lock().on_next(message);
    }));
  }

  fn on_complete(&mut self) {
    let downstream = self.downstream.clone();
    self.executor.execute(Box::new(move || {
      downstream.lock().on_complete();
    }));
  }

  fn on_fail(&mut self, failure: Failure) {
    let downstream = self.downstream.clone();
    self.executor.execute(Box::new(move || {
      downstream.lock().on_fail(failure);
    }));
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    executor::CallingThreadExecutor,
    prelude::*,
    testing::{collector, drain, push_into},
  };

  #[test]
  fn calling_thread_executor_preserves_order() {
    let collected = collector();
    observable::of(vec![1, 2, 3])
      .execute_on(Arc::new(CallingThreadExecutor))
      .subscribe(push_into(&collected));
    assert_eq!(drain(&collected), vec![1, 2, 3]);
  }

  #[cfg(feature = "futures-executor")]
  #[test]
  fn pool_executor_delivers_every_event() {
    use crate::executor::Latch;
    use futures::executor::ThreadPool;

    // One worker: submission order is preserved, so the completion task
    // runs after every message task.
    let pool = ThreadPool::builder().pool_size(1).create().unwrap();
    let collected = collector();
    let latch = Arc::new(Latch::new(1));

    let completion_latch = latch.clone();
    let hot = HotObservable::new();
    hot
      .clone()
      .execute_on(Arc::new(pool))
      .then_after(crate::observer::on_completion(move || {
        completion_latch.count_down()
      }))
      .subscribe(push_into(&collected));

    for i in 0..10 {
      hot.next(i);
    }
    hot.complete();
    latch.wait();

    assert_eq!(drain(&collected), (0..10).collect::<Vec<_>>());
  }
}
