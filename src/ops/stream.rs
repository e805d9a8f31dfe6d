//! `futures::Stream` adapter.
//!
//! Bridges the demand protocol into async pull: each `poll_next` with an
//! empty buffer requests one message and parks the task; deliveries wake
//! it. Items are `Result<M, Failure>`; the failure, if any, is yielded once
//! before the stream ends. Dropping the stream cancels the subscription.

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::{Arc, Mutex},
  task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{
  error::Failure,
  observable::Observable,
  observation::Observation,
  observer::Observer,
};

pub struct ObservableStream<M> {
  shared: Arc<Mutex<StreamState<M>>>,
  observation: Observation,
}

struct StreamState<M> {
  queue: VecDeque<M>,
  terminal: Option<Option<Failure>>,
  terminal_seen: bool,
  waker: Option<Waker>,
  requested: bool,
}

pub(crate) fn into_stream<M, S>(source: &S) -> ObservableStream<M>
where
  M: Send + 'static,
  S: Observable<M>,
{
  let shared = Arc::new(Mutex::new(StreamState {
    queue: VecDeque::new(),
    terminal: None,
    terminal_seen: false,
    waker: None,
    requested: false,
  }));
  let observation = source.observe(StreamObserver { shared: shared.clone(), observation: None });
  ObservableStream { shared, observation }
}

struct StreamObserver<M> {
  shared: Arc<Mutex<StreamState<M>>>,
  observation: Option<Observation>,
}

impl<M> StreamObserver<M>
where
  M: Send,
{
  fn wake(&self) {
    let waker = self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .waker
      .take();
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<M> Observer<M> for StreamObserver<M>
where
  M: Send,
{
  fn on_observe(&mut self, observation: Observation) {
    self.observation = Some(observation);
  }

  fn on_next(&mut self, message: M) {
    {
      let mut state = self.shared.lock().unwrap_or_else(|e| e.into_inner());
      state.queue.push_back(message);
      state.requested = false;
    }
    self.wake();
  }

  fn on_complete(&mut self) {
    self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .terminal = Some(None);
    self.wake();
  }

  fn on_fail(&mut self, failure: Failure) {
    self
      .shared
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .terminal = Some(Some(failure));
    self.wake();
  }
}

impl<M> Stream for ObservableStream<M>
where
  M: Send,
{
  type Item = Result<M, Failure>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    loop {
      let mut state = this.shared.lock().unwrap_or_else(|e| e.into_inner());
      if let Some(message) = state.queue.pop_front() {
        return Poll::Ready(Some(Ok(message)));
      }
      match &state.terminal {
        Some(terminal) if !state.terminal_seen => {
          let terminal = terminal.clone();
          state.terminal_seen = true;
          return match terminal {
            Some(failure) => Poll::Ready(Some(Err(failure))),
            None => Poll::Ready(None),
          };
        }
        Some(_) => return Poll::Ready(None),
        None => {}
      }
      state.waker = Some(cx.waker().clone());
      if state.requested {
        return Poll::Pending;
      }
      state.requested = true;
      drop(state);
      this.observation.request_next();
      // The request may have delivered synchronously; loop to pick it up.
    }
  }
}

impl<M> Drop for ObservableStream<M> {
  fn drop(&mut self) { self.observation.cancel() }
}
