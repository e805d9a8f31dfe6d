//! Multicast live source.
//!
//! One logical sequence shared by every attached subscription. The set of
//! attachments opens on the first subscriber and closes on the last detach;
//! both edges run the overridable lifecycle hooks. Broadcasts iterate a
//! snapshot of the set, never the live set, so concurrent attach and detach
//! during a broadcast are tolerated. After a terminal broadcast the source
//! is no longer live and further broadcasts are a programming error.
//!
//! With an executor, each subscription's delivery for a broadcast is
//! submitted as a task and the broadcasting call blocks on a latch until
//! every delivery finished, so `next` returning means the broadcast is
//! fully observed.

use std::sync::{
  Arc, Mutex, Weak,
  atomic::{AtomicBool, Ordering},
};

use smallvec::SmallVec;

use crate::{
  error::Failure,
  executor::{Executor, Latch, LatchGuard},
  observable::Observable,
  observation::{Observation, ObservationLike, UNBOUNDED},
  observer::Observer,
};

type Lifecycle = Box<dyn Fn() -> Result<(), Failure> + Send + Sync>;
type Attachments<M> = SmallVec<[Arc<HotAttachment<M>>; 2]>;

/// Multicast source handle. Cloning shares the same live sequence.
pub struct HotObservable<M> {
  core: Arc<HotCore<M>>,
}

impl<M> Clone for HotObservable<M> {
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

struct HotCore<M> {
  state: Mutex<HotState<M>>,
  executor: Option<Arc<dyn Executor>>,
  open: Option<Lifecycle>,
  close: Option<Lifecycle>,
}

struct HotState<M> {
  live: bool,
  attachments: Option<Attachments<M>>,
}

impl<M> Default for HotObservable<M>
where
  M: Send + 'static,
{
  fn default() -> Self { Self::new() }
}

impl<M> HotObservable<M>
where
  M: Send + 'static,
{
  pub fn new() -> Self { Self::build(None, None, None) }

  /// Broadcast deliveries are submitted to the executor; each broadcast
  /// call blocks until all fanned-out deliveries finish.
  pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
    Self::build(Some(executor), None, None)
  }

  /// Lifecycle hooks: `open` runs when the first subscriber attaches,
  /// `close` when the last one detaches. An `open` failure is delivered to
  /// the triggering subscriber and the set is reset.
  pub fn with_lifecycle(
    open: impl Fn() -> Result<(), Failure> + Send + Sync + 'static,
    close: impl Fn() -> Result<(), Failure> + Send + Sync + 'static,
  ) -> Self {
    Self::build(None, Some(Box::new(open)), Some(Box::new(close)))
  }

  fn build(
    executor: Option<Arc<dyn Executor>>,
    open: Option<Lifecycle>,
    close: Option<Lifecycle>,
  ) -> Self {
    Self {
      core: Arc::new(HotCore {
        state: Mutex::new(HotState { live: true, attachments: None }),
        executor,
        open,
        close,
      }),
    }
  }

  pub fn is_live(&self) -> bool { self.core.lock_state().live }

  pub fn has_observers(&self) -> bool {
    self.core.lock_state().attachments.is_some()
  }

  /// Panics if a terminal broadcast already retired this source.
  pub fn assert_live(&self) {
    assert!(self.is_live(), "hot observable is no longer live");
  }

  /// Fire a message to every attached subscription.
  pub fn next(&self, message: M) -> &Self
  where
    M: Clone,
  {
    let snapshot = {
      let state = self.core.lock_state();
      assert!(state.live, "hot observable is no longer live");
      state.attachments.clone()
    };
    if let Some(snapshot) = snapshot {
      self.core.for_attachments(&snapshot, move |attachment| {
        attachment.deliver_next(message.clone())
      });
    }
    self
  }

  /// End the sequence normally for every attached subscription.
  pub fn complete(&self) -> &Self {
    let snapshot = {
      let mut state = self.core.lock_state();
      assert!(state.live, "hot observable is no longer live");
      state.live = false;
      state.attachments.take()
    };
    if let Some(snapshot) = snapshot {
      self
        .core
        .for_attachments(&snapshot, |attachment| attachment.deliver_complete());
    }
    self
  }

  /// End the sequence with the given cause for every attached subscription.
  pub fn fail(&self, cause: Failure) -> &Self {
    let snapshot = {
      let mut state = self.core.lock_state();
      assert!(state.live, "hot observable is no longer live");
      state.live = false;
      state.attachments.take()
    };
    if let Some(snapshot) = snapshot {
      self.core.for_attachments(&snapshot, move |attachment| {
        attachment.deliver_fail(cause.clone())
      });
    }
    self
  }

  /// Revive a retired source. Subscriptions attached while it was dead are
  /// parked; they receive their `on_observe` now. Panics if still live.
  pub fn start(&self) -> &Self {
    let snapshot = {
      let mut state = self.core.lock_state();
      assert!(!state.live, "hot observable is already live");
      state.live = true;
      state.attachments.clone()
    };
    if let Some(snapshot) = snapshot {
      self
        .core
        .for_attachments(&snapshot, |attachment| attachment.deliver_observe());
    }
    self
  }

  pub(crate) fn observe_attachment(
    &self,
    observer: impl Observer<M> + 'static,
  ) -> Arc<HotAttachment<M>> {
    let attachment = Arc::new(HotAttachment {
      core: Arc::downgrade(&self.core),
      observer: Mutex::new(Some(Box::new(observer))),
      cancelled: AtomicBool::new(false),
      terminated: AtomicBool::new(false),
    });

    let (live, opened) = {
      let mut state = self.core.lock_state();
      let opened = state.attachments.is_none();
      if opened {
        state.attachments = Some(SmallVec::new());
      }
      state
        .attachments
        .as_mut()
        .expect("attachment set present")
        .push(attachment.clone());
      (state.live, opened)
    };

    if live {
      self.core.for_attachments(
        std::slice::from_ref(&attachment),
        |attachment| attachment.deliver_observe(),
      );
      if opened {
        tracing::trace!("hot observable opened");
        if let Some(open) = &self.core.open {
          if let Err(cause) = open() {
            self.core.lock_state().attachments = None;
            attachment.deliver_fail(cause);
          }
        }
      }
    }

    attachment
  }
}

impl<M> Observable<M> for HotObservable<M>
where
  M: Clone + Send + 'static,
{
  fn observe<O>(&self, observer: O) -> Observation
  where
    O: Observer<M> + 'static,
  {
    Observation::from_arc(self.observe_attachment(observer) as _)
  }
}

impl<M> HotCore<M> {
  fn lock_state(&self) -> std::sync::MutexGuard<'_, HotState<M>> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Deliver an action to each attachment, directly or through the
  /// executor with a full fan-out barrier.
  fn for_attachments(
    &self,
    attachments: &[Arc<HotAttachment<M>>],
    action: impl Fn(&Arc<HotAttachment<M>>) + Send + Clone + 'static,
  ) where
    M: Send + 'static,
  {
    match &self.executor {
      None => {
        for attachment in attachments {
          action(attachment);
        }
      }
      Some(executor) => {
        let latch = Arc::new(Latch::new(attachments.len()));
        for attachment in attachments {
          let attachment = attachment.clone();
          let action = action.clone();
          let guard = LatchGuard(latch.clone());
          executor.execute(Box::new(move || {
            let _guard = guard;
            action(&attachment);
          }));
        }
        latch.wait();
      }
    }
  }

  /// Detach one subscription; closes the source when the set empties.
  fn detach(&self, attachment: &HotAttachment<M>) {
    let closed = {
      let mut state = self.lock_state();
      match state.attachments.as_mut() {
        Some(attachments) => {
          attachments.retain(|candidate| {
            !std::ptr::eq(Arc::as_ptr(candidate), attachment)
          });
          if attachments.is_empty() {
            state.attachments = None;
            true
          } else {
            false
          }
        }
        None => false,
      }
    };
    if closed {
      tracing::trace!("hot observable closed");
      if let Some(close) = &self.close {
        if let Err(cause) = close() {
          // The detaching subscription is already cancelled and hears
          // nothing more; the close failure is only observable here.
          tracing::warn!(%cause, "close hook failed");
        }
      }
    }
  }
}

/// One attached subscription of a hot source. Demand is ignored: a live
/// sequence cannot be paused, so pending demand reports unbounded and
/// subscribers needing backpressure compose a reducing operator.
pub(crate) struct HotAttachment<M> {
  core: Weak<HotCore<M>>,
  observer: Mutex<Option<Box<dyn Observer<M>>>>,
  cancelled: AtomicBool,
  terminated: AtomicBool,
}

impl<M> HotAttachment<M> {
  fn suppressed(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst) || self.terminated.load(Ordering::SeqCst)
  }

  fn deliver(&self, event: impl FnOnce(&mut Box<dyn Observer<M>>)) {
    let taken = self
      .observer
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take();
    let Some(mut observer) = taken else { return };
    event(&mut observer);
    let mut slot = self.observer.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_none() {
      *slot = Some(observer);
    }
  }

  pub(crate) fn deliver_next(&self, message: M) {
    if self.suppressed() {
      return;
    }
    self.deliver(|observer| observer.on_next(message));
  }

  pub(crate) fn deliver_complete(&self) {
    if self.suppressed() {
      return;
    }
    self.terminated.store(true, Ordering::SeqCst);
    self.deliver(|observer| observer.on_complete());
    self.observer.lock().unwrap_or_else(|e| e.into_inner()).take();
  }

  pub(crate) fn deliver_fail(&self, cause: Failure) {
    if self.suppressed() {
      return;
    }
    self.terminated.store(true, Ordering::SeqCst);
    self.deliver(|observer| observer.on_fail(cause));
    self.observer.lock().unwrap_or_else(|e| e.into_inner()).take();
  }
}

impl<M> HotAttachment<M>
where
  M: Send + 'static,
{
  fn deliver_observe(self: &Arc<Self>) {
    if self.suppressed() {
      return;
    }
    let observation =
      Observation::from_arc(self.clone() as Arc<dyn ObservationLike>);
    self.deliver(move |observer| observer.on_observe(observation));
  }
}

impl<M> ObservationLike for HotAttachment<M>
where
  M: Send + 'static,
{
  fn request(&self, _count: u64) {
    // A live sequence has no pull; demand is absorbed.
  }

  fn pending_requests(&self) -> u64 { UNBOUNDED }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::SeqCst) {
      return;
    }
    self.observer.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(core) = self.core.upgrade() {
      core.detach(self);
    }
  }

  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}
