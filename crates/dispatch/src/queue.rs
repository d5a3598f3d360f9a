//! Per-session ordered buffer with a single-handler busy flag.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use sb_domain::config::DuplicatePolicy;
use tokio::time::Instant;

use crate::error::{FailureKind, HandlerFailure};
use crate::event::{Event, SequenceId, SessionKey};
use crate::handler::Handler;

/// What [`SessionQueue::push`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The sequence id was not buffered yet.
    Inserted,
    /// An event with the same sequence id was replaced.
    Replaced,
    /// Queued behind an event with the same sequence id.
    Appended,
    /// Dropped because the sequence id was already buffered.
    Rejected,
}

impl PushOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Appended => "appended",
            Self::Rejected => "rejected",
        }
    }
}

/// Result of one [`SessionQueue::try_handle`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryHandle {
    /// A handler was already running; nothing was pulled.
    Busy,
    /// Nothing was buffered.
    Idle,
    /// The event with this sequence id was handled successfully.
    Handled(SequenceId),
}

struct Buffer<P> {
    events: BTreeMap<SequenceId, VecDeque<Event<P>>>,
    len: usize,
    last_active: Instant,
}

/// Pending events of one session, released lowest sequence id first.
pub struct SessionQueue<P> {
    key: SessionKey,
    policy: DuplicatePolicy,
    buffer: Mutex<Buffer<P>>,
    busy: AtomicBool,
}

/// Clears the busy flag when dropped, including on unwind.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P> SessionQueue<P> {
    pub fn new(key: SessionKey, policy: DuplicatePolicy) -> Self {
        Self {
            key,
            policy,
            buffer: Mutex::new(Buffer {
                events: BTreeMap::new(),
                len: 0,
                last_active: Instant::now(),
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Buffer an event by its sequence id.
    pub fn push(&self, event: Event<P>) -> PushOutcome {
        let mut guard = self.buffer.lock();
        let buffer = &mut *guard;
        buffer.last_active = Instant::now();

        match buffer.events.entry(event.sequence_id) {
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::from([event]));
                buffer.len += 1;
                PushOutcome::Inserted
            }
            Entry::Occupied(mut slot) => match self.policy {
                DuplicatePolicy::Overwrite => {
                    let bucket = slot.get_mut();
                    buffer.len -= bucket.len();
                    bucket.clear();
                    bucket.push_back(event);
                    buffer.len += 1;
                    PushOutcome::Replaced
                }
                DuplicatePolicy::Reject => PushOutcome::Rejected,
                DuplicatePolicy::Append => {
                    slot.get_mut().push_back(event);
                    buffer.len += 1;
                    PushOutcome::Appended
                }
            },
        }
    }

    /// Remove and return the event with the smallest sequence id.
    pub fn pull(&self) -> Option<Event<P>> {
        let mut guard = self.buffer.lock();
        let buffer = &mut *guard;

        let mut first = buffer.events.first_entry()?;
        let event = first.get_mut().pop_front();
        if first.get().is_empty() {
            first.remove();
        }
        if event.is_some() {
            buffer.len -= 1;
        }
        event
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Empty and not handling anything: safe to drop from the registry.
    ///
    /// Emptiness is read first; a handler only starts after claiming
    /// `busy` and pulling, so an empty buffer followed by a clear flag
    /// means nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        self.is_empty() && !self.is_busy()
    }

    /// Time since the last push or completed handler invocation.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.buffer.lock().last_active)
    }

    fn touch(&self) {
        self.buffer.lock().last_active = Instant::now();
    }
}

impl<P: Send + 'static> SessionQueue<P> {
    /// Hand the next buffered event to `handler`, unless a handler is
    /// already running for this session.
    ///
    /// The busy flag is taken before pulling and released when this call
    /// returns, whether the handler succeeded, failed or panicked.  A
    /// failed event is not put back.
    pub async fn try_handle(&self, handler: &dyn Handler<P>) -> Result<TryHandle, HandlerFailure> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(TryHandle::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        let Some(event) = self.pull() else {
            return Ok(TryHandle::Idle);
        };
        let sequence_id = event.sequence_id;

        let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        self.touch();

        let kind = match outcome {
            Ok(Ok(())) => return Ok(TryHandle::Handled(sequence_id)),
            Ok(Err(e)) => FailureKind::Error(e),
            Err(panic) => FailureKind::Panicked(panic_message(panic.as_ref())),
        };
        Err(HandlerFailure {
            session_key: self.key.clone(),
            sequence_id,
            kind,
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
