//! Concurrent map of session key to queue.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sb_domain::config::DuplicatePolicy;
use sb_domain::trace::TraceEvent;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::DispatchError;
use crate::event::{Event, Routable, SessionKey};
use crate::eviction::EvictionPolicy;
use crate::queue::{PushOutcome, SessionQueue};

/// Point-in-time view of one session, used by eviction and the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub session_key: SessionKey,
    pub pending: usize,
    pub busy: bool,
    pub idle_ms: u64,
}

impl SessionStats {
    pub fn is_idle(&self) -> bool {
        !self.busy && self.pending == 0
    }
}

/// Holds at most one [`SessionQueue`] per session key.
pub struct SessionRegistry<P> {
    sessions: DashMap<SessionKey, Arc<SessionQueue<P>>>,
    duplicate_policy: DuplicatePolicy,
}

impl<P> Default for SessionRegistry<P> {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl<P> SessionRegistry<P> {
    pub fn new(duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            duplicate_policy,
        }
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Return the queue for `key`, creating it if absent.  Concurrent
    /// callers with the same key always get the same instance.
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<SessionQueue<P>> {
        if let Some(existing) = self.sessions.get(key) {
            return existing.clone();
        }
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => {
                let queue = Arc::new(SessionQueue::new(key.clone(), self.duplicate_policy));
                slot.insert(queue.clone());
                tracing::debug!(session_key = %key, "session created");
                TraceEvent::SessionCreated {
                    session_key: key.to_string(),
                }
                .emit();
                queue
            }
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<SessionQueue<P>>> {
        self.sessions.get(key).map(|q| q.clone())
    }

    /// Snapshot of the known session keys.  Sessions created after the
    /// call are not included.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Buffer an already-keyed event in its session queue.
    ///
    /// The push happens while the map entry is held, so a concurrent
    /// eviction sweep cannot remove the queue between lookup and push.
    pub fn push(&self, event: Event<P>) -> PushOutcome {
        let key = event.session_key.clone();
        let (outcome, created) = match self.sessions.entry(key.clone()) {
            Entry::Occupied(slot) => (slot.get().push(event), false),
            Entry::Vacant(slot) => {
                let queue = Arc::new(SessionQueue::new(key.clone(), self.duplicate_policy));
                let outcome = queue.push(event);
                slot.insert(queue);
                (outcome, true)
            }
        };
        match outcome {
            PushOutcome::Replaced | PushOutcome::Appended | PushOutcome::Rejected => {
                tracing::debug!(session_key = %key, outcome = outcome.as_str(), "duplicate sequence id");
            }
            PushOutcome::Inserted => {}
        }
        if created {
            tracing::debug!(session_key = %key, "session created");
            TraceEvent::SessionCreated {
                session_key: key.to_string(),
            }
            .emit();
        }
        outcome
    }

    pub fn stats(&self, key: &SessionKey) -> Option<SessionStats> {
        let queue = self.get(key)?;
        Some(stats_of(&queue, Instant::now()))
    }

    pub fn snapshot(&self) -> Vec<SessionStats> {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Vec<SessionStats> {
        self.sessions
            .iter()
            .map(|entry| stats_of(entry.value(), now))
            .collect()
    }

    /// Drop the sessions `policy` selects.  A selected session is only
    /// removed if it is still idle at removal time and no handle to it
    /// exists outside the registry.  Returns how many were removed.
    pub fn evict(&self, policy: &dyn EvictionPolicy, now: Instant) -> usize {
        let stats = self.snapshot_at(now);
        let selected = policy.select(&stats);
        if selected.is_empty() {
            return 0;
        }

        let evicted = selected
            .iter()
            .filter(|key| {
                self.sessions
                    .remove_if(*key, |_, q| Arc::strong_count(q) == 1 && q.is_idle())
                    .is_some()
            })
            .count();

        if evicted > 0 {
            tracing::info!(
                policy = policy.name(),
                evicted,
                remaining = self.sessions.len(),
                "sessions evicted"
            );
            TraceEvent::SessionsEvicted {
                policy: policy.name().to_owned(),
                evicted,
                remaining: self.sessions.len(),
            }
            .emit();
        }
        evicted
    }
}

fn stats_of<P>(queue: &SessionQueue<P>, now: Instant) -> SessionStats {
    SessionStats {
        session_key: queue.key().clone(),
        pending: queue.len(),
        busy: queue.is_busy(),
        idle_ms: queue.idle_for(now).as_millis() as u64,
    }
}

impl<P: Routable> SessionRegistry<P> {
    /// Route a raw payload into its session.  Payloads without a session
    /// reference are rejected without touching the registry.
    pub fn route(&self, payload: P) -> Result<PushOutcome, DispatchError> {
        let event = Event::from_routable(payload)?;
        let session_key = event.session_key.to_string();
        let sequence_id = event.sequence_id.0;
        let outcome = self.push(event);
        TraceEvent::UpdateRouted {
            session_key,
            sequence_id,
            outcome: outcome.as_str().to_owned(),
        }
        .emit();
        Ok(outcome)
    }
}
