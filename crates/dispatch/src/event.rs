//! Event and ordering types.

use std::fmt;

use serde::Serialize;

use crate::error::DispatchError;

/// Identity of one conversation.  Opaque to the scheduler: only equality,
/// hashing and ordering are used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SessionKey {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Provider-assigned position of an event in its feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One unit of ordered work for a session.
#[derive(Debug, Clone)]
pub struct Event<P> {
    pub sequence_id: SequenceId,
    pub session_key: SessionKey,
    pub payload: P,
}

impl<P> Event<P> {
    pub fn new(
        sequence_id: impl Into<SequenceId>,
        session_key: impl Into<SessionKey>,
        payload: P,
    ) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            session_key: session_key.into(),
            payload,
        }
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

/// An inbound payload that knows its own sequence id and, when it is
/// well-formed, the session it belongs to.
pub trait Routable {
    fn sequence_id(&self) -> SequenceId;

    /// `None` when the payload carries no session reference.
    fn session_key(&self) -> Option<SessionKey>;
}

impl<P: Routable> Event<P> {
    /// Wrap a routable payload, rejecting it when it has no session key.
    pub fn from_routable(payload: P) -> Result<Self, DispatchError> {
        let sequence_id = payload.sequence_id();
        let session_key = payload
            .session_key()
            .ok_or(DispatchError::Unroutable { sequence_id })?;
        Ok(Self {
            sequence_id,
            session_key,
            payload,
        })
    }
}
