use serde::Serialize;

/// Structured trace events emitted across all SerialBot crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_key: String,
    },
    SessionsEvicted {
        policy: String,
        evicted: usize,
        remaining: usize,
    },
    UpdateRouted {
        session_key: String,
        sequence_id: u64,
        outcome: String,
    },
    UpdateRejected {
        sequence_id: u64,
        reason: String,
    },
    HandlerFailed {
        session_key: String,
        sequence_id: u64,
        panicked: bool,
    },
    WebhookRegistered {
        url: String,
        max_connections: Option<u32>,
    },
    BotApiCall {
        method: String,
        ok: bool,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sb_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = TraceEvent::UpdateRouted {
            session_key: "42".into(),
            sequence_id: 7,
            outcome: "inserted".into(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event\":\"UpdateRouted\""));
        assert!(json.contains("\"sequence_id\":7"));
    }
}
