//! Policies deciding which idle sessions the registry may forget.

use std::time::Duration;

use sb_domain::config::{EvictionConfig, EvictionMode};

use crate::event::SessionKey;
use crate::registry::SessionStats;

/// Chooses sessions to drop from a registry snapshot.
///
/// Only idle sessions should be selected; the registry re-checks idleness
/// at removal time and keeps anything that picked up work in between.
pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, sessions: &[SessionStats]) -> Vec<SessionKey>;
}

/// Never evicts.  Sessions live as long as the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainAll;

impl EvictionPolicy for RetainAll {
    fn name(&self) -> &'static str {
        "retain_all"
    }

    fn select(&self, _sessions: &[SessionStats]) -> Vec<SessionKey> {
        Vec::new()
    }
}

/// Evicts sessions idle for at least the configured duration.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout {
    timeout: Duration,
}

impl IdleTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl EvictionPolicy for IdleTimeout {
    fn name(&self) -> &'static str {
        "idle_timeout"
    }

    fn select(&self, sessions: &[SessionStats]) -> Vec<SessionKey> {
        let threshold = self.timeout.as_millis() as u64;
        sessions
            .iter()
            .filter(|s| s.is_idle() && s.idle_ms >= threshold)
            .map(|s| s.session_key.clone())
            .collect()
    }
}

/// Keeps at most `capacity` sessions, dropping the least recently active
/// idle ones first.  Busy or non-empty sessions are never selected, so
/// the registry may stay above capacity while they drain.
#[derive(Debug, Clone, Copy)]
pub struct LruCapacity {
    capacity: usize,
}

impl LruCapacity {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl EvictionPolicy for LruCapacity {
    fn name(&self) -> &'static str {
        "lru_capacity"
    }

    fn select(&self, sessions: &[SessionStats]) -> Vec<SessionKey> {
        let excess = sessions.len().saturating_sub(self.capacity);
        if excess == 0 {
            return Vec::new();
        }

        let mut idle: Vec<&SessionStats> = sessions.iter().filter(|s| s.is_idle()).collect();
        idle.sort_by(|a, b| b.idle_ms.cmp(&a.idle_ms));
        idle.into_iter()
            .take(excess)
            .map(|s| s.session_key.clone())
            .collect()
    }
}

/// Build the configured policy.
pub fn from_config(config: &EvictionConfig) -> Box<dyn EvictionPolicy> {
    match config.policy {
        EvictionMode::RetainAll => Box::new(RetainAll),
        EvictionMode::IdleTimeout => Box::new(IdleTimeout::new(Duration::from_secs(config.idle_secs))),
        EvictionMode::LruCapacity => Box::new(LruCapacity::new(config.capacity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(key: i64, pending: usize, busy: bool, idle_ms: u64) -> SessionStats {
        SessionStats {
            session_key: SessionKey::from(key),
            pending,
            busy,
            idle_ms,
        }
    }

    #[test]
    fn idle_timeout_skips_recent_busy_and_pending() {
        let policy = IdleTimeout::new(Duration::from_secs(10));
        let sessions = [
            stats(1, 0, false, 20_000),
            stats(2, 0, false, 5_000),
            stats(3, 0, true, 20_000),
            stats(4, 3, false, 20_000),
            stats(5, 0, false, 10_000),
        ];
        let selected = policy.select(&sessions);
        assert_eq!(selected, vec![SessionKey::from(1), SessionKey::from(5)]);
    }

    #[test]
    fn lru_capacity_under_limit_selects_nothing() {
        let policy = LruCapacity::new(3);
        let sessions = [stats(1, 0, false, 100), stats(2, 0, false, 200)];
        assert!(policy.select(&sessions).is_empty());
    }

    #[test]
    fn lru_capacity_drops_oldest_idle_first() {
        let policy = LruCapacity::new(2);
        let sessions = [
            stats(1, 0, false, 100),
            stats(2, 0, false, 900),
            stats(3, 1, false, 5_000),
            stats(4, 0, false, 400),
        ];
        assert_eq!(
            policy.select(&sessions),
            vec![SessionKey::from(2), SessionKey::from(4)]
        );
    }

    #[test]
    fn lru_capacity_cannot_select_active_sessions() {
        let policy = LruCapacity::new(1);
        let sessions = [stats(1, 0, true, 900), stats(2, 2, false, 900)];
        assert!(policy.select(&sessions).is_empty());
    }

    #[test]
    fn builds_configured_policy() {
        let mut config = EvictionConfig::default();
        config.policy = EvictionMode::LruCapacity;
        assert_eq!(from_config(&config).name(), "lru_capacity");
        config.policy = EvictionMode::RetainAll;
        assert_eq!(from_config(&config).name(), "retain_all");
    }
}
