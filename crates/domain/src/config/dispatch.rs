use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch loop configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upper bound for `max_in_flight`.
pub const MAX_IN_FLIGHT_LIMIT: usize = 256;

/// Settings for the per-session dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Delay between two polling ticks.
    #[serde(default = "d_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of handler invocations running at once across all
    /// sessions.  `1` drains sessions one after another within a tick.
    /// Clamped to `1..=256`.
    #[serde(default = "d_max_in_flight")]
    pub max_in_flight: usize,

    /// What to do when an update arrives with a sequence id that is
    /// already buffered for the same session.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Release of idle session queues.
    #[serde(default)]
    pub eviction: EvictionConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: d_tick_interval_ms(),
            max_in_flight: d_max_in_flight(),
            duplicate_policy: DuplicatePolicy::default(),
            eviction: EvictionConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Clamp `max_in_flight` to the allowed range `1..=256`.
    pub fn clamped(&self) -> Self {
        Self {
            max_in_flight: self.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT),
            ..self.clone()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Behaviour of a session queue when a sequence id is pushed twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The later event replaces the buffered one.
    #[default]
    Overwrite,
    /// The later event is dropped; the buffered one is kept.
    Reject,
    /// Both are kept and delivered in push order.
    Append,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Eviction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which idle session queues get released, and how often that is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    #[serde(default = "d_eviction_mode")]
    pub policy: EvictionMode,

    /// Inactivity threshold for `idle_timeout`.
    #[serde(default = "d_idle_secs")]
    pub idle_secs: u64,

    /// Session count above which `lru_capacity` starts evicting.
    #[serde(default = "d_capacity")]
    pub capacity: usize,

    /// How often the dispatch loop runs the policy.
    #[serde(default = "d_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            policy: d_eviction_mode(),
            idle_secs: d_idle_secs(),
            capacity: d_capacity(),
            sweep_interval_secs: d_sweep_interval_secs(),
        }
    }
}

impl EvictionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Keep every session queue for the process lifetime.
    RetainAll,
    /// Drop queues that have been idle for `idle_secs`.
    IdleTimeout,
    /// Keep at most `capacity` queues, dropping the least recently active.
    LruCapacity,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_tick_interval_ms() -> u64 {
    100
}
fn d_max_in_flight() -> usize {
    16
}
fn d_eviction_mode() -> EvictionMode {
    EvictionMode::IdleTimeout
}
fn d_idle_secs() -> u64 {
    3_600
}
fn d_capacity() -> usize {
    10_000
}
fn d_sweep_interval_secs() -> u64 {
    60
}
