//! Session-keyed ordered delivery.
//!
//! Inbound events are routed into one [`SessionQueue`] per session key.
//! Each queue releases its buffered events in sequence-id order and never
//! lets two handler invocations overlap.  The [`Dispatcher`] polls every
//! known session on a fixed tick and drains one event per idle session per
//! tick through a bounded worker pool.
//!
//! Progress is conditional on handler termination: a session whose handler
//! never returns stays busy and is skipped on every tick.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod eviction;
pub mod handler;
pub mod queue;
pub mod registry;

pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherOptions};
pub use error::{DispatchError, FailureKind, HandlerFailure};
pub use event::{Event, Routable, SequenceId, SessionKey};
pub use eviction::{EvictionPolicy, IdleTimeout, LruCapacity, RetainAll};
pub use handler::{
    ChannelReporter, ErrorReporter, FnFactory, Handler, HandlerFactory, SharedHandler,
    TracingReporter,
};
pub use queue::{PushOutcome, SessionQueue, TryHandle};
pub use registry::{SessionRegistry, SessionStats};
pub use sb_domain::config::DuplicatePolicy;
