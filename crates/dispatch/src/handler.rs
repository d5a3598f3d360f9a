//! The application side of the scheduler: handlers, the factory that
//! resolves them, and where handler failures go.

use std::marker::PhantomData;
use std::sync::Arc;

use sb_domain::trace::TraceEvent;
use tokio::sync::mpsc;

use crate::error::HandlerFailure;
use crate::event::{Event, SessionKey};

/// Processes one event.  Invocations for the same session never overlap.
#[async_trait::async_trait]
pub trait Handler<P>: Send + Sync {
    async fn handle(&self, event: Event<P>) -> anyhow::Result<()>;
}

/// Resolves the handler for a session, once per invocation.
pub trait HandlerFactory<P>: Send + Sync {
    fn handler_for(&self, session_key: &SessionKey) -> Arc<dyn Handler<P>>;
}

/// One handler instance shared by every session.
pub struct SharedHandler<P> {
    handler: Arc<dyn Handler<P>>,
}

impl<P> SharedHandler<P> {
    pub fn new(handler: impl Handler<P> + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn from_arc(handler: Arc<dyn Handler<P>>) -> Self {
        Self { handler }
    }
}

impl<P> HandlerFactory<P> for SharedHandler<P> {
    fn handler_for(&self, _session_key: &SessionKey) -> Arc<dyn Handler<P>> {
        self.handler.clone()
    }
}

/// Factory backed by a closure, for per-session handler construction.
pub struct FnFactory<F, P> {
    make: F,
    _payload: PhantomData<fn() -> P>,
}

impl<F, P> FnFactory<F, P>
where
    F: Fn(&SessionKey) -> Arc<dyn Handler<P>> + Send + Sync,
{
    pub fn new(make: F) -> Self {
        Self {
            make,
            _payload: PhantomData,
        }
    }
}

impl<F, P> HandlerFactory<P> for FnFactory<F, P>
where
    F: Fn(&SessionKey) -> Arc<dyn Handler<P>> + Send + Sync,
{
    fn handler_for(&self, session_key: &SessionKey) -> Arc<dyn Handler<P>> {
        (self.make)(session_key)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error reporting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receives every handler failure observed by the dispatch loop.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, failure: HandlerFailure);
}

/// Logs failures at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, failure: HandlerFailure) {
        tracing::error!(
            session_key = %failure.session_key,
            sequence_id = failure.sequence_id.0,
            panicked = failure.panicked(),
            error = %failure.kind,
            "handler failed"
        );
        TraceEvent::HandlerFailed {
            session_key: failure.session_key.to_string(),
            sequence_id: failure.sequence_id.0,
            panicked: failure.panicked(),
        }
        .emit();
    }
}

/// Forwards failures into a channel owned by the embedding application.
///
/// Failures are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<HandlerFailure>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HandlerFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorReporter for ChannelReporter {
    fn report(&self, failure: HandlerFailure) {
        let _ = self.tx.send(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::event::SequenceId;

    struct Noop;

    #[async_trait::async_trait]
    impl Handler<u32> for Noop {
        async fn handle(&self, _event: Event<u32>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn shared_handler_returns_same_instance() {
        let factory = SharedHandler::new(Noop);
        let a = factory.handler_for(&SessionKey::from(1));
        let b = factory.handler_for(&SessionKey::from(2));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fn_factory_builds_per_call() {
        let factory = FnFactory::new(|_key: &SessionKey| -> Arc<dyn Handler<u32>> { Arc::new(Noop) });
        let a = factory.handler_for(&SessionKey::from(1));
        let b = factory.handler_for(&SessionKey::from(1));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn channel_reporter_delivers_failures() {
        let (reporter, mut rx) = ChannelReporter::new();
        reporter.report(HandlerFailure {
            session_key: SessionKey::from(5),
            sequence_id: SequenceId(11),
            kind: FailureKind::Error(anyhow::anyhow!("boom")),
        });
        let failure = rx.recv().await.unwrap();
        assert_eq!(failure.sequence_id, SequenceId(11));
        assert!(!failure.panicked());
        assert!(failure.to_string().contains("boom"));
    }
}
