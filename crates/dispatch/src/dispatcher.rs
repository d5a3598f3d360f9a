//! Polling loop that drains session queues through a bounded worker pool.

use std::sync::Arc;
use std::time::Duration;

use sb_domain::config::DispatchConfig;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::eviction::{EvictionPolicy, RetainAll};
use crate::handler::{ErrorReporter, HandlerFactory, TracingReporter};
use crate::queue::TryHandle;
use crate::registry::SessionRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Sleep between two ticks.
    pub tick_interval: Duration,
    /// Handler invocations allowed to run at once across all sessions.
    pub max_in_flight: usize,
    /// Minimum time between two eviction sweeps.
    pub sweep_interval: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatcherOptions {
    fn from(config: &DispatchConfig) -> Self {
        let config = config.clamped();
        Self {
            tick_interval: config.tick_interval(),
            max_in_flight: config.max_in_flight,
            sweep_interval: config.eviction.sweep_interval(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Walks every known session once per tick and hands the lowest pending
/// event of each idle session to its handler.
pub struct Dispatcher<P> {
    registry: Arc<SessionRegistry<P>>,
    factory: Arc<dyn HandlerFactory<P>>,
    reporter: Arc<dyn ErrorReporter>,
    eviction: Arc<dyn EvictionPolicy>,
    options: DispatcherOptions,
}

impl<P: Send + 'static> Dispatcher<P> {
    /// A dispatcher with default options, failures logged through
    /// `tracing`, and no eviction.
    pub fn new(registry: Arc<SessionRegistry<P>>, factory: impl HandlerFactory<P> + 'static) -> Self {
        Self {
            registry,
            factory: Arc::new(factory),
            reporter: Arc::new(TracingReporter),
            eviction: Arc::new(RetainAll),
            options: DispatcherOptions::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_eviction(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.eviction = Arc::from(policy);
        self
    }

    pub fn with_options(mut self, options: DispatcherOptions) -> Self {
        self.options = DispatcherOptions {
            max_in_flight: options.max_in_flight.max(1),
            ..options
        };
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<P>> {
        &self.registry
    }

    /// Run until `cancel` fires, then wait for every in-flight handler.
    pub async fn run(self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.options.max_in_flight));
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut last_sweep = Instant::now();

        tracing::info!(
            tick_ms = self.options.tick_interval.as_millis() as u64,
            max_in_flight = self.options.max_in_flight,
            eviction = self.eviction.name(),
            "dispatcher started"
        );

        while !cancel.is_cancelled() {
            while let Some(result) = workers.try_join_next() {
                reap(result);
            }

            self.tick(&permits, &mut workers, &cancel).await;

            if last_sweep.elapsed() >= self.options.sweep_interval {
                let now = Instant::now();
                self.registry.evict(self.eviction.as_ref(), now);
                last_sweep = now;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.tick_interval) => {}
            }
        }

        let in_flight = workers.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "dispatcher stopping, waiting for handlers");
        }
        while let Some(result) = workers.join_next().await {
            reap(result);
        }
        tracing::info!("dispatcher stopped");
    }

    /// Schedule at most one handler invocation per session.
    async fn tick(
        &self,
        permits: &Arc<Semaphore>,
        workers: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) {
        for key in self.registry.keys() {
            let Some(queue) = self.registry.get(&key) else {
                continue;
            };
            if queue.is_busy() || queue.is_empty() {
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let handler = self.factory.handler_for(&key);
            let reporter = self.reporter.clone();
            workers.spawn(async move {
                let _permit = permit;
                match queue.try_handle(handler.as_ref()).await {
                    Ok(TryHandle::Handled(sequence_id)) => {
                        tracing::trace!(session_key = %key, %sequence_id, "event handled");
                    }
                    Ok(TryHandle::Busy | TryHandle::Idle) => {}
                    Err(failure) => reporter.report(failure),
                }
            });
        }
    }

    /// Run on a new task with its own cancellation token.
    pub fn spawn(self) -> DispatcherHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        DispatcherHandle { cancel, task }
    }
}

fn reap(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "dispatch worker panicked outside its handler");
        }
    }
}

/// Controls a dispatcher started with [`Dispatcher::spawn`].
pub struct DispatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop scheduling and wait until every running handler returned.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
    }
}
