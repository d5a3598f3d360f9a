//! Concurrency checks for the dispatch crate: per-session exclusivity,
//! ordering under load and under concurrent producers, and registry
//! uniqueness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sb_dispatch::{
    Dispatcher, DispatcherOptions, Event, Handler, SessionKey, SessionRegistry, SharedHandler,
};
use tokio::sync::mpsc;

/// Counts concurrent invocations per session and records delivery order.
struct Recorder {
    in_flight: Mutex<HashMap<SessionKey, Arc<AtomicUsize>>>,
    overlap: AtomicUsize,
    order: Mutex<HashMap<SessionKey, Vec<u64>>>,
    done: mpsc::UnboundedSender<()>,
}

impl Recorder {
    fn counter(&self, key: &SessionKey) -> Arc<AtomicUsize> {
        self.in_flight
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone()
    }
}

#[async_trait::async_trait]
impl Handler<u64> for Recorder {
    async fn handle(&self, event: Event<u64>) -> anyhow::Result<()> {
        let counter = self.counter(&event.session_key);
        if counter.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlap.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.order
            .lock()
            .entry(event.session_key.clone())
            .or_default()
            .push(event.sequence_id.0);
        counter.fetch_sub(1, Ordering::SeqCst);
        let _ = self.done.send(());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_never_run_two_handlers_under_load() {
    const SESSIONS: i64 = 8;
    const PER_SESSION: u64 = 25;

    let registry: Arc<SessionRegistry<u64>> = Arc::new(SessionRegistry::default());
    let (done_tx, mut done) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        in_flight: Mutex::new(HashMap::new()),
        overlap: AtomicUsize::new(0),
        order: Mutex::new(HashMap::new()),
        done: done_tx,
    });

    let handler: Arc<dyn Handler<u64>> = recorder.clone();
    let handle = Dispatcher::new(registry.clone(), SharedHandler::from_arc(handler))
        .with_options(DispatcherOptions {
            tick_interval: Duration::from_millis(1),
            max_in_flight: 16,
            sweep_interval: Duration::from_secs(3600),
        })
        .spawn();

    // Producers push concurrently and out of order while the loop runs.
    let mut producers = Vec::new();
    for chat in 0..SESSIONS {
        let registry = registry.clone();
        producers.push(tokio::spawn(async move {
            let mut ids: Vec<u64> = (1..=PER_SESSION).collect();
            ids.reverse();
            ids.swap(0, (PER_SESSION / 2) as usize);
            for id in ids {
                registry.push(Event::new(id, chat, id));
                tokio::task::yield_now().await;
            }
        }));
    }
    for p in producers {
        p.await.unwrap();
    }

    let total = SESSIONS as u64 * PER_SESSION;
    for _ in 0..total {
        tokio::time::timeout(Duration::from_secs(10), done.recv())
            .await
            .expect("dispatch stalled")
            .unwrap();
    }
    handle.shutdown().await;

    assert_eq!(recorder.overlap.load(Ordering::SeqCst), 0);

    let order = recorder.order.lock();
    assert_eq!(order.len(), SESSIONS as usize);
    for ids in order.values() {
        assert_eq!(ids.len(), PER_SESSION as usize);
        // Producers race the loop, so an id may be handled before a
        // smaller one arrives.  Nothing may be lost or duplicated.
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=PER_SESSION).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn fully_buffered_sessions_drain_in_order() {
    let registry: Arc<SessionRegistry<u64>> = Arc::new(SessionRegistry::default());
    for chat in 0..4i64 {
        for id in [9u64, 2, 7, 4, 1] {
            registry.push(Event::new(id, chat, id));
        }
    }

    let (done_tx, mut done) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        in_flight: Mutex::new(HashMap::new()),
        overlap: AtomicUsize::new(0),
        order: Mutex::new(HashMap::new()),
        done: done_tx,
    });
    let handler: Arc<dyn Handler<u64>> = recorder.clone();
    let handle = Dispatcher::new(registry.clone(), SharedHandler::from_arc(handler))
        .with_options(DispatcherOptions {
            tick_interval: Duration::from_millis(2),
            max_in_flight: 1,
            sweep_interval: Duration::from_secs(3600),
        })
        .spawn();

    for _ in 0..20 {
        tokio::time::timeout(Duration::from_secs(5), done.recv())
            .await
            .unwrap()
            .unwrap();
    }
    handle.shutdown().await;

    for ids in recorder.order.lock().values() {
        assert_eq!(ids, &vec![1, 2, 4, 7, 9]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pushes_keep_each_session_ordered() {
    const SESSIONS: i64 = 16;
    const PER_SESSION: u64 = 200;
    const PRODUCERS: u64 = 4;
    // Coprime to PER_SESSION, so `i * STRIDE % PER_SESSION` permutes the ids.
    const STRIDE: u64 = 73;

    let registry: Arc<SessionRegistry<u64>> = Arc::new(SessionRegistry::default());

    let mut producers = Vec::new();
    for chat in 0..SESSIONS {
        for lane in 0..PRODUCERS {
            let registry = registry.clone();
            producers.push(tokio::spawn(async move {
                let ids = (0..PER_SESSION)
                    .filter(|i| i % PRODUCERS == lane)
                    .map(|i| (i * STRIDE + chat as u64) % PER_SESSION + 1);
                for id in ids {
                    registry.push(Event::new(id, chat, id));
                    tokio::task::yield_now().await;
                }
            }));
        }
    }
    for p in producers {
        p.await.unwrap();
    }

    assert_eq!(registry.len(), SESSIONS as usize);
    for chat in 0..SESSIONS {
        let queue = registry.get(&SessionKey::from(chat)).unwrap();
        let mut drained = Vec::new();
        while let Some(event) = queue.pull() {
            assert_eq!(event.session_key, SessionKey::from(chat));
            drained.push(event.sequence_id.0);
        }
        assert_eq!(drained.len(), PER_SESSION as usize);
        assert!(drained.windows(2).all(|w| w[0] < w[1]), "chat {chat}: {drained:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_yields_one_queue() {
    let registry: Arc<SessionRegistry<()>> = Arc::new(SessionRegistry::default());
    let key = SessionKey::from("shared");

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move { registry.get_or_create(&key) }));
    }

    let mut queues = Vec::new();
    for t in tasks {
        queues.push(t.await.unwrap());
    }

    assert_eq!(registry.len(), 1);
    let first = &queues[0];
    assert!(queues.iter().all(|q| Arc::ptr_eq(q, first)));
}
