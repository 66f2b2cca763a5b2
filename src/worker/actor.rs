//! Runs a [`Registration`] as a tokio task.
//!
//! Lifecycle changes and messages are serialized through an mpsc channel
//! with oneshot replies. Fetches bypass the task: the active worker is
//! published on a watch channel and callers run its fetch strategy on
//! their own task. Unsolicited worker → page messages go out on a
//! broadcast channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::{
    BACKGROUND_SYNC_TAG, CacheWorker, ClientMessage, FetchRequest, FetchResponse, RegisterOutcome,
    Registration, SyncSummary, WorkerMessage, WorkerReply,
};
use crate::error::{Error, Result};
use crate::sync::PendingDrain;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 16;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Register {
        worker: Arc<CacheWorker>,
        reply: Reply<RegisterOutcome>,
    },
    Post {
        message: WorkerMessage,
        reply: Reply<Result<Option<WorkerReply>>>,
    },
}

struct WorkerActor {
    registration: Registration,
    active: watch::Sender<Option<Arc<CacheWorker>>>,
    events: broadcast::Sender<ClientMessage>,
    drain: Option<Arc<dyn PendingDrain>>,
}

impl WorkerActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { worker, reply } => {
                    let outcome = self.register(worker).await;
                    let _ = reply.send(outcome);
                }
                Command::Post { message, reply } => self.dispatch(message, reply).await,
            }
        }
        log::debug!("Cache worker task stopped");
    }

    fn publish_active(&self) {
        self.active
            .send_replace(self.registration.active().cloned());
    }

    async fn register(&mut self, worker: Arc<CacheWorker>) -> RegisterOutcome {
        let outcome = self.registration.register(worker).await;
        match outcome {
            RegisterOutcome::Activated => self.publish_active(),
            RegisterOutcome::Waiting => {
                log::info!("New cache worker waiting; update available");
                let _ = self.events.send(ClientMessage::UpdateAvailable);
            }
            RegisterOutcome::Failed => {}
        }
        outcome
    }

    async fn dispatch(&mut self, message: WorkerMessage, reply: Reply<Result<Option<WorkerReply>>>) {
        log::debug!("Worker message: {message:?}");
        let Some(active) = self.registration.active().cloned() else {
            let _ = reply.send(Err(Error::NoController));
            return;
        };

        match message {
            WorkerMessage::CheckUpdate => {
                tokio::spawn(async move {
                    let has_update = active.check_for_update().await;
                    let _ = reply.send(Ok(Some(WorkerReply::HasUpdate { has_update })));
                });
            }
            WorkerMessage::GetVersion => {
                let _ = reply.send(Ok(Some(WorkerReply::Version {
                    version: active.version(),
                })));
            }
            WorkerMessage::SkipWaiting => {
                if self.registration.skip_waiting().await {
                    self.publish_active();
                }
                let _ = reply.send(Ok(None));
            }
            WorkerMessage::Sync { tag } => {
                let _ = reply.send(Ok(None));
                if tag == BACKGROUND_SYNC_TAG {
                    self.spawn_background_sync();
                } else {
                    log::debug!("Ignoring sync tag {tag}");
                }
            }
        }
    }

    fn spawn_background_sync(&self) {
        let Some(drain) = self.drain.clone() else {
            log::warn!("Background sync requested but no drain hook is installed");
            return;
        };
        let events = self.events.clone();
        tokio::spawn(async move {
            match drain.drain().await {
                Ok(0) => log::info!("Background sync: nothing to send"),
                Ok(count) => {
                    log::info!("Background sync sent {count} item(s)");
                    let _ = events.send(ClientMessage::SyncComplete {
                        data: SyncSummary { count },
                    });
                }
                Err(e) => log::error!("Background sync failed: {e}"),
            }
        });
    }
}

/// Cloneable handle to a running worker registration.
#[derive(Clone)]
pub struct WorkerHandle {
    commands: mpsc::Sender<Command>,
    active: watch::Receiver<Option<Arc<CacheWorker>>>,
    events: broadcast::Sender<ClientMessage>,
}

impl WorkerHandle {
    /// Spawns the registration task on the current tokio runtime.
    /// `drain` is invoked on background-sync messages.
    #[must_use]
    pub fn spawn(drain: Option<Arc<dyn PendingDrain>>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (active_tx, active) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let actor = WorkerActor {
            registration: Registration::new(),
            active: active_tx,
            events: events.clone(),
            drain,
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands,
            active,
            events,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| Error::WorkerGone)?;
        rx.await.map_err(|_| Error::WorkerGone)
    }

    /// Installs `worker` and activates it or parks it as waiting. A failed
    /// install is reported as [`RegisterOutcome::Failed`], not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerGone`] if the task has stopped.
    pub async fn register(&self, worker: CacheWorker) -> Result<RegisterOutcome> {
        let worker = Arc::new(worker);
        self.request(|reply| Command::Register { worker, reply })
            .await
    }

    /// Posts `message` to the active worker and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoController`] when no worker is active, or
    /// [`Error::WorkerGone`] if the task has stopped.
    pub async fn post(&self, message: WorkerMessage) -> Result<Option<WorkerReply>> {
        self.request(|reply| Command::Post { message, reply })
            .await?
    }

    /// Parses a JSON message and posts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed messages, otherwise as
    /// [`WorkerHandle::post`].
    pub async fn post_json(&self, json: &str) -> Result<Option<WorkerReply>> {
        self.post(WorkerMessage::parse(json)?).await
    }

    /// Sends `CHECK_UPDATE`.
    ///
    /// # Errors
    ///
    /// As [`WorkerHandle::post`].
    pub async fn check_update(&self) -> Result<bool> {
        match self.post(WorkerMessage::CheckUpdate).await? {
            Some(WorkerReply::HasUpdate { has_update }) => Ok(has_update),
            other => Err(unexpected(other.as_ref())),
        }
    }

    /// Sends `GET_VERSION`.
    ///
    /// # Errors
    ///
    /// As [`WorkerHandle::post`].
    pub async fn version(&self) -> Result<String> {
        match self.post(WorkerMessage::GetVersion).await? {
            Some(WorkerReply::Version { version }) => Ok(version),
            other => Err(unexpected(other.as_ref())),
        }
    }

    /// Sends `SKIP_WAITING`.
    ///
    /// # Errors
    ///
    /// As [`WorkerHandle::post`].
    pub async fn skip_waiting(&self) -> Result<()> {
        self.post(WorkerMessage::SkipWaiting).await.map(|_| ())
    }

    /// The worker currently in control, if any.
    #[must_use]
    pub fn controller(&self) -> Option<Arc<CacheWorker>> {
        self.active.borrow().clone()
    }

    /// Runs `request` through the active worker's fetch strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoController`] when no worker is active, or the
    /// network error of a pass-through request.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let worker = self.controller().ok_or(Error::NoController)?;
        worker.handle_fetch(request).await
    }

    /// Receives unsolicited worker → page messages sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.events.subscribe()
    }
}

fn unexpected(reply: Option<&WorkerReply>) -> Error {
    Error::Protocol(format!("unexpected reply: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::worker::testing::{MockFetcher, manifest};
    use crate::worker::{CacheStore, Fetcher, MemoryCacheStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ASSETS: [&str; 2] = ["/", "/index.html"];

    struct Env {
        fetcher: Arc<MockFetcher>,
        caches: Arc<MemoryCacheStore>,
    }

    impl Env {
        fn new() -> Self {
            let fetcher = MockFetcher::with_assets(&ASSETS);
            fetcher.route("/manifest.json", manifest(Some("v1.0.0")));
            Self {
                fetcher: Arc::new(fetcher),
                caches: Arc::new(MemoryCacheStore::new()),
            }
        }

        fn worker(&self, version: &str) -> CacheWorker {
            CacheWorker::new(
                WorkerConfig::default()
                    .with_version(version)
                    .with_static_assets(ASSETS),
                Arc::clone(&self.fetcher) as Arc<dyn Fetcher>,
                Arc::clone(&self.caches) as Arc<dyn CacheStore>,
            )
        }
    }

    /// Reports a fixed count and records how often it ran.
    struct CountingDrain {
        count: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PendingDrain for CountingDrain {
        async fn drain(&self) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.count)
        }
    }

    #[tokio::test]
    async fn messages_without_controller_fail() {
        let handle = WorkerHandle::spawn(None);
        assert!(matches!(handle.version().await, Err(Error::NoController)));
        assert!(matches!(
            handle.fetch(&FetchRequest::get("/")).await,
            Err(Error::NoController)
        ));
        assert!(handle.controller().is_none());
    }

    #[tokio::test]
    async fn version_and_update_check() {
        let env = Env::new();
        let handle = WorkerHandle::spawn(None);
        assert_eq!(
            handle.register(env.worker("v1.0.0")).await.unwrap(),
            RegisterOutcome::Activated
        );
        assert_eq!(handle.version().await.unwrap(), "pwa-app-v1.0.0");
        assert!(!handle.check_update().await.unwrap());

        env.fetcher.route("/manifest.json", manifest(Some("v1.1.0")));
        assert!(handle.check_update().await.unwrap());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let handle = WorkerHandle::spawn(None);
        assert!(matches!(
            handle.post_json(r#"{"type":"NOPE"}"#).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn waiting_worker_announces_update_and_takes_over() {
        let env = Env::new();
        let handle = WorkerHandle::spawn(None);
        let mut events = handle.subscribe();

        handle.register(env.worker("v1.0.0")).await.unwrap();
        assert_eq!(
            handle.register(env.worker("v2.0.0")).await.unwrap(),
            RegisterOutcome::Waiting
        );
        assert_eq!(events.recv().await.unwrap(), ClientMessage::UpdateAvailable);
        assert_eq!(handle.version().await.unwrap(), "pwa-app-v1.0.0");

        handle.skip_waiting().await.unwrap();
        assert_eq!(handle.version().await.unwrap(), "pwa-app-v2.0.0");
        assert_eq!(
            handle.controller().map(|w| w.version()),
            Some("pwa-app-v2.0.0".to_string())
        );
    }

    #[tokio::test]
    async fn fetch_goes_through_active_worker() {
        let env = Env::new();
        let handle = WorkerHandle::spawn(None);
        handle.register(env.worker("v1.0.0")).await.unwrap();

        env.fetcher.set_offline(true);
        let page = handle.fetch(&FetchRequest::navigate("/anything")).await.unwrap();
        assert_eq!(page.body, bytes::Bytes::from("body of /index.html"));
    }

    #[tokio::test]
    async fn background_sync_reports_count() {
        let env = Env::new();
        let drain = Arc::new(CountingDrain {
            count: 2,
            calls: AtomicUsize::new(0),
        });
        let handle = WorkerHandle::spawn(Some(Arc::clone(&drain) as Arc<dyn PendingDrain>));
        handle.register(env.worker("v1.0.0")).await.unwrap();
        let mut events = handle.subscribe();

        let reply = handle
            .post(WorkerMessage::Sync {
                tag: "other-tag".into(),
            })
            .await
            .unwrap();
        assert!(reply.is_none());

        handle
            .post_json(r#"{"type":"SYNC","tag":"background-sync"}"#)
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ClientMessage::SyncComplete {
                data: SyncSummary { count: 2 }
            }
        );
        assert_eq!(drain.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_background_sync_is_silent() {
        let env = Env::new();
        let drain = Arc::new(CountingDrain {
            count: 0,
            calls: AtomicUsize::new(0),
        });
        let handle = WorkerHandle::spawn(Some(Arc::clone(&drain) as Arc<dyn PendingDrain>));
        handle.register(env.worker("v1.0.0")).await.unwrap();
        let mut events = handle.subscribe();

        handle
            .post(WorkerMessage::Sync {
                tag: BACKGROUND_SYNC_TAG.into(),
            })
            .await
            .unwrap();
        // Nothing sent: the channel stays empty once the drain has run.
        while drain.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
