//! Per-consumer attachments to a key.
//!
//! An [`Attachment`] is one consumer's live view of a key. It owns:
//! - the observable [`AttachmentState`], published through a `watch` channel
//! - a FIFO mutation queue drained by a dedicated worker task, so writes from
//!   one attachment reach the backend in call order
//! - an operation sequence used to decide whether a failed mutation may roll
//!   back, or has been superseded by a later one
//! - a broker subscription that applies committed changes from any source
//!
//! ## Protocol
//!
//! 1. Attach: subscribe to the broker, then read the initial value. Load
//!    results and broadcasts both overwrite state; whichever lands last wins.
//!    A corrupt entry is erased once the fault is visible.
//! 2. Mutate: bump the sequence, snapshot the previous value, apply the new
//!    value optimistically, then queue the backend write.
//! 3. Commit: on success publish the raw value to the broker. On failure
//!    report the fault, roll back only if no later mutation was issued, and
//!    return the fault to the caller.
//! 4. Detach: unsubscribe and stop writing state. Queued writes still run.

use crate::adapter::{BackendAdapter, Security};
use crate::broker::{ChangeBroker, ListenerId};
use crate::config::ErrorSink;
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::state::AttachmentState;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};

/// State shared between an attachment, its worker, and its broker listener.
struct Shared<T> {
    key: String,
    adapter: BackendAdapter,
    broker: Arc<ChangeBroker>,
    sink: Arc<dyn ErrorSink>,
    cleanup_corrupt: bool,
    state: watch::Sender<AttachmentState<T>>,
    /// Last issued mutation number. Held while deciding on rollback.
    sequence: Mutex<u64>,
    detached: AtomicBool,
}

/// A queued mutation.
struct Mutation<T> {
    op: u64,
    previous: Option<T>,
    value: Option<T>,
    reply: oneshot::Sender<StoreResult<()>>,
}

impl<T> Shared<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Applies `f` to the state unless the attachment has been detached.
    fn update(&self, f: impl FnOnce(&mut AttachmentState<T>)) {
        if self.detached.load(Ordering::Acquire) {
            return;
        }
        self.state.send_modify(f);
    }

    fn parse(&self, raw: &str) -> StoreResult<T> {
        serde_json::from_str(raw).map_err(|e| StoreError::parse(&self.key, e))
    }

    /// Reads the backend value and overwrites state with the outcome.
    ///
    /// An entry that fails to parse is erased after the fault is published.
    async fn load(self: Arc<Self>) {
        let (outcome, corrupt) = match self.adapter.read(&self.key).await {
            Ok(None) => (Ok(None), false),
            Ok(Some(raw)) => match self.parse(&raw) {
                Ok(value) => (Ok(Some(value)), false),
                Err(err) => (Err(err), true),
            },
            Err(err) => (Err(err), false),
        };

        if let Err(err) = &outcome {
            self.sink.report(err);
        }
        tracing::debug!(key = %self.key, ok = outcome.is_ok(), "load settled");

        self.update(move |state| {
            state.is_loading = false;
            match outcome {
                Ok(value) => state.set_ready(value),
                Err(err) => state.set_faulted(err),
            }
        });

        if corrupt && self.cleanup_corrupt {
            self.discard_corrupt().await;
        }
    }

    /// Best-effort removal of an entry that failed to parse.
    async fn discard_corrupt(&self) {
        match self.adapter.erase(&self.key).await {
            Ok(()) => tracing::debug!(key = %self.key, "erased corrupt entry"),
            Err(err) => tracing::debug!(key = %self.key, error = %err, "corrupt entry left in place"),
        }
    }

    /// Handles a committed change delivered by the broker.
    fn apply_broadcast(&self, raw: Option<&str>) {
        tracing::trace!(key = %self.key, deleted = raw.is_none(), "broadcast received");
        match raw.map(|raw| self.parse(raw)).transpose() {
            Ok(value) => self.update(|state| state.set_ready(value)),
            Err(err) => {
                self.sink.report(&err);
                self.update(|state| state.set_faulted(err));
            }
        }
    }

    /// Writes or erases the value, then publishes it.
    async fn persist(&self, value: Option<&T>) -> StoreResult<()> {
        match value {
            Some(value) => {
                let raw = serde_json::to_string(value)
                    .map_err(|e| StoreError::stringify(&self.key, e))?;
                self.adapter.write(&self.key, &raw).await?;
                self.broker.publish(&self.key, Some(&raw));
            }
            None => {
                self.adapter.erase(&self.key).await?;
                self.broker.publish(&self.key, None);
            }
        }
        Ok(())
    }

    /// Runs one queued mutation to completion.
    async fn commit(&self, job: Mutation<T>) {
        let Mutation {
            op,
            previous,
            value,
            reply,
        } = job;

        let result = self.persist(value.as_ref()).await;
        if let Err(err) = &result {
            self.sink.report(err);
            let sequence = self.sequence.lock();
            let superseded = *sequence != op;
            tracing::debug!(key = %self.key, op, superseded, "mutation failed");
            self.update(|state| {
                if !superseded {
                    state.value = previous;
                }
                state.error = Some(err.clone());
            });
        }

        // The caller may have dropped the pending mutation.
        let _ = reply.send(result);
    }
}

/// Drains the mutation queue one job at a time.
///
/// Exits once the owning [`Attachment`] is dropped and every queued job has
/// settled.
async fn run_queue<T>(shared: Arc<Shared<T>>, mut jobs: mpsc::UnboundedReceiver<Mutation<T>>)
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    while let Some(job) = jobs.recv().await {
        shared.commit(job).await;
    }
    tracing::debug!(key = %shared.key, "mutation queue closed");
}

/// One consumer's live view of a key.
///
/// Created by [`KeySync::attach`](crate::KeySync::attach). Dropping the
/// attachment detaches it.
pub struct Attachment<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
    queue: mpsc::UnboundedSender<Mutation<T>>,
    listener: ListenerId,
    security: Security,
}

impl<T> Attachment<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Subscribes to the broker, then starts the worker and initial load.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub(crate) fn start(
        key: String,
        security: Security,
        adapter: BackendAdapter,
        broker: Arc<ChangeBroker>,
        sink: Arc<dyn ErrorSink>,
        cleanup_corrupt: bool,
    ) -> Self {
        let (state, _) = watch::channel(AttachmentState::loading());
        let shared = Arc::new(Shared {
            key,
            adapter,
            broker: Arc::clone(&broker),
            sink,
            cleanup_corrupt,
            state,
            sequence: Mutex::new(0),
            detached: AtomicBool::new(false),
        });

        // Subscribe before the first read so no committed write is missed.
        let weak = Arc::downgrade(&shared);
        let listener = broker.subscribe(&shared.key, move |raw| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_broadcast(raw);
            }
        });

        let (queue, jobs) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(Arc::clone(&shared), jobs));
        tokio::spawn(Arc::clone(&shared).load());

        tracing::debug!(
            key = %shared.key,
            backend = shared.adapter.backend_name(),
            "attached"
        );

        Self {
            shared,
            queue,
            listener,
            security,
        }
    }

    /// The attached key.
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// The security level the backend was selected with.
    pub fn security(&self) -> Security {
        self.security
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> AttachmentState<T> {
        self.shared.state.borrow().clone()
    }

    /// A receiver notified whenever the state changes.
    pub fn watch(&self) -> watch::Receiver<AttachmentState<T>> {
        self.shared.state.subscribe()
    }

    /// Waits until the initial load has settled and returns the state.
    ///
    /// Returns immediately with the current state if the attachment is
    /// detached.
    pub async fn ready(&self) -> AttachmentState<T> {
        let detached = &self.shared.detached;
        let mut rx = self.watch();
        let settled = rx
            .wait_for(|state| !state.is_loading || detached.load(Ordering::Acquire))
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Number of mutations issued on this attachment.
    pub fn operation_sequence(&self) -> u64 {
        *self.shared.sequence.lock()
    }

    /// Sets (`Some`) or removes (`None`) the value.
    ///
    /// The new value is visible in [`state`](Self::state) before this
    /// returns. The backend write is queued behind any earlier mutations on
    /// this attachment; await the returned [`PendingMutation`] for its
    /// outcome. Dropping it does not cancel the write.
    pub fn mutate(&self, value: Option<T>) -> PendingMutation {
        let (reply, rx) = oneshot::channel();

        let job = {
            let mut sequence = self.shared.sequence.lock();
            *sequence += 1;
            let op = *sequence;
            let previous = self.shared.state.borrow().value.clone();
            let optimistic = value.clone();
            self.shared.update(|state| state.set_ready(optimistic));
            Mutation {
                op,
                previous,
                value,
                reply,
            }
        };

        if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
            let _ = job.reply.send(Err(StoreError::new(
                ErrorKind::Other,
                self.key(),
                "mutation worker is not running",
            )));
        }

        PendingMutation {
            key: self.key().to_string(),
            rx,
        }
    }

    /// Shorthand for `mutate(Some(value))`.
    pub fn set(&self, value: T) -> PendingMutation {
        self.mutate(Some(value))
    }

    /// Shorthand for `mutate(None)`.
    pub fn remove(&self) -> PendingMutation {
        self.mutate(None)
    }

    /// Re-reads the backend value, applying the same rules as the initial
    /// load.
    pub async fn refresh(&self) {
        Arc::clone(&self.shared).load().await;
    }

    /// Unsubscribes from the broker and freezes the state.
    ///
    /// Queued mutations keep running against the backend and still resolve
    /// their [`PendingMutation`]s. Calling this more than once is harmless.
    pub fn detach(&self) {
        if self.shared.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.broker.unsubscribe(&self.shared.key, self.listener);
        // Wake anyone blocked in `ready`.
        self.shared.state.send_modify(|_| {});
        tracing::debug!(key = %self.shared.key, "detached");
    }

    /// Returns true once [`detach`](Self::detach) has been called.
    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::Acquire)
    }
}

impl<T> Drop for Attachment<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> fmt::Debug for Attachment<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("key", &self.shared.key)
            .field("security", &self.security)
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

/// Outcome of a queued mutation.
///
/// Resolves once the backend write (or erase) and broadcast have settled.
#[derive(Debug)]
pub struct PendingMutation {
    key: String,
    rx: oneshot::Receiver<StoreResult<()>>,
}

impl Future for PendingMutation {
    type Output = StoreResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StoreError::new(
                ErrorKind::Other,
                this.key.clone(),
                "mutation dropped before completing",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use keysync_storage::{KeyValueBackend, MemoryBackend};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u32,
    }

    fn start(backend: Arc<MemoryBackend>, broker: Arc<ChangeBroker>) -> Attachment<Counter> {
        Attachment::start(
            "counter".to_string(),
            Security::Standard,
            BackendAdapter::new(backend),
            broker,
            Arc::new(crate::config::TracingSink),
            true,
        )
    }

    #[tokio::test]
    async fn initial_load_of_absent_key() {
        let attachment = start(Arc::new(MemoryBackend::new()), Arc::new(ChangeBroker::new()));

        let state = attachment.ready().await;
        assert!(!state.is_loading);
        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.value, None);
    }

    #[tokio::test]
    async fn initial_load_of_stored_value() {
        let backend = Arc::new(MemoryBackend::with_entries([("counter", r#"{"n":7}"#)]));
        let attachment = start(backend, Arc::new(ChangeBroker::new()));

        let state = attachment.ready().await;
        assert_eq!(state.value, Some(Counter { n: 7 }));
    }

    #[tokio::test]
    async fn mutate_is_visible_before_commit() {
        let backend = Arc::new(MemoryBackend::new());
        let attachment = start(Arc::clone(&backend), Arc::new(ChangeBroker::new()));
        attachment.ready().await;

        let pending = attachment.set(Counter { n: 1 });
        assert_eq!(attachment.state().value, Some(Counter { n: 1 }));
        assert_eq!(attachment.operation_sequence(), 1);

        pending.await.unwrap();
        assert_eq!(
            backend.get("counter").await.unwrap().as_deref(),
            Some(r#"{"n":1}"#)
        );
    }

    #[tokio::test]
    async fn remove_erases_and_clears() {
        let backend = Arc::new(MemoryBackend::with_entries([("counter", r#"{"n":2}"#)]));
        let attachment = start(Arc::clone(&backend), Arc::new(ChangeBroker::new()));
        attachment.ready().await;

        attachment.remove().await.unwrap();
        assert_eq!(attachment.state().value, None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn detach_unsubscribes() {
        let broker = Arc::new(ChangeBroker::new());
        let attachment = start(Arc::new(MemoryBackend::new()), Arc::clone(&broker));
        assert_eq!(broker.listener_count("counter"), 1);

        attachment.detach();
        attachment.detach();
        assert!(attachment.is_detached());
        assert_eq!(broker.key_count(), 0);
    }

    #[tokio::test]
    async fn drop_detaches() {
        let broker = Arc::new(ChangeBroker::new());
        {
            let _attachment = start(Arc::new(MemoryBackend::new()), Arc::clone(&broker));
            assert_eq!(broker.listener_count("counter"), 1);
        }
        assert_eq!(broker.listener_count("counter"), 0);
    }

    #[tokio::test]
    async fn refresh_picks_up_external_write() {
        let backend = Arc::new(MemoryBackend::new());
        let attachment = start(Arc::clone(&backend), Arc::new(ChangeBroker::new()));
        attachment.ready().await;

        // Written behind the engine's back, so no broadcast.
        backend.set("counter", r#"{"n":9}"#).await.unwrap();
        assert_eq!(attachment.state().value, None);

        attachment.refresh().await;
        assert_eq!(attachment.state().value, Some(Counter { n: 9 }));
    }
}
