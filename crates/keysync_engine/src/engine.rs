//! The engine root.

use crate::adapter::{BackendAdapter, Backends, Security};
use crate::attachment::Attachment;
use crate::broker::ChangeBroker;
use crate::config::EngineConfig;
use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Owns the backends, the change broker and the configuration shared by every
/// attachment created from it.
///
/// Create one per application scope. Attachments on the same key created
/// from the same root (or from roots sharing a broker) stay in sync.
///
/// # Example
///
/// ```rust
/// use keysync_engine::{Backends, KeySync, Security};
/// use keysync_storage::MemoryBackend;
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let sync = KeySync::new(Backends::browser(Arc::new(MemoryBackend::new())));
///
/// let view = sync.attach::<u32>("visits", Security::Standard);
/// view.ready().await;
/// view.set(1).await.unwrap();
///
/// assert_eq!(sync.read("visits", Security::Standard).await.unwrap().as_deref(), Some("1"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct KeySync {
    backends: Backends,
    broker: Arc<ChangeBroker>,
    config: EngineConfig,
}

impl KeySync {
    /// Creates a root with the default configuration and its own broker.
    pub fn new(backends: Backends) -> Self {
        Self::with_config(backends, EngineConfig::default())
    }

    /// Creates a root with the given configuration and its own broker.
    pub fn with_config(backends: Backends, config: EngineConfig) -> Self {
        Self::with_broker(backends, config, Arc::new(ChangeBroker::new()))
    }

    /// Creates a root that shares an existing broker.
    pub fn with_broker(backends: Backends, config: EngineConfig, broker: Arc<ChangeBroker>) -> Self {
        Self {
            backends,
            broker,
            config,
        }
    }

    /// The change broker.
    pub fn broker(&self) -> &Arc<ChangeBroker> {
        &self.broker
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured backends.
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    fn adapter(&self, security: Security) -> BackendAdapter {
        self.backends.adapter(security)
    }

    /// Starts observing `key`.
    ///
    /// The attachment subscribes to the broker and then loads the current
    /// value in the background; await [`Attachment::ready`] to wait for it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn attach<T>(&self, key: impl Into<String>, security: Security) -> Attachment<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Attachment::start(
            key.into(),
            security,
            self.adapter(security),
            Arc::clone(&self.broker),
            Arc::clone(&self.config.error_sink),
            self.config.cleanup_corrupt,
        )
    }

    /// Reads the raw value for `key` without attaching.
    pub async fn read(&self, key: &str, security: Security) -> StoreResult<Option<String>> {
        self.adapter(security).read(key).await
    }

    /// Writes a raw value and broadcasts it on success.
    pub async fn write(&self, key: &str, raw: &str, security: Security) -> StoreResult<()> {
        self.adapter(security).write(key, raw).await?;
        self.broker.publish(key, Some(raw));
        Ok(())
    }

    /// Erases `key` and broadcasts the deletion on success.
    pub async fn erase(&self, key: &str, security: Security) -> StoreResult<()> {
        self.adapter(security).erase(key).await?;
        self.broker.publish(key, None);
        Ok(())
    }

    /// Reads and parses the value for `key` without attaching.
    ///
    /// Unlike an attachment's load, a parse failure leaves the entry alone.
    pub async fn get<T>(&self, key: &str, security: Security) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.read(key, security).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::parse(key, e)),
            None => Ok(None),
        }
    }

    /// Serializes and writes `value`, or erases the key for `None`.
    pub async fn set<T>(&self, key: &str, value: Option<&T>, security: Security) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        match value {
            Some(value) => {
                let raw = serde_json::to_string(value).map_err(|e| StoreError::stringify(key, e))?;
                self.write(key, &raw, security).await
            }
            None => self.erase(key, security).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use keysync_storage::{KeyValueBackend, MemoryBackend};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    fn memory_root() -> (Arc<MemoryBackend>, Arc<MemoryBackend>, KeySync) {
        let general = Arc::new(MemoryBackend::new());
        let secure = Arc::new(MemoryBackend::new());
        let root = KeySync::new(Backends::native(general.clone(), secure.clone()));
        (general, secure, root)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_, _, root) = memory_root();

        root.set("pref", Some(&json!({"a": 1})), Security::Standard)
            .await
            .unwrap();
        let value: Option<Value> = root.get("pref", Security::Standard).await.unwrap();
        assert_eq!(value, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn erase_then_read() {
        let (_, _, root) = memory_root();

        root.write("k", r#""v""#, Security::Standard).await.unwrap();
        root.erase("k", Security::Standard).await.unwrap();
        assert_eq!(root.read("k", Security::Standard).await.unwrap(), None);
    }

    #[tokio::test]
    async fn security_routes_to_backend() {
        let (general, secure, root) = memory_root();

        root.write("token", "1", Security::Secure).await.unwrap();
        assert!(general.is_empty());
        assert_eq!(secure.get("token").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn one_shot_writes_broadcast() {
        let (_, _, root) = memory_root();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        root.broker().subscribe("k", move |raw| {
            log.lock().push(raw.map(str::to_string));
        });

        root.write("k", "1", Security::Standard).await.unwrap();
        root.erase("k", Security::Standard).await.unwrap();
        assert_eq!(*seen.lock(), vec![Some("1".to_string()), None]);
    }

    #[tokio::test]
    async fn get_reports_parse_errors_without_cleanup() {
        let general = Arc::new(MemoryBackend::with_entries([("k", "not-json")]));
        let root = KeySync::new(Backends::browser(general.clone()));

        let err = root.get::<Value>("k", Security::Standard).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(general.len(), 1);
    }

    #[tokio::test]
    async fn attach_uses_shared_broker() {
        let (_, _, root) = memory_root();
        let view = root.attach::<u32>("k", Security::Standard);
        assert_eq!(root.broker().listener_count("k"), 1);
        drop(view);
        assert_eq!(root.broker().listener_count("k"), 0);
    }
}
