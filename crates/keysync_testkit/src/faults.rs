//! Fault-injecting backend.
//!
//! [`FlakyBackend`] wraps a [`MemoryBackend`] and adds what engine tests need
//! that a real store can't provide on demand:
//! - an ordered log of every operation that reached the store
//! - scripted faults, by operation, key or written value
//! - gates that park reads, or writes and removals, until the test releases
//!   them

use async_trait::async_trait;
use keysync_storage::{BackendError, BackendResult, KeyValueBackend, MemoryBackend};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Kind of backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `get`
    Get,
    /// `set`
    Set,
    /// `remove`
    Remove,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpKind::Get => "get",
            OpKind::Set => "set",
            OpKind::Remove => "remove",
        })
    }
}

/// One operation as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    /// A read of the key.
    Get(String),
    /// A write of the key with the raw value.
    Set(String, String),
    /// A removal of the key.
    Remove(String),
}

impl BackendOp {
    /// The operation kind.
    pub fn kind(&self) -> OpKind {
        match self {
            BackendOp::Get(_) => OpKind::Get,
            BackendOp::Set(..) => OpKind::Set,
            BackendOp::Remove(_) => OpKind::Remove,
        }
    }

    /// The targeted key.
    pub fn key(&self) -> &str {
        match self {
            BackendOp::Get(key) | BackendOp::Set(key, _) | BackendOp::Remove(key) => key,
        }
    }
}

#[derive(Debug, Clone)]
struct FaultRule {
    op: OpKind,
    key: Option<String>,
    value: Option<String>,
    /// `None` means the rule never expires.
    remaining: Option<usize>,
}

impl FaultRule {
    fn matches(&self, op: &BackendOp) -> bool {
        if self.op != op.kind() || self.remaining == Some(0) {
            return false;
        }
        if self.key.as_deref().is_some_and(|k| k != op.key()) {
            return false;
        }
        match (&self.value, op) {
            (Some(expected), BackendOp::Set(_, value)) => expected == value,
            (Some(_), _) => false,
            (None, _) => true,
        }
    }
}

/// A memory backend with scripted faults, an operation log and read and write gates.
///
/// # Example
///
/// ```rust
/// use keysync_testkit::{FlakyBackend, OpKind};
///
/// let backend = FlakyBackend::new();
/// backend.fail_next(OpKind::Set, 1);
/// backend.fail_sets_with(r#"{"n":13}"#);
/// ```
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    log: Mutex<Vec<BackendOp>>,
    faults: Mutex<Vec<FaultRule>>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FlakyBackend {
    /// Creates an empty backend with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with entries.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: MemoryBackend::with_entries(entries),
            ..Self::default()
        }
    }

    /// The wrapped store, for inspecting or seeding without logging.
    pub fn store(&self) -> &MemoryBackend {
        &self.inner
    }

    /// The raw value currently stored under `key`.
    pub fn stored(&self, key: &str) -> Option<String> {
        self.inner.snapshot().remove(key)
    }

    /// Every operation that reached the store, in execution order.
    pub fn log(&self) -> Vec<BackendOp> {
        self.log.lock().clone()
    }

    /// Raw values written to `key`, in execution order.
    pub fn writes_to(&self, key: &str) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|op| match op {
                BackendOp::Set(k, v) if k == key => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of logged operations of `kind` on `key`.
    pub fn count(&self, kind: OpKind, key: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|op| op.kind() == kind && op.key() == key)
            .count()
    }

    /// Clears the operation log.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Fails the next `count` operations of `kind`.
    pub fn fail_next(&self, kind: OpKind, count: usize) {
        self.push_rule(FaultRule {
            op: kind,
            key: None,
            value: None,
            remaining: Some(count),
        });
    }

    /// Fails every operation of `kind`.
    pub fn fail_always(&self, kind: OpKind) {
        self.push_rule(FaultRule {
            op: kind,
            key: None,
            value: None,
            remaining: None,
        });
    }

    /// Fails every operation of `kind` on `key`.
    pub fn fail_key(&self, kind: OpKind, key: &str) {
        self.push_rule(FaultRule {
            op: kind,
            key: Some(key.to_string()),
            value: None,
            remaining: None,
        });
    }

    /// Fails every write whose raw value is exactly `value`.
    pub fn fail_sets_with(&self, value: &str) {
        self.push_rule(FaultRule {
            op: OpKind::Set,
            key: None,
            value: Some(value.to_string()),
            remaining: None,
        });
    }

    /// Removes all fault rules.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn push_rule(&self, rule: FaultRule) {
        self.faults.lock().push(rule);
    }

    /// Parks every subsequent write and removal until released.
    pub fn hold_writes(&self) {
        *self.write_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` parked (or future) writes and removals through.
    pub fn release_writes(&self, count: usize) {
        if let Some(gate) = self.write_gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    /// Removes the write gate and lets everything through.
    pub fn open_writes(&self) {
        open(&self.write_gate);
    }

    /// Parks every subsequent read until released.
    ///
    /// A parked read has already taken its value, so writes made while it
    /// waits are not visible in its result.
    pub fn hold_reads(&self) {
        *self.read_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` parked (or future) reads through.
    pub fn release_reads(&self, count: usize) {
        if let Some(gate) = self.read_gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    /// Removes the read gate and lets everything through.
    pub fn open_reads(&self) {
        open(&self.read_gate);
    }

    /// Logs `op` and applies the first matching fault rule.
    fn admit(&self, op: BackendOp) -> BackendResult<()> {
        let kind = op.kind();
        let mut faults = self.faults.lock();
        let hit = faults.iter_mut().find(|rule| rule.matches(&op));
        let result = match hit {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(BackendError::Unavailable(format!(
                    "injected {kind} fault for `{}`",
                    op.key()
                )))
            }
            None => Ok(()),
        };
        self.log.lock().push(op);
        result
    }
}

fn open(slot: &Mutex<Option<Arc<Semaphore>>>) {
    if let Some(gate) = slot.lock().take() {
        gate.close();
    }
}

async fn pass(slot: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = slot.lock().clone();
    if let Some(gate) = gate {
        // A closed gate lets everyone through.
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl KeyValueBackend for FlakyBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.admit(BackendOp::Get(key.to_string()))?;
        let value = self.inner.get(key).await;
        // A held read resolves with the value stored when it was issued.
        pass(&self.read_gate).await;
        value
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        pass(&self.write_gate).await;
        self.admit(BackendOp::Set(key.to_string(), value.to_string()))?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        pass(&self.write_gate).await;
        self.admit(BackendOp::Remove(key.to_string()))?;
        self.inner.remove(key).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

impl fmt::Debug for FlakyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakyBackend")
            .field("entries", &self.inner.len())
            .field("logged", &self.log.lock().len())
            .field("faults", &self.faults.lock().len())
            .finish()
    }
}
