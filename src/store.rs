//! Seams towards the host: the datapoint store and the background task facility.
//! Includes an in-memory store and a tokio-backed submitter for hosts without their own.

use crate::datapoint::{DpId, DpType, DpValue};
use crate::error::{Result, TimerError};
use futures_util::future::BoxFuture;
use log::{debug, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cached datapoint values of one device plus the way to change them.
pub trait DatapointStore: Send + Sync {
    /// Current cached value, or `None` when the device has not reported it yet.
    fn read(&self, id: DpId) -> Option<DpValue>;

    /// Sends a new value to the device. Completion is reported through the future only.
    fn write(&self, id: DpId, value: DpValue) -> BoxFuture<'static, Result<()>>;
}

/// Runs a future in the background without the caller waiting on it.
pub trait TaskSubmitter: Send + Sync {
    fn submit(&self, task: BoxFuture<'static, ()>);
}

/// Submits tasks onto a tokio runtime.
#[derive(Clone)]
pub struct TokioSubmitter {
    handle: tokio::runtime::Handle,
}

impl TokioSubmitter {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime of the calling context, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl TaskSubmitter for TokioSubmitter {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

struct MemoryState {
    values: HashMap<DpId, DpValue>,
    reject_writes: Option<String>,
}

/// Datapoint store kept entirely in memory.
///
/// Writes are applied immediately when the returned future runs and are
/// broadcast to subscribers as `(id, value)` pairs.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    update_tx: broadcast::Sender<(DpId, DpValue)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                values: HashMap::new(),
                reject_writes: None,
            })),
            update_tx,
        }
    }

    /// Stores a value as if the device had reported it.
    pub fn insert(&self, id: DpId, value: DpValue) {
        self.state.write().values.insert(id, value);
    }

    pub fn remove(&self, id: DpId) -> Option<DpValue> {
        self.state.write().values.remove(&id)
    }

    /// Makes every following write fail with the given reason, or succeed again with `None`.
    pub fn reject_writes(&self, reason: Option<&str>) {
        self.state.write().reject_writes = reason.map(str::to_string);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(DpId, DpValue)> {
        self.update_tx.subscribe()
    }

    /// Applies a Tuya JSON `dps` object such as `{"17": "AQEBpA..."}`.
    ///
    /// `kinds` declares the type of each known id; unknown ids are skipped.
    /// Returns the number of datapoints stored.
    pub fn apply_dps(&self, dps: &Value, kinds: &[(DpId, DpType)]) -> Result<usize> {
        let object = dps.as_object().ok_or_else(|| TimerError::TypeMismatch {
            expected: "object",
            found: dps.to_string(),
        })?;

        let mut parsed = Vec::with_capacity(object.len());
        for (key, raw) in object {
            let Ok(id) = key.parse::<DpId>() else {
                warn!("Skipping non-numeric datapoint key '{}'", key);
                continue;
            };
            let Some((_, kind)) = kinds.iter().find(|(known, _)| *known == id) else {
                debug!("Skipping undeclared datapoint {}", id);
                continue;
            };
            parsed.push((id, DpValue::from_json(*kind, raw)?));
        }

        let count = parsed.len();
        let mut state = self.state.write();
        for (id, value) in parsed {
            state.values.insert(id, value.clone());
            let _ = self.update_tx.send((id, value));
        }
        Ok(count)
    }
}

impl DatapointStore for MemoryStore {
    fn read(&self, id: DpId) -> Option<DpValue> {
        self.state.read().values.get(&id).cloned()
    }

    fn write(&self, id: DpId, value: DpValue) -> BoxFuture<'static, Result<()>> {
        let state = self.state.clone();
        let update_tx = self.update_tx.clone();
        Box::pin(async move {
            {
                let mut guard = state.write();
                if let Some(reason) = &guard.reject_writes {
                    return Err(TimerError::WriteFailed(reason.clone()));
                }
                guard.values.insert(id, value.clone());
            }
            debug!("Datapoint {} set to {}", id, value);
            let _ = update_tx.send((id, value));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn writes_become_readable_and_broadcast() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        assert_eq!(store.read(17), None);

        store.write(17, DpValue::Raw(vec![1, 2, 3])).await.unwrap();
        assert_eq!(store.read(17), Some(DpValue::Raw(vec![1, 2, 3])));
        assert_eq!(rx.recv().await.unwrap(), (17, DpValue::Raw(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn rejected_writes_leave_value_untouched() {
        let store = MemoryStore::new();
        store.insert(1, DpValue::Bool(false));
        store.reject_writes(Some("link lost"));

        let err = store.write(1, DpValue::Bool(true)).await.unwrap_err();
        assert_eq!(err, TimerError::WriteFailed("link lost".into()));
        assert_eq!(store.read(1), Some(DpValue::Bool(false)));

        store.reject_writes(None);
        store.write(1, DpValue::Bool(true)).await.unwrap();
        assert_eq!(store.read(1), Some(DpValue::Bool(true)));
    }

    #[test]
    fn writes_are_lazy_until_polled() {
        let store = MemoryStore::new();
        let pending = store.write(3, DpValue::Value(10));
        assert_eq!(store.read(3), None);
        drop(pending);
        assert_eq!(store.read(3), None);
    }

    #[test]
    fn applies_declared_dps_only() {
        let store = MemoryStore::new();
        let count = store
            .apply_dps(
                &json!({"1": true, "17": "AQEBpAAeKmQBB+kGFAE=", "99": 5, "x": 1}),
                &[(1, DpType::Bool), (17, DpType::Raw)],
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.read(1), Some(DpValue::Bool(true)));
        assert_eq!(
            store.read(17),
            Some(DpValue::Raw(vec![
                0x01, 0x01, 0x01, 0xA4, 0x00, 0x1E, 0x2A, 0x64, 0x01, 0x07, 0xE9, 0x06, 0x14, 0x01
            ]))
        );
        assert_eq!(store.read(99), None);
    }

    #[test]
    fn malformed_dps_are_rejected_whole() {
        let store = MemoryStore::new();
        assert!(store.apply_dps(&json!([1, 2]), &[]).is_err());
        let err = store
            .apply_dps(&json!({"1": true, "2": "nope"}), &[(1, DpType::Bool), (2, DpType::Value)])
            .unwrap_err();
        assert!(matches!(err, TimerError::TypeMismatch { .. }));
        assert_eq!(store.read(1), None);
    }

    #[tokio::test]
    async fn tokio_submitter_runs_tasks() {
        let submitter = TokioSubmitter::current().expect("inside runtime");
        let (tx, rx) = tokio::sync::oneshot::channel();
        submitter.submit(Box::pin(async move {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
