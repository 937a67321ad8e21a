//! Key-value channel: one entry per field in a fixed namespace polled by the
//! microscope macro.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dystrack_core::{ChannelKind, TransmissionAttempt};

use crate::error::TransmitError;
use crate::transmit::Transmitter;

/// Namespace the vendor macro polls for new coordinates.
pub const REGISTRY_NAMESPACE: &str =
    r"SOFTWARE\VB and VBA Program Settings\OnlineImageAnalysis\macro";

pub const FIELD_ACTION: &str = "codeMic";
pub const FIELD_ERROR: &str = "errorMsg";

/// Writable string store backing the key-value channel.
pub trait KeyValueStore: Send {
    fn namespace(&self) -> &str;

    fn write(&mut self, name: &str, value: &str) -> std::io::Result<()>;
}

// ─── In-memory store ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, String>,
    log: Vec<(String, String)>,
}

/// Shared in-process store. Clones see the same entries, so a host can keep
/// one handle while the transmitter owns another.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    namespace: String,
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            namespace: REGISTRY_NAMESPACE.to_string(),
            inner: Arc::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.values.get(name).cloned())
    }

    /// Every write so far, in order.
    pub fn write_log(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .map(|inner| inner.log.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn write(&mut self, name: &str, value: &str) -> std::io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))?;
        inner.values.insert(name.to_string(), value.to_string());
        inner.log.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

// ─── Directory store ──────────────────────────────────────────────

/// One file per field under `root`. Each write lands atomically via a
/// temp file in the same directory followed by a rename.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    namespace: String,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let namespace = root.display().to_string();
        Ok(Self { root, namespace })
    }

    pub fn read(&self, name: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.root.join(name))
    }
}

impl KeyValueStore for DirectoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn write(&mut self, name: &str, value: &str) -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.root.join(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

// ─── Transmitter ─────────────────────────────────────────────────

/// Writes `Z`, `Y`, `X` (present axes only), then `errorMsg`, then
/// `codeMic`. The action token is always written last.
#[derive(Debug)]
pub struct KeyValueTransmitter<S> {
    store: S,
}

impl<S: KeyValueStore> KeyValueTransmitter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: KeyValueStore> Transmitter for KeyValueTransmitter<S> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::KeyValue
    }

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
        let mut fields: Vec<(&str, String)> = attempt
            .position
            .axes()
            .into_iter()
            .filter_map(|(axis, v)| v.map(|v| (axis.as_str(), v.to_string())))
            .collect();
        if let Some(msg) = &attempt.message {
            fields.push((FIELD_ERROR, msg.clone()));
        }
        fields.push((FIELD_ACTION, attempt.action.as_str().to_string()));

        // Attempt every field; report the first failure.
        let mut first_err = None;
        for (name, value) in &fields {
            if let Err(e) = self.store.write(name, value) {
                tracing::debug!(field = *name, error = %e, "key-value write failed");
                first_err.get_or_insert(TransmitError::Store {
                    namespace: self.store.namespace().to_string(),
                    name: name.to_string(),
                    detail: e.to_string(),
                });
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
