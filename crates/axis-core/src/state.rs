//! Workflow state document shared between independently invoked steps
//!
//! Each step runs in its own process, so the only hand-off is this small JSON
//! document: `{ "ip_address", "username", "password", "error" }`. Storage is
//! behind [`StateStore`] so steps can run against a file in production and an
//! in-memory store in tests.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};
use crate::identity::Credentials;

/// Default location of the state document
pub const DEFAULT_STATE_FILE: &str = "/tmp/state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    /// Fresh document written by discovery
    pub fn discovered(ip_address: Ipv4Addr) -> Self {
        Self {
            ip_address: Some(ip_address),
            ..Self::default()
        }
    }

    pub fn require_ip_address(&self) -> Result<Ipv4Addr> {
        self.ip_address
            .ok_or_else(|| ProvisionError::State("state document has no ip_address".to_string()))
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    pub fn require_credentials(&self) -> Result<Credentials> {
        self.credentials().ok_or_else(|| {
            ProvisionError::State("state document has no username/password".to_string())
        })
    }

    pub fn set_credentials(&mut self, credentials: &Credentials) {
        self.username = Some(credentials.username.clone());
        self.password = Some(credentials.password.clone());
    }

    /// Merge `other` into `self`. Fields absent from `other` are kept, so a
    /// later step never drops what an earlier one wrote.
    pub fn merge(&mut self, other: WorkflowState) {
        if other.ip_address.is_some() {
            self.ip_address = other.ip_address;
        }
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.error.is_some() {
            self.error = other.error;
        }
    }
}

/// Persistence backend for the state document.
///
/// `load` fails when the document is absent or corrupt; callers decide how to
/// handle that. `save` overwrites.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<WorkflowState>;
    fn save(&self, state: &WorkflowState) -> Result<()>;
}

/// File-backed store used by the workflow binary
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<WorkflowState> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ProvisionError::State(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let state = serde_json::from_str(&content).map_err(|e| {
            ProvisionError::State(format!("corrupt state document {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "Loaded workflow state");
        Ok(state)
    }

    fn save(&self, state: &WorkflowState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(state)?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "Saved workflow state");
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<WorkflowState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WorkflowState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Current document, if any was saved
    pub fn snapshot(&self) -> Option<WorkflowState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<WorkflowState> {
        self.state
            .lock()
            .map_err(|_| ProvisionError::State("state lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| ProvisionError::State("no workflow state saved".to_string()))
    }

    fn save(&self, state: &WorkflowState) -> Result<()> {
        *self
            .state
            .lock()
            .map_err(|_| ProvisionError::State("state lock poisoned".to_string()))? =
            Some(state.clone());
        Ok(())
    }
}

/// Merge a step failure into whatever state already exists and persist it.
///
/// An absent or unreadable document is replaced by one holding only the error,
/// since the failure report matters more than the lost fields at that point.
pub fn record_failure(store: &dyn StateStore, step: &str, error: &ProvisionError) -> Result<()> {
    let mut state = match store.load() {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "No readable workflow state, recording failure into a new document");
            WorkflowState::default()
        }
    };
    state.error = Some(format!(
        "AXIS {} step failed.\nerror: {}",
        step,
        error.chain()
    ));
    store.save(&state)
}
