use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Id;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Device-local key-value store (the browser's local storage equivalent).
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------- Memory ----------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }
}

// ---------------- File snapshot ----------------

/// JSON snapshot persisted on every write.
#[derive(Clone)]
pub struct FileStore {
    state: Arc<RwLock<HashMap<String, String>>>,
    path: Arc<PathBuf>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_from(&path);
        Self { state: Arc::new(RwLock::new(state)), path: Arc::new(path) }
    }

    fn load_from(path: &Path) -> HashMap<String, String> {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(s) => {
                    info!("loaded local store '{}'", path.display());
                    s
                }
                Err(e) => {
                    warn!("failed to parse local store '{}': {e}. Starting empty.", path.display());
                    HashMap::new()
                }
            },
            Err(e) => {
                debug!("no local store at '{}': {e}. Starting empty.", path.display());
                HashMap::new()
            }
        }
    }

    fn persist(&self, snapshot: &HashMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(&*self.path, bytes)?;
        Ok(())
    }

    fn lock_err() -> StoreError {
        StoreError::Unavailable("lock poisoned".into())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let s = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(s.get(key).cloned())
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut s = self.state.write().map_err(|_| Self::lock_err())?;
        s.insert(key.to_string(), value.to_string());
        self.persist(&s)
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut s = self.state.write().map_err(|_| Self::lock_err())?;
        if s.remove(key).is_some() {
            self.persist(&s)?;
        }
        Ok(())
    }
}

// ---------------- View counter ----------------

/// Views a theme should reach; detail pages show progress toward it.
pub const VIEW_GOAL: u64 = 725;

fn views_key(theme_id: &str) -> String {
    format!("theme_views_{theme_id}")
}

/// Per-device vanity counter; never leaves the device.
#[derive(Clone)]
pub struct ViewCounter {
    store: Arc<dyn LocalStore>,
}

impl ViewCounter {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Current count; 0 when the store is unavailable or the value is unreadable.
    pub fn views(&self, theme_id: &str) -> u64 {
        match self.store.get(&views_key(theme_id)) {
            Ok(Some(v)) => v.parse().unwrap_or_else(|_| {
                warn!(theme_id, "unreadable view counter, treating as 0");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!(theme_id, "local store unavailable: {e}");
                0
            }
        }
    }

    /// Count one visit and return the new total (0 if the store is unavailable).
    pub fn record_visit(&self, theme_id: &str) -> u64 {
        let key = views_key(theme_id);
        let current = match self.store.get(&key) {
            Ok(v) => v.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0),
            Err(e) => {
                warn!(theme_id, "local store unavailable: {e}");
                return 0;
            }
        };
        let next = current.saturating_add(1);
        if let Err(e) = self.store.set(&key, &next.to_string()) {
            warn!(theme_id, "failed to persist view counter: {e}");
            return 0;
        }
        next
    }
}

/// Integer percentage of [`VIEW_GOAL`], capped at 100.
pub fn goal_progress_percent(views: u64) -> u8 {
    (views.saturating_mul(100) / VIEW_GOAL).min(100) as u8
}

// ---------------- Session ----------------

const USER_ID_KEY: &str = "user_id";

/// Persists the resolved user id; the raw token is never written.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn LocalStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn user_id(&self) -> Option<Id> {
        match self.store.get(USER_ID_KEY) {
            Ok(v) => v.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!("local store unavailable: {e}");
                None
            }
        }
    }

    pub fn set_user_id(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.set(USER_ID_KEY, user_id)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(USER_ID_KEY)
    }
}
