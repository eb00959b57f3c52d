use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::Backend;
use crate::error::{ApiError, ApiResult};
use crate::models::{ContentKind, FavoriteSet};

/// The user's favorite folders, themes and files, kept in step with the server.
///
/// Toggles are serialized: each one finishes with a full resync before the
/// next starts, so back-to-back toggles converge on the server state.
#[derive(Clone)]
pub struct Favorites {
    backend: Arc<dyn Backend>,
    user_id: String,
    set: Arc<RwLock<FavoriteSet>>,
    pipeline: Arc<Mutex<()>>,
}

impl Favorites {
    pub fn new(backend: Arc<dyn Backend>, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
            set: Arc::new(RwLock::new(FavoriteSet::default())),
            pipeline: Arc::new(Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> FavoriteSet {
        self.set.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn contains(&self, kind: ContentKind, id: &str) -> bool {
        self.set.read().map(|s| s.contains(kind, id)).unwrap_or(false)
    }

    fn replace(&self, fresh: FavoriteSet) {
        match self.set.write() {
            Ok(mut s) => *s = fresh,
            Err(p) => *p.into_inner() = fresh,
        }
    }

    /// Refetch all three sets from the server.
    pub async fn sync(&self) -> ApiResult<FavoriteSet> {
        let _guard = self.pipeline.lock().await;
        self.sync_locked().await
    }

    async fn sync_locked(&self) -> ApiResult<FavoriteSet> {
        let fresh = self.backend.favorites_by_user(&self.user_id).await?;
        self.replace(fresh.clone());
        Ok(fresh)
    }

    /// Add when absent, remove when present. Returns the new membership.
    pub async fn toggle(&self, kind: ContentKind, id: &str) -> ApiResult<bool> {
        let _guard = self.pipeline.lock().await;
        let was_member = self.contains(kind, id);
        let outcome = if was_member {
            self.backend.remove_favorite(kind, &self.user_id, id).await
        } else {
            match self.backend.add_favorite(kind, &self.user_id, id).await {
                // already favorited server-side: idempotent add
                Err(ApiError::Conflict) => {
                    debug!(kind = kind.noun(), id, "favorite already present");
                    Ok(())
                }
                other => other,
            }
        };
        match outcome {
            Ok(()) => {
                if let Ok(mut s) = self.set.write() {
                    if was_member {
                        s.ids_mut(kind).remove(id);
                    } else {
                        s.ids_mut(kind).insert(id.to_string());
                    }
                }
            }
            Err(e) => {
                warn!(kind = kind.noun(), id, "favorite toggle failed: {e}");
                // reconcile before surfacing the error
                let _ = self.sync_locked().await;
                return Err(e);
            }
        }
        let fresh = self.sync_locked().await?;
        Ok(fresh.contains(kind, id))
    }
}
