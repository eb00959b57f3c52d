//! Soft-delete lifecycle: listing, selection, restore and purge.
//!
//! The listing is an audit trail: every trash record is shown, even when the
//! entity behind it can no longer be fetched.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::{fetch_trashed_content, trash_entity, Backend};
use crate::error::{ApiError, ApiResult, KbError, KbResult};
use crate::models::{Content, ContentKind, EntityRef, Id, TrashRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrashEntry {
    pub record: TrashRecord,
    /// `None` when the joined entity could not be fetched.
    pub content: Option<Content>,
}

impl TrashEntry {
    pub fn display_name(&self) -> String {
        match &self.content {
            Some(c) => c.display_name().to_string(),
            None => placeholder_name(self.record.content_type).to_string(),
        }
    }

    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        self.record.days_until_purge(now)
    }
}

fn placeholder_name(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Folder => "Unnamed folder",
        ContentKind::Theme => "Untitled theme",
        ContentKind::File => "Unnamed file",
    }
}

/// Explicit user consent for an irreversible purge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Confirmation {
    Single { record_id: Id, message: String },
    Selected { record_ids: BTreeSet<Id>, message: String },
    EmptyAll { record_ids: BTreeSet<Id>, message: String },
}

impl Confirmation {
    pub fn message(&self) -> &str {
        match self {
            Confirmation::Single { message, .. }
            | Confirmation::Selected { message, .. }
            | Confirmation::EmptyAll { message, .. } => message,
        }
    }
}

/// Per-record result of a batch operation.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<Id>,
    pub failed: Vec<(Id, String)>,
}

impl BatchOutcome {
    fn collect(results: Vec<(Id, ApiResult<()>)>) -> Self {
        let mut out = BatchOutcome::default();
        for (id, r) in results {
            match r {
                Ok(()) => out.succeeded.push(id),
                Err(e) => {
                    warn!(record = %id, "trash batch item failed: {e}");
                    out.failed.push((id, e.to_string()));
                }
            }
        }
        out
    }
}

pub struct Trash {
    backend: Arc<dyn Backend>,
    user_id: String,
    entries: Vec<TrashEntry>,
    selection: BTreeSet<Id>,
}

impl Trash {
    pub fn new(backend: Arc<dyn Backend>, user_id: impl Into<String>) -> Self {
        Self { backend, user_id: user_id.into(), entries: Vec::new(), selection: BTreeSet::new() }
    }

    pub fn entries(&self) -> &[TrashEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, record_id: &str) -> Option<&TrashEntry> {
        self.entries.iter().find(|e| e.record.id == record_id)
    }

    /// Record id of the trashed entity, if it is currently in the trash.
    pub fn record_for(&self, entity: &EntityRef) -> Option<&Id> {
        self.entries
            .iter()
            .find(|e| e.record.content_type == entity.kind && e.record.original_id == entity.id)
            .map(|e| &e.record.id)
    }

    fn record_ids(&self) -> BTreeSet<Id> {
        self.entries.iter().map(|e| e.record.id.clone()).collect()
    }

    /// Reload the authoritative list and join each record to its entity.
    pub async fn reload(&mut self) -> ApiResult<usize> {
        let records = self.backend.list_trash(&self.user_id).await?;
        let backend = self.backend.as_ref();
        let joined = join_all(records.iter().map(|r| fetch_trashed_content(backend, r))).await;
        self.entries = records
            .into_iter()
            .zip(joined)
            .map(|(record, content)| {
                let content = content
                    .map_err(|e| warn!(record = %record.id, "trash join failed, using placeholder: {e}"))
                    .ok();
                TrashEntry { record, content }
            })
            .collect();
        let live = self.record_ids();
        self.selection.retain(|id| live.contains(id));
        Ok(self.entries.len())
    }

    /// Soft-delete an entity, then refresh the trash listing.
    pub async fn move_to_trash(&mut self, entity: &EntityRef) -> ApiResult<TrashRecord> {
        let record = trash_entity(self.backend.as_ref(), entity, &self.user_id).await?;
        info!(kind = entity.kind.noun(), id = %entity.id, trash = %record.id, "moved to trash");
        if let Err(e) = self.reload().await {
            warn!("trash reload after delete failed: {e}");
        }
        Ok(record)
    }

    pub async fn restore(&mut self, record_id: &str) -> ApiResult<()> {
        self.backend.restore(record_id).await?;
        self.entries.retain(|e| e.record.id != record_id);
        self.selection.remove(record_id);
        Ok(())
    }

    // ── selection ───────────────────────────────────────────────────

    pub fn selection(&self) -> &BTreeSet<Id> {
        &self.selection
    }

    pub fn toggle_select(&mut self, record_id: &str) -> bool {
        if self.selection.remove(record_id) {
            return false;
        }
        if self.entry(record_id).is_some() {
            self.selection.insert(record_id.to_string());
            return true;
        }
        false
    }

    pub fn is_all_selected(&self) -> bool {
        !self.entries.is_empty() && self.selection.len() == self.entries.len()
    }

    /// Select every record, or clear the selection if everything is selected.
    pub fn select_all(&mut self) {
        if self.is_all_selected() {
            self.selection.clear();
        } else {
            self.selection = self.record_ids();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ── confirmations ───────────────────────────────────────────────

    pub fn confirm_delete(&self, record_id: &str) -> Option<Confirmation> {
        let entry = self.entry(record_id)?;
        Some(Confirmation::Single {
            record_id: record_id.to_string(),
            message: format!(
                "Delete {} \"{}\" permanently? This cannot be undone.",
                entry.record.content_type.noun(),
                entry.display_name()
            ),
        })
    }

    pub fn confirm_delete_selected(&self) -> Option<Confirmation> {
        if self.selection.is_empty() {
            return None;
        }
        let n = self.selection.len();
        Some(Confirmation::Selected {
            record_ids: self.selection.clone(),
            message: format!("Delete {n} selected item{} permanently? This cannot be undone.", plural(n)),
        })
    }

    pub fn confirm_empty(&self) -> Option<Confirmation> {
        if self.entries.is_empty() {
            return None;
        }
        let n = self.entries.len();
        Some(Confirmation::EmptyAll {
            record_ids: self.record_ids(),
            message: format!("Empty the trash? All {n} item{} will be deleted permanently.", plural(n)),
        })
    }

    // ── irreversible operations ─────────────────────────────────────

    pub async fn permanently_delete(&mut self, confirmation: &Confirmation) -> KbResult<()> {
        let Confirmation::Single { record_id, .. } = confirmation else {
            return Err(KbError::Confirmation("expected a single-item confirmation".into()));
        };
        if self.entry(record_id).is_none() {
            return Err(KbError::Api(ApiError::NotFound));
        }
        self.backend.delete_permanently(record_id).await.map_err(|e| {
            error!(record = %record_id, "permanent delete failed: {e}");
            e
        })?;
        self.entries.retain(|e| &e.record.id != record_id);
        self.selection.remove(record_id);
        Ok(())
    }

    /// Purge every record the user owns. The confirmation must cover exactly
    /// the current listing.
    pub async fn empty_trash(&mut self, confirmation: &Confirmation) -> KbResult<BatchOutcome> {
        let Confirmation::EmptyAll { record_ids, .. } = confirmation else {
            return Err(KbError::Confirmation("expected an empty-trash confirmation".into()));
        };
        if *record_ids != self.record_ids() {
            return Err(KbError::Confirmation("trash changed since confirmation".into()));
        }
        let outcome = self.purge(record_ids.iter().cloned().collect()).await;
        self.selection.clear();
        self.reload().await?;
        Ok(outcome)
    }

    /// Restore every selected record. The selection is cleared either way.
    pub async fn restore_selected(&mut self) -> ApiResult<BatchOutcome> {
        let ids: Vec<Id> = std::mem::take(&mut self.selection).into_iter().collect();
        let backend = self.backend.as_ref();
        let results = join_all(ids.iter().map(|id| backend.restore(id))).await;
        let outcome = BatchOutcome::collect(ids.into_iter().zip(results).collect());
        self.reload().await?;
        Ok(outcome)
    }

    /// Purge every selected record. The selection is cleared either way.
    pub async fn delete_selected(&mut self, confirmation: &Confirmation) -> KbResult<BatchOutcome> {
        let Confirmation::Selected { record_ids, .. } = confirmation else {
            self.selection.clear();
            return Err(KbError::Confirmation("expected a selection confirmation".into()));
        };
        let selected = std::mem::take(&mut self.selection);
        if *record_ids != selected {
            return Err(KbError::Confirmation("selection changed since confirmation".into()));
        }
        let outcome = self.purge(selected.into_iter().collect()).await;
        self.reload().await?;
        Ok(outcome)
    }

    async fn purge(&self, ids: Vec<Id>) -> BatchOutcome {
        let backend = self.backend.as_ref();
        let results = join_all(ids.iter().map(|id| backend.delete_permanently(id))).await;
        BatchOutcome::collect(ids.into_iter().zip(results).collect())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
