//! What each view shows, and the generation-stamped slot it is written to.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::RwLock;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::Backend;
use crate::error::ApiResult;
use crate::models::*;
use crate::route::QueryState;
use crate::store::{goal_progress_percent, ViewCounter};

/// Folders, themes and files feeding a content grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Listing {
    pub folders: Vec<Folder>,
    pub themes: Vec<Theme>,
    /// The caller's own unpublished themes.
    pub drafts: Vec<Theme>,
    pub files: Vec<File>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.themes.is_empty() && self.drafts.is_empty() && self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.themes.len() + self.drafts.len() + self.files.len()
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        match entity.kind {
            ContentKind::Folder => self.folders.iter().any(|f| f.id == entity.id),
            ContentKind::Theme => self.themes.iter().chain(&self.drafts).any(|t| t.id == entity.id),
            ContentKind::File => self.files.iter().any(|f| f.id == entity.id),
        }
    }

    /// Optimistic local removal; returns whether anything was removed.
    pub fn remove(&mut self, entity: &EntityRef) -> bool {
        let before = self.len();
        match entity.kind {
            ContentKind::Folder => self.folders.retain(|f| f.id != entity.id),
            ContentKind::Theme => {
                self.themes.retain(|t| t.id != entity.id);
                self.drafts.retain(|t| t.id != entity.id);
            }
            ContentKind::File => self.files.retain(|f| f.id != entity.id),
        }
        self.len() != before
    }

    /// Every entry as the tagged union.
    pub fn items(&self) -> Vec<Content> {
        self.folders
            .iter()
            .cloned()
            .map(Content::Folder)
            .chain(self.themes.iter().chain(&self.drafts).cloned().map(Content::Theme))
            .chain(self.files.iter().cloned().map(Content::File))
            .collect()
    }

    /// Apply the search term, kind filters and sort order from the URL.
    pub fn filtered(&self, query: &QueryState) -> Listing {
        let needle = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase);
        let matches = |text: &str| needle.as_deref().map_or(true, |n| text.to_lowercase().contains(n));
        let wants = |kind: &str| query.filters.is_empty() || query.filters.iter().any(|f| f == kind);

        let theme_matches = |t: &Theme| matches(t.title.as_str()) || t.keywords.iter().any(|k| matches(k.as_str()));
        let mut out = Listing {
            folders: if wants("folders") { self.folders.iter().filter(|f| matches(f.name.as_str())).cloned().collect() } else { vec![] },
            themes: if wants("themes") { self.themes.iter().filter(|t| theme_matches(t)).cloned().collect() } else { vec![] },
            drafts: if wants("themes") { self.drafts.iter().filter(|t| theme_matches(t)).cloned().collect() } else { vec![] },
            files: if wants("files") { self.files.iter().filter(|f| matches(f.name.as_str())).cloned().collect() } else { vec![] },
        };
        if let Some(order) = query.sort_by.as_deref().and_then(SortOrder::parse) {
            out.sort(order);
        }
        out
    }

    pub fn sort(&mut self, order: SortOrder) {
        self.folders.sort_by(|a, b| order.compare(&a.name, a.updated_at, &b.name, b.updated_at));
        self.themes.sort_by(|a, b| order.compare(&a.title, a.updated_at, &b.title, b.updated_at));
        self.drafts.sort_by(|a, b| order.compare(&a.title, a.updated_at, &b.title, b.updated_at));
        self.files.sort_by(|a, b| order.compare(&a.name, a.updated_at, &b.name, b.updated_at));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Name,
    Recent,
    Oldest,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(SortOrder::Name),
            "recent" => Some(SortOrder::Recent),
            "oldest" => Some(SortOrder::Oldest),
            _ => None,
        }
    }

    fn compare(
        self,
        a_name: &str,
        a_at: chrono::DateTime<chrono::Utc>,
        b_name: &str,
        b_at: chrono::DateTime<chrono::Utc>,
    ) -> Ordering {
        match self {
            SortOrder::Name => a_name.to_lowercase().cmp(&b_name.to_lowercase()),
            SortOrder::Recent => b_at.cmp(&a_at),
            SortOrder::Oldest => a_at.cmp(&b_at),
        }
    }
}

/// Theme detail page model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeDetail {
    pub theme: Theme,
    pub attachments: Vec<File>,
    pub comments: Vec<Comment>,
    /// Device-local visit count.
    pub views: u64,
    pub goal_percent: u8,
}

/// Direct children of one folder (not recursive).
pub async fn load_folder(backend: &dyn Backend, folder_id: &str, user_id: &str) -> ApiResult<Listing> {
    debug!(folder = folder_id, "loading folder");
    let (folders, themes, files) = tokio::join!(
        backend.list_folders(folder_id),
        backend.list_themes(folder_id, user_id),
        backend.list_files(folder_id),
    );
    let themes = themes?;
    Ok(Listing { folders: folders?, themes: themes.content, drafts: themes.draft, files: files? })
}

/// Everything the user created, from the aggregate endpoint.
pub async fn load_user_content(backend: &dyn Backend, user_id: &str) -> ApiResult<Listing> {
    let content = backend.content_by_user(user_id).await?;
    let (drafts, themes) = content.themes.into_iter().partition(|t| t.is_draft);
    Ok(Listing { folders: content.folders, themes, drafts, files: content.files })
}

/// Resolve favorite ids concurrently; entries that fail to resolve are dropped.
pub async fn load_favorites(backend: &dyn Backend, favorites: &FavoriteSet) -> Listing {
    let (folders, themes, files) = tokio::join!(
        join_all(favorites.folders.iter().map(|id| backend.get_folder(id))),
        join_all(favorites.themes.iter().map(|id| backend.get_theme(id))),
        join_all(favorites.files.iter().map(|id| backend.get_file(id))),
    );
    fn keep<T>(kind: &str, results: Vec<ApiResult<T>>) -> Vec<T> {
        results
            .into_iter()
            .filter_map(|r| r.map_err(|e| debug!(kind, "dropping unresolved favorite: {e}")).ok())
            .collect()
    }
    Listing {
        folders: keep("folder", folders),
        themes: keep("theme", themes),
        drafts: vec![],
        files: keep("file", files),
    }
}

/// Theme, attachments and comments; counts one local visit.
pub async fn load_theme_detail(backend: &dyn Backend, counter: &ViewCounter, theme_id: &str) -> ApiResult<ThemeDetail> {
    let theme = backend.get_theme(theme_id).await?;
    let (attachments, comments) = tokio::join!(
        join_all(theme.files.iter().map(|id| backend.get_file(id))),
        backend.list_comments(theme_id),
    );
    let attachments = attachments
        .into_iter()
        .filter_map(|r| r.map_err(|e| warn!(theme = theme_id, "attachment unavailable: {e}")).ok())
        .collect();
    let comments = comments.unwrap_or_else(|e| {
        warn!(theme = theme_id, "comments unavailable: {e}");
        vec![]
    });
    let views = counter.record_visit(theme_id);
    Ok(ThemeDetail { theme, attachments, comments, views, goal_percent: goal_progress_percent(views) })
}

// ── stale-write guard ───────────────────────────────────────────────

/// Ticket handed out when a load starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// A value written only by the newest load. Results of superseded loads
/// are discarded, so navigating away before a fetch resolves is harmless.
#[derive(Debug, Default)]
pub struct Generational<T> {
    generation: AtomicU64,
    value: RwLock<T>,
}

impl<T: Clone> Generational<T> {
    pub fn new(value: T) -> Self {
        Self { generation: AtomicU64::new(0), value: RwLock::new(value) }
    }

    pub fn begin(&self) -> LoadTicket {
        LoadTicket(self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        self.generation.load(AtomicOrdering::SeqCst) == ticket.0
    }

    /// Store `value` if `ticket` is still the newest; returns whether it was stored.
    pub fn commit(&self, ticket: LoadTicket, value: T) -> bool {
        let mut slot = match self.value.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        // checked under the write lock so a newer commit cannot interleave
        if !self.is_current(ticket) {
            debug!(ticket = ticket.0, "discarding stale load");
            return false;
        }
        *slot = value;
        true
    }

    /// Patch the current value in place (optimistic updates).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut slot = match self.value.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        f(&mut slot);
    }

    pub fn get(&self) -> T {
        match self.value.read() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn folder(id: &str, name: &str, age_days: i64) -> Folder {
        let at = Utc::now() - Duration::days(age_days);
        Folder {
            id: id.into(),
            name: name.into(),
            description: None,
            created_at: at,
            updated_at: at,
            created_by: "u1".into(),
            parent_id: None,
        }
    }

    #[test]
    fn stale_commit_is_discarded() {
        let slot = Generational::new(0u32);
        let first = slot.begin();
        let second = slot.begin();
        assert!(slot.commit(second, 2));
        assert!(!slot.commit(first, 1));
        assert_eq!(slot.get(), 2);
        assert!(!slot.is_current(first));
    }

    #[test]
    fn filter_and_sort_follow_query() {
        let listing = Listing {
            folders: vec![folder("a", "Zeta reports", 1), folder("b", "alpha reports", 5), folder("c", "Misc", 2)],
            ..Default::default()
        };
        let q = QueryState { q: Some("REPORTS".into()), filters: vec![], sort_by: Some("name".into()) };
        let out = listing.filtered(&q);
        let names: Vec<_> = out.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["alpha reports", "Zeta reports"]);

        let recent = listing.filtered(&QueryState { sort_by: Some("recent".into()), ..Default::default() });
        assert_eq!(recent.folders[0].id, "a");

        let only_files = listing.filtered(&QueryState { filters: vec!["files".into()], ..Default::default() });
        assert!(only_files.is_empty());
    }

    #[test]
    fn optimistic_remove() {
        let mut listing = Listing { folders: vec![folder("a", "A", 0)], ..Default::default() };
        assert!(listing.remove(&EntityRef::folder("a")));
        assert!(!listing.remove(&EntityRef::folder("a")));
        assert!(listing.is_empty());
    }
}
