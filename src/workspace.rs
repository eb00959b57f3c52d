//! Application state container.
//!
//! Owns the navigator, the breadcrumb path, the current view and the
//! favorites/trash slices. Every method takes `&self` so a front end can
//! share one `Arc<Workspace>` between concurrent tasks; a view load that
//! is overtaken by a newer one never overwrites it.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::api::{fetch_content, Backend};
use crate::config::ClientConfig;
use crate::content::{self, Generational, Listing, LoadTicket, ThemeDetail};
use crate::error::{ApiError, KbError, KbResult};
use crate::favorites::Favorites;
use crate::models::*;
use crate::nav::{build_navigation_path, BreadcrumbItem, NavigationError, NavigationPath};
use crate::route::{HistoryEntry, Navigator, QueryState, Route, Section};
use crate::store::{LocalStore, ViewCounter};
use crate::trash::{BatchOutcome, Confirmation, Trash, TrashEntry};

/// Inline message shown when a panel could not load.
pub const PANEL_LOAD_ERROR: &str = "Could not load this content. Try again.";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ViewContent {
    #[default]
    Empty,
    Listing(Listing),
    Trash(Vec<TrashEntry>),
    ThemeDetail(Box<ThemeDetail>),
    /// Create or edit form; `theme` is set when editing.
    Form { folder_id: Option<Id>, theme: Option<Box<Theme>> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub url: String,
    pub route: Route,
    pub breadcrumb: Vec<BreadcrumbItem>,
    pub content: ViewContent,
    pub panel_error: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            url: "/".into(),
            route: Route::FolderBrowse { folder_id: None },
            breadcrumb: vec![],
            content: ViewContent::Empty,
            panel_error: None,
        }
    }
}

/// What opening a content item led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "opened", rename_all = "snake_case")]
pub enum Opened {
    View(ViewState),
    /// Files open in place; videos carry a one-time token.
    File { url: String },
}

/// Per-item callbacks a content card needs.
#[async_trait]
pub trait ContentActions: Send + Sync {
    async fn open_item(&self, item: &Content) -> KbResult<Opened>;
    async fn toggle_favorite(&self, item: &EntityRef) -> KbResult<bool>;
    async fn rename(&self, item: &EntityRef, name: &str) -> KbResult<Content>;
    async fn move_to_trash(&self, item: &EntityRef) -> KbResult<TrashRecord>;
}

pub struct Workspace {
    backend: Arc<dyn Backend>,
    root_id: Id,
    root_name: String,
    user_id: Option<Id>,
    navigator: Mutex<Navigator>,
    path: RwLock<NavigationPath>,
    view: Generational<ViewState>,
    sidebar: RwLock<Vec<Folder>>,
    favorites: Option<Favorites>,
    trash: Option<AsyncMutex<Trash>>,
    views: ViewCounter,
}

impl Workspace {
    /// `user_id` is `None` for the anonymous mode; user-scoped slices are then unavailable.
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig, store: Arc<dyn LocalStore>, user_id: Option<Id>) -> Self {
        let favorites = user_id.as_ref().map(|u| Favorites::new(backend.clone(), u.clone()));
        let trash = user_id.as_ref().map(|u| AsyncMutex::new(Trash::new(backend.clone(), u.clone())));
        Self {
            root_id: config.root_folder_id.clone(),
            root_name: config.root_folder_name.clone(),
            navigator: Mutex::new(Navigator::new(config.root_folder_id.clone())),
            path: RwLock::new(NavigationPath::root(config.root_folder_id.clone(), config.root_folder_name.clone())),
            view: Generational::new(ViewState::default()),
            sidebar: RwLock::new(vec![]),
            views: ViewCounter::new(store),
            favorites,
            trash,
            user_id,
            backend,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn require_user(&self) -> KbResult<&str> {
        self.user_id.as_deref().ok_or(KbError::AuthRequired)
    }

    fn favorites_slice(&self) -> KbResult<&Favorites> {
        self.favorites.as_ref().ok_or(KbError::AuthRequired)
    }

    // never held across an await
    fn navigator(&self) -> MutexGuard<'_, Navigator> {
        self.navigator.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn path_mut(&self) -> std::sync::RwLockWriteGuard<'_, NavigationPath> {
        self.path.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn path(&self) -> NavigationPath {
        self.path.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn view(&self) -> ViewState {
        self.view.get()
    }

    pub fn current_entry(&self) -> HistoryEntry {
        self.navigator().current().clone()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.navigator().history().to_vec()
    }

    pub fn sidebar(&self) -> Vec<Folder> {
        self.sidebar.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn favorites(&self) -> Option<FavoriteSet> {
        self.favorites.as_ref().map(Favorites::snapshot)
    }

    /// Exclusive access to the trash slice (selection, confirmations, purges).
    pub async fn trash(&self) -> KbResult<tokio::sync::MutexGuard<'_, Trash>> {
        match &self.trash {
            Some(t) => Ok(t.lock().await),
            None => Err(KbError::AuthRequired),
        }
    }

    // ── navigation ──────────────────────────────────────────────────

    /// Deep link: resolve `url`, rebuilding the breadcrumb path from the backend.
    pub async fn open(&self, url: &str) -> ViewState {
        let entry = self.navigator().open(url).clone();
        info!(url = %entry.url, "open");
        self.load(entry, true).await
    }

    /// Enter a folder from the grid, the sidebar or a listing. The path is
    /// extended locally only for a child of the current crumb; any other
    /// folder gets its ancestor chain rebuilt from the backend.
    pub async fn navigate_to_folder(&self, folder_id: &str, name: &str) -> ViewState {
        let listed_in = self.listed_in(folder_id);
        let entry = self.navigator().navigate_to_folder(folder_id).clone();
        let rebuild = {
            let mut path = self.path_mut();
            if folder_id == self.root_id {
                path.reset();
                false
            } else if path.position(folder_id).is_some() || listed_in.as_deref() == Some(path.current().id.as_str()) {
                path.enter(folder_id, name);
                false
            } else {
                true
            }
        };
        debug!(folder = folder_id, rebuild, "navigate to folder");
        self.load(entry, rebuild).await
    }

    /// Folder whose grid currently shows `folder_id` as a subfolder.
    fn listed_in(&self, folder_id: &str) -> Option<Id> {
        let view = self.view();
        let Route::FolderBrowse { folder_id: shown } = &view.route else {
            return None;
        };
        let ViewContent::Listing(listing) = &view.content else {
            return None;
        };
        listing
            .folders
            .iter()
            .any(|f| f.id == folder_id)
            .then(|| shown.clone().unwrap_or_else(|| self.root_id.clone()))
    }

    /// Jump to a breadcrumb; the path is truncated to it.
    pub async fn navigate_to_breadcrumb(&self, index: usize) -> KbResult<ViewState> {
        let crumb = self.path_mut().truncate_to(index)?.clone();
        let entry = self.navigator().navigate_to_folder(&crumb.id).clone();
        Ok(self.load(entry, false).await)
    }

    pub async fn navigate_to_section(&self, section: Section) -> ViewState {
        let entry = self.navigator().navigate_to_section(section).clone();
        // sections live outside the folder tree
        self.path_mut().reset();
        self.load(entry, false).await
    }

    pub async fn navigate_to_theme_detail(&self, theme_id: &str) -> ViewState {
        let entry = self.navigator().navigate_to_theme_detail(theme_id).clone();
        self.load(entry, false).await
    }

    pub async fn navigate_back_from_theme_detail(&self) -> ViewState {
        let entry = self.navigator().navigate_back_from_theme_detail().clone();
        self.load(entry, true).await
    }

    /// Open the create form in the folder the current location belongs to,
    /// the root outside the folder tree.
    pub async fn navigate_to_create_theme(&self) -> ViewState {
        let entry = {
            let mut navigator = self.navigator();
            let folder = navigator.current().route.folder_context().cloned();
            navigator.navigate_to_create_theme(folder.as_deref()).clone()
        };
        self.load(entry, false).await
    }

    pub async fn navigate_back_from_theme(&self, folder_id: Option<&str>) -> ViewState {
        let entry = self.navigator().navigate_back_from_theme(folder_id).clone();
        self.load(entry, true).await
    }

    pub async fn navigate_to_edit_theme(&self, theme_id: &str) -> ViewState {
        let entry = self.navigator().navigate_to_edit_theme(theme_id).clone();
        self.load(entry, false).await
    }

    pub async fn set_query(&self, query: QueryState) -> ViewState {
        let entry = self.navigator().set_query(query).clone();
        self.load(entry, false).await
    }

    pub async fn back(&self) -> ViewState {
        let entry = self.navigator().back().clone();
        self.load(entry, true).await
    }

    /// Reload the current location.
    pub async fn refresh(&self) -> ViewState {
        let entry = self.current_entry();
        self.load(entry, false).await
    }

    // ── loading ─────────────────────────────────────────────────────

    async fn load(&self, entry: HistoryEntry, rebuild_path: bool) -> ViewState {
        let ticket = self.view.begin();
        let (content, panel_error) = match self.resolve(&entry, rebuild_path, ticket).await {
            Ok(content) => (content, None),
            Err(e) => {
                warn!(url = %entry.url, "view load failed: {e}");
                (ViewContent::Empty, Some(panel_message(&e)))
            }
        };
        let state = ViewState {
            url: entry.url,
            route: entry.route,
            breadcrumb: self.path().breadcrumb(),
            content,
            panel_error,
        };
        if !self.view.commit(ticket, state.clone()) {
            debug!(url = %state.url, "load superseded");
            return self.view();
        }
        state
    }

    async fn resolve(&self, entry: &HistoryEntry, rebuild_path: bool, ticket: LoadTicket) -> KbResult<ViewContent> {
        let backend = self.backend.as_ref();
        let user = self.user_id.as_deref().unwrap_or_default();
        let content = match &entry.route {
            Route::FolderBrowse { folder_id } => {
                let id = folder_id.as_deref().unwrap_or(&self.root_id);
                let (listing, path) =
                    tokio::join!(content::load_folder(backend, id, user), self.resolve_path(id, rebuild_path));
                if let Some(path) = path? {
                    if self.view.is_current(ticket) {
                        *self.path_mut() = path;
                    }
                }
                ViewContent::Listing(listing?.filtered(&entry.query))
            }
            Route::UserContent => {
                let listing = content::load_user_content(backend, self.require_user()?).await?;
                ViewContent::Listing(listing.filtered(&entry.query))
            }
            Route::Favorites => {
                let set = self.favorites_slice()?.sync().await?;
                ViewContent::Listing(content::load_favorites(backend, &set).await.filtered(&entry.query))
            }
            Route::Trash => {
                let mut trash = self.trash().await?;
                trash.reload().await?;
                ViewContent::Trash(trash.entries().to_vec())
            }
            Route::ThemeDetail { theme_id, .. } => {
                let detail = content::load_theme_detail(backend, &self.views, theme_id).await?;
                ViewContent::ThemeDetail(Box::new(detail))
            }
            Route::CreateTheme { folder_id } => ViewContent::Form { folder_id: folder_id.clone(), theme: None },
            Route::EditTheme { theme_id } => {
                let theme = backend.get_theme(theme_id).await?;
                ViewContent::Form { folder_id: Some(theme.folder_id.clone()), theme: Some(Box::new(theme)) }
            }
        };
        Ok(content)
    }

    /// Path for `folder_id`: reuse the current one when the folder is on it,
    /// otherwise walk the ancestors (only when `rebuild` is set).
    async fn resolve_path(&self, folder_id: &str, rebuild: bool) -> Result<Option<NavigationPath>, NavigationError> {
        if folder_id == self.root_id {
            return Ok(Some(NavigationPath::root(self.root_id.clone(), self.root_name.clone())));
        }
        let mut current = self.path();
        if let Some(i) = current.position(folder_id) {
            current.truncate_to(i)?;
            return Ok(Some(current));
        }
        if !rebuild {
            return Ok(None);
        }
        build_navigation_path(self.backend.as_ref(), &self.root_id, &self.root_name, folder_id).await.map(Some)
    }

    /// Top-level folders for the sidebar.
    pub async fn reload_sidebar(&self) -> KbResult<Vec<Folder>> {
        let folders = self.backend.list_folders(&self.root_id).await?;
        *self.sidebar.write().unwrap_or_else(|p| p.into_inner()) = folders.clone();
        Ok(folders)
    }

    /// Reconcile every slice after a mutation. Reloads run concurrently and
    /// each replaces its slice wholesale.
    async fn reconcile(&self) {
        let favorites = async {
            if let Some(f) = &self.favorites {
                if let Err(e) = f.sync().await {
                    warn!("favorites resync failed: {e}");
                }
            }
        };
        let (_, sidebar, _) = tokio::join!(self.refresh(), self.reload_sidebar(), favorites);
        if let Err(e) = sidebar {
            warn!("sidebar reload failed: {e}");
        }
    }

    // ── mutations ───────────────────────────────────────────────────

    pub async fn restore(&self, record_id: &str) -> KbResult<()> {
        self.trash().await?.restore(record_id).await?;
        info!(record = record_id, "restored from trash");
        self.reconcile().await;
        Ok(())
    }

    // the batch operations below drop the trash guard before reconciling

    /// Restore every selected trash record. The selection is emptied even
    /// when some restores fail.
    pub async fn restore_selected(&self) -> KbResult<BatchOutcome> {
        let result = self.trash().await?.restore_selected().await;
        self.reconcile().await;
        let outcome = result?;
        info!(restored = outcome.succeeded.len(), failed = outcome.failed.len(), "restored selection");
        Ok(outcome)
    }

    pub async fn delete_selected(&self, confirmation: &Confirmation) -> KbResult<BatchOutcome> {
        let result = self.trash().await?.delete_selected(confirmation).await;
        self.reconcile().await;
        result
    }

    pub async fn empty_trash(&self, confirmation: &Confirmation) -> KbResult<BatchOutcome> {
        let result = self.trash().await?.empty_trash(confirmation).await;
        self.reconcile().await;
        result
    }

    pub async fn permanently_delete(&self, confirmation: &Confirmation) -> KbResult<()> {
        let result = self.trash().await?.permanently_delete(confirmation).await;
        self.reconcile().await;
        result
    }

    /// Create a folder under the current one.
    pub async fn create_folder(&self, name: &str, description: Option<String>) -> KbResult<Folder> {
        let user = self.require_user()?;
        let parent = self.path().current().id.clone();
        let folder = self
            .backend
            .create_folder(NewFolder {
                name: name.trim().to_string(),
                description,
                parent_id: (parent != self.root_id).then_some(parent),
                created_by: user.to_string(),
            })
            .await?;
        self.reconcile().await;
        Ok(folder)
    }

    pub async fn add_comment(&self, theme_id: &str, message: &str) -> KbResult<Comment> {
        let user = self.require_user()?;
        let comment = self
            .backend
            .create_comment(NewComment { message: message.to_string(), author: user.to_string(), theme_id: theme_id.to_string() })
            .await?;
        Ok(comment)
    }
}

#[async_trait]
impl ContentActions for Workspace {
    async fn open_item(&self, item: &Content) -> KbResult<Opened> {
        Ok(match item {
            Content::Folder(f) => Opened::View(self.navigate_to_folder(&f.id, &f.name).await),
            Content::Theme(t) => Opened::View(self.navigate_to_theme_detail(&t.id).await),
            Content::File(f) if f.mime.as_deref().is_some_and(|m| m.starts_with("video/")) => {
                let token = self.backend.generate_video_token().await?;
                let sep = if f.path.contains('?') { '&' } else { '?' };
                Opened::File { url: format!("{}{sep}token={}", f.path, urlencoding::encode(&token.token)) }
            }
            Content::File(f) => Opened::File { url: f.path.clone() },
        })
    }

    async fn toggle_favorite(&self, item: &EntityRef) -> KbResult<bool> {
        let member = self.favorites_slice()?.toggle(item.kind, &item.id).await?;
        if self.current_entry().route == Route::Favorites {
            self.refresh().await;
        }
        Ok(member)
    }

    async fn rename(&self, item: &EntityRef, name: &str) -> KbResult<Content> {
        let name = name.trim();
        let backend = self.backend.as_ref();
        match item.kind {
            ContentKind::Folder => {
                backend
                    .update_folder(&item.id, UpdateFolder { name: Some(name.to_string()), description: None })
                    .await?;
                self.path_mut().rename(&item.id, name);
            }
            ContentKind::Theme => {
                let theme = backend.get_theme(&item.id).await?;
                let payload = ThemePayload {
                    title: name.to_string(),
                    description: theme.description,
                    priority: theme.priority,
                    folder_id: theme.folder_id,
                    keywords: theme.keywords,
                    author: theme.author.id().to_string(),
                    areas: theme.areas,
                    positions: theme.positions,
                    files: theme.files,
                    ai_models: theme.ai_models,
                    sections: theme.sections,
                    is_draft: theme.is_draft,
                };
                backend.update_theme(&item.id, payload).await?;
            }
            ContentKind::File => {
                backend.update_file(&item.id, UpdateFile { name: Some(name.to_string()) }).await?;
            }
        }
        info!(kind = item.kind.noun(), id = %item.id, "renamed");
        let (renamed, _) = tokio::join!(fetch_content(backend, item), self.reconcile());
        Ok(renamed?)
    }

    async fn move_to_trash(&self, item: &EntityRef) -> KbResult<TrashRecord> {
        self.require_user()?;
        // optimistic: drop it from the visible grid before the server answers
        self.view.update(|state| {
            if let ViewContent::Listing(listing) = &mut state.content {
                listing.remove(item);
            }
        });
        // the trash lock must be released before reconciling
        let result = self.trash().await?.move_to_trash(item).await;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                self.reconcile().await;
                return Err(e.into());
            }
        };
        self.reconcile().await;
        Ok(record)
    }
}

fn panel_message(e: &KbError) -> String {
    match e {
        KbError::AuthRequired => "Sign in to see this section.".into(),
        KbError::Api(ApiError::NotFound) => "This item no longer exists.".into(),
        KbError::Navigation(n) => format!("{PANEL_LOAD_ERROR} ({n})"),
        _ => PANEL_LOAD_ERROR.into(),
    }
}

#[cfg(all(test, feature = "inmem-backend"))]
mod tests {
    use super::*;
    use crate::api::inmem::InMemBackend;
    use crate::store::MemoryStore;

    fn workspace(backend: &InMemBackend, user: Option<&str>) -> Workspace {
        Workspace::new(
            Arc::new(backend.clone()),
            &ClientConfig::default(),
            Arc::new(MemoryStore::new()),
            user.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn anonymous_user_sees_panel_error_for_trash() {
        let backend = InMemBackend::new();
        let ws = workspace(&backend, None);
        let state = ws.navigate_to_section(Section::Trash).await;
        assert_eq!(state.content, ViewContent::Empty);
        assert_eq!(state.panel_error.as_deref(), Some("Sign in to see this section."));
    }

    #[tokio::test]
    async fn trashing_removes_item_and_reloads() {
        let backend = InMemBackend::new();
        backend.seed_folder("f1", "Reports", None, "u1");
        backend.seed_folder("f2", "Drafts", None, "u1");
        let ws = workspace(&backend, Some("u1"));
        ws.open("/").await;

        ws.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
        match ws.view().content {
            ViewContent::Listing(l) => assert_eq!(l.folders.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), ["f2"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ws.sidebar().len(), 1);
        assert_eq!(ws.trash().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_folder_updates_breadcrumb() {
        let backend = InMemBackend::new();
        backend.seed_folder("f1", "Old", None, "u1");
        let ws = workspace(&backend, Some("u1"));
        ws.open("/folder/f1").await;
        let renamed = ws.rename(&EntityRef::folder("f1"), " New ").await.unwrap();
        assert_eq!(renamed.display_name(), "New");
        assert_eq!(ws.path().current().name, "New");
    }
}
