//! URL surface of the knowledge base and the navigator that owns it.
//!
//! Parsing is total: any path that is not part of the routing contract
//! resolves to the root container. [`Navigator`] transitions are the only
//! way the current view changes.

use std::borrow::Cow;

use serde::Serialize;

use crate::models::Id;

const MY_FILES: &str = "mis-archivos";
const FAVORITES: &str = "favoritos";
const TRASH: &str = "papelera";
const FOLDER: &str = "folder";
const NEW_THEME: &str = "new-theme";
const THEME_DETAIL: &str = "theme-detail";
const EDIT_THEME: &str = "edit-theme";

/// The view a URL resolves to. `None` folder ids mean the root container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "kebab-case")]
pub enum Route {
    FolderBrowse { folder_id: Option<Id> },
    UserContent,
    Favorites,
    Trash,
    ThemeDetail { theme_id: Id, folder_id: Option<Id> },
    CreateTheme { folder_id: Option<Id> },
    EditTheme { theme_id: Id },
}

/// Named sidebar sections reachable through [`Navigator::navigate_to_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Container,
    MyFiles,
    Favorites,
    Trash,
}

/// Non-navigational query parameters carried across folder navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub q: Option<String>,
    pub filters: Vec<String>,
    pub sort_by: Option<String>,
}

impl QueryState {
    pub fn is_empty(&self) -> bool {
        self.q.is_none() && self.filters.is_empty() && self.sort_by.is_none()
    }

    fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(q) = &self.q {
            parts.push(format!("q={}", urlencoding::encode(q)));
        }
        if !self.filters.is_empty() {
            let joined = self.filters.iter().map(|f| urlencoding::encode(f)).collect::<Vec<_>>().join(",");
            parts.push(format!("filters={joined}"));
        }
        if let Some(s) = &self.sort_by {
            parts.push(format!("sortBy={}", urlencoding::encode(s)));
        }
        parts.join("&")
    }
}

fn decode(raw: &str) -> String {
    let plus_as_space = raw.replace('+', " ");
    urlencoding::decode(&plus_as_space)
        .map(Cow::into_owned)
        .unwrap_or(plus_as_space)
}

/// Split `url` into decoded path segments and raw query pairs.
fn split_url(url: &str) -> (Vec<String>, Vec<(String, String)>) {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url, ""),
    };
    let path = path.split('#').next().unwrap_or("");
    let query = query.split('#').next().unwrap_or("");
    let segments = path.split('/').filter(|s| !s.is_empty()).map(decode).collect();
    let pairs = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect();
    (segments, pairs)
}

impl Route {
    /// Parse a path (optionally with query string). Never fails.
    pub fn parse(url: &str, root_id: &str) -> (Route, QueryState) {
        let (segments, pairs) = split_url(url);
        let mut query = QueryState::default();
        let mut carried_folder = None;
        for (k, v) in pairs {
            match k.as_str() {
                "q" if !v.is_empty() => query.q = Some(decode(&v)),
                "filters" => {
                    query.filters = v.split(',').filter(|f| !f.is_empty()).map(decode).collect();
                }
                "sortBy" if !v.is_empty() => query.sort_by = Some(decode(&v)),
                "folderId" if !v.is_empty() => carried_folder = Some(decode(&v)),
                _ => {}
            }
        }
        let non_root = |id: &str| (id != root_id).then(|| id.to_string());
        let seg: Vec<&str> = segments.iter().map(String::as_str).collect();
        let route = match seg[..] {
            [FOLDER, id] => Route::FolderBrowse { folder_id: non_root(id) },
            [FOLDER, id, NEW_THEME] => Route::CreateTheme { folder_id: non_root(id) },
            [NEW_THEME] => Route::CreateTheme { folder_id: None },
            [MY_FILES] => Route::UserContent,
            [FAVORITES] => Route::Favorites,
            [TRASH] => Route::Trash,
            [THEME_DETAIL, id] => Route::ThemeDetail {
                theme_id: id.to_string(),
                folder_id: carried_folder.as_deref().and_then(non_root),
            },
            [EDIT_THEME, id] => Route::EditTheme { theme_id: id.to_string() },
            _ => Route::FolderBrowse { folder_id: None },
        };
        (route, query)
    }

    /// Path (and, for theme detail, the carried `folderId`) for this route.
    pub fn to_path(&self) -> String {
        let enc = |s: &str| urlencoding::encode(s).into_owned();
        match self {
            Route::FolderBrowse { folder_id: None } => "/".into(),
            Route::FolderBrowse { folder_id: Some(id) } => format!("/{FOLDER}/{}", enc(id)),
            Route::UserContent => format!("/{MY_FILES}"),
            Route::Favorites => format!("/{FAVORITES}"),
            Route::Trash => format!("/{TRASH}"),
            Route::ThemeDetail { theme_id, folder_id: None } => format!("/{THEME_DETAIL}/{}", enc(theme_id)),
            Route::ThemeDetail { theme_id, folder_id: Some(f) } => {
                format!("/{THEME_DETAIL}/{}?folderId={}", enc(theme_id), enc(f))
            }
            Route::CreateTheme { folder_id: None } => format!("/{NEW_THEME}"),
            Route::CreateTheme { folder_id: Some(id) } => format!("/{FOLDER}/{}/{NEW_THEME}", enc(id)),
            Route::EditTheme { theme_id } => format!("/{EDIT_THEME}/{}", enc(theme_id)),
        }
    }

    /// Folder that gives this view its context, if any.
    pub fn folder_context(&self) -> Option<&Id> {
        match self {
            Route::FolderBrowse { folder_id } | Route::CreateTheme { folder_id } => folder_id.as_ref(),
            Route::ThemeDetail { folder_id, .. } => folder_id.as_ref(),
            _ => None,
        }
    }
}

/// One visited location. `return_to` is the typed return address used by
/// back-navigation from theme detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub url: String,
    pub route: Route,
    pub query: QueryState,
    pub return_to: Option<Id>,
}

/// Entries kept in the navigator history; the oldest after the first are dropped.
pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct Navigator {
    root_id: Id,
    history: Vec<HistoryEntry>,
}

impl Navigator {
    pub fn new(root_id: impl Into<Id>) -> Self {
        let root_id = root_id.into();
        let start = HistoryEntry {
            url: "/".into(),
            route: Route::FolderBrowse { folder_id: None },
            query: QueryState::default(),
            return_to: None,
        };
        Self { root_id, history: vec![start] }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn current(&self) -> &HistoryEntry {
        // history is never empty: constructed with one entry and `back` keeps the first
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    fn push(&mut self, route: Route, query: QueryState, return_to: Option<Id>) -> &HistoryEntry {
        let path = route.to_path();
        let url = if query.is_empty() {
            path
        } else {
            let sep = if path.contains('?') { '&' } else { '?' };
            format!("{path}{sep}{}", query.to_query_string())
        };
        self.history.push(HistoryEntry { url, route, query, return_to });
        if self.history.len() > MAX_HISTORY {
            // the first entry is the fallback for `back`
            self.history.remove(1);
        }
        self.current()
    }

    fn non_root(&self, id: &str) -> Option<Id> {
        (id != self.root_id).then(|| id.to_string())
    }

    /// Deep link: resolve an arbitrary URL and make it current.
    pub fn open(&mut self, url: &str) -> &HistoryEntry {
        let (route, query) = Route::parse(url, &self.root_id);
        let return_to = match &route {
            Route::ThemeDetail { folder_id, .. } => folder_id.clone(),
            _ => None,
        };
        self.push(route, query, return_to)
    }

    /// `/folder/{id}` (or `/` for root), keeping search, filters and sort.
    pub fn navigate_to_folder(&mut self, folder_id: &str) -> &HistoryEntry {
        let query = self.current().query.clone();
        let route = Route::FolderBrowse { folder_id: self.non_root(folder_id) };
        self.push(route, query, None)
    }

    pub fn navigate_to_section(&mut self, section: Section) -> &HistoryEntry {
        let route = match section {
            Section::Container => Route::FolderBrowse { folder_id: None },
            Section::MyFiles => Route::UserContent,
            Section::Favorites => Route::Favorites,
            Section::Trash => Route::Trash,
        };
        self.push(route, QueryState::default(), None)
    }

    pub fn navigate_to_create_theme(&mut self, folder_id: Option<&str>) -> &HistoryEntry {
        let route = Route::CreateTheme { folder_id: folder_id.and_then(|f| self.non_root(f)) };
        self.push(route, QueryState::default(), None)
    }

    /// Leave the create form for the folder it was opened from.
    pub fn navigate_back_from_theme(&mut self, folder_id: Option<&str>) -> &HistoryEntry {
        match folder_id {
            Some(f) => self.navigate_to_folder(f),
            None => self.navigate_to_section(Section::Container),
        }
    }

    pub fn navigate_to_edit_theme(&mut self, theme_id: &str) -> &HistoryEntry {
        self.push(Route::EditTheme { theme_id: theme_id.to_string() }, QueryState::default(), None)
    }

    /// Open a theme, remembering the current folder as the return address.
    pub fn navigate_to_theme_detail(&mut self, theme_id: &str) -> &HistoryEntry {
        let folder_id = self.current().route.folder_context().cloned();
        let route = Route::ThemeDetail { theme_id: theme_id.to_string(), folder_id: folder_id.clone() };
        self.push(route, QueryState::default(), folder_id)
    }

    /// Return to the folder the theme was opened from, else the container.
    pub fn navigate_back_from_theme_detail(&mut self) -> &HistoryEntry {
        let current = self.current();
        let target = current.return_to.clone().or_else(|| match &current.route {
            Route::ThemeDetail { folder_id, .. } => folder_id.clone(),
            _ => None,
        });
        match target.filter(|f| *f != self.root_id) {
            Some(f) => self.navigate_to_folder(&f),
            None => self.navigate_to_section(Section::Container),
        }
    }

    /// Replace the query state of the current location (search box, filters, sort).
    pub fn set_query(&mut self, query: QueryState) -> &HistoryEntry {
        let current = self.current().clone();
        self.history.pop();
        self.push(current.route, query, current.return_to)
    }

    /// Pop one entry; the first entry is never removed.
    pub fn back(&mut self) -> &HistoryEntry {
        if self.history.len() > 1 {
            self.history.pop();
        }
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "root";

    #[test]
    fn parses_every_route_in_the_contract() {
        let cases = [
            ("/", Route::FolderBrowse { folder_id: None }),
            ("/folder/f1", Route::FolderBrowse { folder_id: Some("f1".into()) }),
            ("/folder/root", Route::FolderBrowse { folder_id: None }),
            ("/mis-archivos", Route::UserContent),
            ("/favoritos", Route::Favorites),
            ("/papelera", Route::Trash),
            ("/theme-detail/t1?folderId=f1", Route::ThemeDetail { theme_id: "t1".into(), folder_id: Some("f1".into()) }),
            ("/theme-detail/t1", Route::ThemeDetail { theme_id: "t1".into(), folder_id: None }),
            ("/new-theme", Route::CreateTheme { folder_id: None }),
            ("/folder/f1/new-theme", Route::CreateTheme { folder_id: Some("f1".into()) }),
            ("/edit-theme/t9", Route::EditTheme { theme_id: "t9".into() }),
        ];
        for (url, expected) in cases {
            let (route, _) = Route::parse(url, ROOT);
            assert_eq!(route, expected, "{url}");
            if url != "/folder/root" {
                assert_eq!(route.to_path(), url);
            }
        }
    }

    #[test]
    fn unknown_paths_fall_back_to_root() {
        for url in ["/nope", "/folder", "/folder/a/b/c", "/theme-detail", "///", "", "/papelera/x"] {
            let (route, _) = Route::parse(url, ROOT);
            assert_eq!(route, Route::FolderBrowse { folder_id: None }, "{url}");
        }
    }

    #[test]
    fn query_parameters_are_parsed() {
        let (_, q) = Route::parse("/folder/f1?q=hello%20world&filters=themes,files&sortBy=recent", ROOT);
        assert_eq!(q.q.as_deref(), Some("hello world"));
        assert_eq!(q.filters, vec!["themes".to_string(), "files".to_string()]);
        assert_eq!(q.sort_by.as_deref(), Some("recent"));
    }

    #[test]
    fn folder_navigation_preserves_query() {
        let mut nav = Navigator::new(ROOT);
        nav.open("/folder/a?q=x&sortBy=name");
        let entry = nav.navigate_to_folder("b");
        assert_eq!(entry.url, "/folder/b?q=x&sortBy=name");
        let entry = nav.navigate_to_folder(ROOT);
        assert_eq!(entry.url, "/?q=x&sortBy=name");
        let entry = nav.navigate_to_section(Section::Trash);
        assert_eq!(entry.url, "/papelera");
    }

    #[test]
    fn theme_detail_round_trip_returns_to_folder() {
        let mut nav = Navigator::new(ROOT);
        nav.navigate_to_folder("f7");
        let entry = nav.navigate_to_theme_detail("t1");
        assert_eq!(entry.url, "/theme-detail/t1?folderId=f7");
        assert_eq!(entry.return_to.as_deref(), Some("f7"));
        let back = nav.navigate_back_from_theme_detail();
        assert_eq!(back.route, Route::FolderBrowse { folder_id: Some("f7".into()) });
    }

    #[test]
    fn theme_detail_deep_link_uses_query_folder() {
        let mut nav = Navigator::new(ROOT);
        nav.open("/theme-detail/t1?folderId=f3");
        let back = nav.navigate_back_from_theme_detail();
        assert_eq!(back.url, "/folder/f3");
    }

    #[test]
    fn theme_detail_without_folder_returns_to_container() {
        let mut nav = Navigator::new(ROOT);
        nav.navigate_to_section(Section::Favorites);
        let entry = nav.navigate_to_theme_detail("t1");
        assert_eq!(entry.url, "/theme-detail/t1");
        let back = nav.navigate_back_from_theme_detail();
        assert_eq!(back.url, "/");

        nav.open("/theme-detail/t2?folderId=root");
        assert_eq!(nav.navigate_back_from_theme_detail().url, "/");
    }

    #[test]
    fn create_theme_paths() {
        let mut nav = Navigator::new(ROOT);
        assert_eq!(nav.navigate_to_create_theme(Some("f1")).url, "/folder/f1/new-theme");
        assert_eq!(nav.navigate_to_create_theme(None).url, "/new-theme");
        assert_eq!(nav.navigate_to_create_theme(Some(ROOT)).url, "/new-theme");
        assert_eq!(nav.navigate_back_from_theme(Some("f1")).url, "/folder/f1");
        assert_eq!(nav.navigate_to_edit_theme("t5").url, "/edit-theme/t5");
    }

    #[test]
    fn back_never_empties_history() {
        let mut nav = Navigator::new(ROOT);
        nav.navigate_to_section(Section::MyFiles);
        assert_eq!(nav.back().url, "/");
        assert_eq!(nav.back().url, "/");
        assert_eq!(nav.history().len(), 1);
    }

    #[test]
    fn history_is_capped_keeping_the_first_entry() {
        let mut nav = Navigator::new(ROOT);
        for i in 0..MAX_HISTORY + 25 {
            nav.navigate_to_folder(&format!("f{i}"));
        }
        assert_eq!(nav.history().len(), MAX_HISTORY);
        assert_eq!(nav.history()[0].url, "/");
        assert_eq!(nav.history()[1].url, "/folder/f26");
        assert_eq!(nav.current().url, format!("/folder/f{}", MAX_HISTORY + 24));
    }
}
