//! Breadcrumb navigation path from the root folder to the current one.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::api::FolderApi;
use crate::error::ApiError;
use crate::models::Id;

/// Upper bound on ancestor hops when rebuilding a path.
pub const MAX_PATH_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavigationError {
    #[error("folder hierarchy deeper than {MAX_PATH_DEPTH} levels at '{0}'")]
    DepthExceeded(Id),
    #[error("cycle in folder hierarchy at '{0}'")]
    Cycle(Id),
    #[error("index {index} out of range for path of length {len}")]
    OutOfRange { index: usize, len: usize },
    #[error("failed to resolve folder '{id}': {source}")]
    Lookup { id: Id, source: ApiError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub id: Id,
    pub name: String,
}

/// Ordered crumbs; `crumbs[0]` is always the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationPath {
    crumbs: Vec<Crumb>,
}

impl NavigationPath {
    pub fn root(root_id: impl Into<Id>, root_name: impl Into<String>) -> Self {
        Self { crumbs: vec![Crumb { id: root_id.into(), name: root_name.into() }] }
    }

    pub fn crumbs(&self) -> &[Crumb] {
        &self.crumbs
    }

    pub fn len(&self) -> usize {
        self.crumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn current(&self) -> &Crumb {
        &self.crumbs[self.crumbs.len() - 1]
    }

    pub fn root_crumb(&self) -> &Crumb {
        &self.crumbs[0]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.crumbs.iter().position(|c| c.id == id)
    }

    /// Keep crumbs `0..=index`.
    pub fn truncate_to(&mut self, index: usize) -> Result<&Crumb, NavigationError> {
        if index >= self.crumbs.len() {
            return Err(NavigationError::OutOfRange { index, len: self.crumbs.len() });
        }
        self.crumbs.truncate(index + 1);
        Ok(self.current())
    }

    /// Enter `id`: truncate back to it if already on the path, else append.
    pub fn enter(&mut self, id: &str, name: &str) {
        match self.position(id) {
            Some(i) => {
                self.crumbs.truncate(i + 1);
                self.crumbs[i].name = name.to_string();
            }
            None => self.crumbs.push(Crumb { id: id.to_string(), name: name.to_string() }),
        }
    }

    pub fn reset(&mut self) {
        self.crumbs.truncate(1);
    }

    /// Rename a crumb in place (after a folder rename).
    pub fn rename(&mut self, id: &str, name: &str) {
        for c in self.crumbs.iter_mut().filter(|c| c.id == id) {
            c.name = name.to_string();
        }
    }

    /// Breadcrumb rendering: every entry for short paths, otherwise first,
    /// an ellipsis jumping to `len - 2`, and the current folder as text.
    pub fn breadcrumb(&self) -> Vec<BreadcrumbItem> {
        let len = self.crumbs.len();
        if len <= 2 {
            return self
                .crumbs
                .iter()
                .enumerate()
                .map(|(index, c)| BreadcrumbItem::Link { index, id: c.id.clone(), name: c.name.clone() })
                .collect();
        }
        let first = &self.crumbs[0];
        vec![
            BreadcrumbItem::Link { index: 0, id: first.id.clone(), name: first.name.clone() },
            BreadcrumbItem::Ellipsis { target: len - 2 },
            BreadcrumbItem::Current { name: self.current().name.clone() },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreadcrumbItem {
    Link { index: usize, id: Id, name: String },
    Ellipsis { target: usize },
    Current { name: String },
}

/// Rebuild the path to `target` by walking `parent_id` links one lookup at a time.
pub async fn build_navigation_path<F: FolderApi + ?Sized>(
    folders: &F,
    root_id: &str,
    root_name: &str,
    target: &str,
) -> Result<NavigationPath, NavigationError> {
    let mut path = NavigationPath::root(root_id, root_name);
    if target == root_id {
        return Ok(path);
    }
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = target.to_string();
    while current != root_id {
        if chain.len() >= MAX_PATH_DEPTH {
            return Err(NavigationError::DepthExceeded(current));
        }
        if !seen.insert(current.clone()) {
            return Err(NavigationError::Cycle(current));
        }
        let folder = folders
            .get_folder(&current)
            .await
            .map_err(|source| NavigationError::Lookup { id: current.clone(), source })?;
        debug!(folder = %folder.id, parent = ?folder.parent_id, "resolved ancestor");
        let parent = folder.parent_id.clone().unwrap_or_else(|| root_id.to_string());
        chain.push(Crumb { id: folder.id, name: folder.name });
        current = parent;
    }
    chain.reverse();
    path.crumbs.extend(chain);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_of(n: usize) -> NavigationPath {
        let mut p = NavigationPath::root("root", "Inicio");
        for i in 1..n {
            p.enter(&format!("f{i}"), &format!("Folder {i}"));
        }
        p
    }

    #[test]
    fn short_paths_render_every_entry_as_link() {
        let items = path_of(2).breadcrumb();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| matches!(i, BreadcrumbItem::Link { .. })));
        assert_eq!(path_of(1).breadcrumb().len(), 1);
    }

    #[test]
    fn long_paths_collapse_to_three_units() {
        let p = path_of(5);
        let items = p.breadcrumb();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], BreadcrumbItem::Link { index: 0, .. }));
        assert_eq!(items[1], BreadcrumbItem::Ellipsis { target: 3 });
        assert_eq!(items[2], BreadcrumbItem::Current { name: "Folder 4".into() });
    }

    #[test]
    fn ellipsis_target_truncates_to_second_to_last() {
        let mut p = path_of(4);
        let target = match p.breadcrumb()[1] {
            BreadcrumbItem::Ellipsis { target } => target,
            ref other => panic!("unexpected {other:?}"),
        };
        let crumb = p.truncate_to(target).unwrap().clone();
        assert_eq!(crumb.id, "f2");
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn enter_known_folder_truncates() {
        let mut p = path_of(4);
        p.enter("f1", "Folder 1");
        assert_eq!(p.len(), 2);
        assert_eq!(p.current().id, "f1");
        assert!(p.truncate_to(5).is_err());
    }
}
