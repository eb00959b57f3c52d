//! Theme create/edit form.
//!
//! Selections cascade: positions are scoped to the selected areas and
//! sections to the selected AI models, and deselecting a parent prunes its
//! children. Attachments are uploaded the moment they are added; removing
//! one deletes it on the server straight away.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::Backend;
use crate::error::{ApiError, ApiResult};
use crate::models::*;

pub const MAX_TAGS: usize = 10;

/// Interval between simulated progress steps while an upload is in flight.
pub const UPLOAD_PROGRESS_TICK: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create { folder_id: Id },
    Edit { theme_id: Id, folder_id: Id, author: Id, was_draft: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitAction {
    SaveDraft,
    Publish,
    /// Save an already-published theme, keeping it published.
    Save,
}

/// Per-field validation messages; `None` means the field is fine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    pub priority: Option<String>,
    pub area: Option<String>,
    pub position: Option<String>,
    pub tags: Option<String>,
}

impl FormErrors {
    pub fn is_clear(&self) -> bool {
        self.priority.is_none() && self.area.is_none() && self.position.is_none() && self.tags.is_none()
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("form has validation errors")]
    Invalid(FormErrors),
    #[error("{0:?} is not available for this theme")]
    Unavailable(SubmitAction),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Added,
    Duplicate,
    Empty,
    LimitReached,
}

/// Keys that commit the pending tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKey {
    Enter,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum UploadState {
    Uploading,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadBatch {
    pub id: Uuid,
    pub file_names: Vec<String>,
    /// 0..=100
    pub progress: u8,
    pub state: UploadState,
}

/// Shared view of upload batches, readable while an upload is running.
#[derive(Debug, Clone, Default)]
pub struct UploadTracker(Arc<RwLock<Vec<UploadBatch>>>);

impl UploadTracker {
    pub fn snapshot(&self) -> Vec<UploadBatch> {
        match self.0.read() {
            Ok(b) => b.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    fn with_batch(&self, id: Uuid, f: impl FnOnce(&mut UploadBatch)) {
        let mut batches = match self.0.write() {
            Ok(b) => b,
            Err(p) => p.into_inner(),
        };
        if let Some(b) = batches.iter_mut().find(|b| b.id == id) {
            f(b);
        }
    }

    fn begin(&self, file_names: Vec<String>) -> Uuid {
        let id = Uuid::new_v4();
        let batch = UploadBatch { id, file_names, progress: 0, state: UploadState::Uploading };
        match self.0.write() {
            Ok(mut b) => b.push(batch),
            Err(p) => p.into_inner().push(batch),
        }
        id
    }

    // simulated: never reaches 100 before the server answers
    fn advance(&self, id: Uuid) {
        self.with_batch(id, |b| b.progress = (b.progress + 10).min(90));
    }

    fn finish(&self, id: Uuid, outcome: Result<(), String>) {
        self.with_batch(id, |b| match outcome {
            Ok(()) => {
                b.progress = 100;
                b.state = UploadState::Done;
            }
            Err(e) => b.state = UploadState::Failed(e),
        });
    }
}

/// Sections of one selected AI model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionGroup {
    pub model_id: Id,
    pub model_name: String,
    pub sections: Vec<Section>,
}

pub struct ThemeForm {
    backend: Arc<dyn Backend>,
    user_id: Id,
    mode: FormMode,

    pub title: String,
    pub description: String,
    priority: Option<Priority>,

    areas_catalog: Vec<Area>,
    areas: BTreeSet<Id>,
    positions_catalog: Vec<Position>,
    positions: BTreeSet<Id>,

    tags: Vec<String>,
    tag_input: String,
    /// `tag_input` holds text refused at the tag limit; the next keystroke replaces it.
    tag_refused: bool,

    models_catalog: Vec<AiModel>,
    ai_models: BTreeSet<Id>,
    sections_catalog: Vec<Section>,
    sections: BTreeSet<Id>,

    attachments: Vec<Attachment>,
    uploads: UploadTracker,
}

impl ThemeForm {
    fn blank(backend: Arc<dyn Backend>, user_id: &str, mode: FormMode) -> Self {
        Self {
            backend,
            user_id: user_id.to_string(),
            mode,
            title: String::new(),
            description: String::new(),
            priority: None,
            areas_catalog: vec![],
            areas: BTreeSet::new(),
            positions_catalog: vec![],
            positions: BTreeSet::new(),
            tags: vec![],
            tag_input: String::new(),
            tag_refused: false,
            models_catalog: vec![],
            ai_models: BTreeSet::new(),
            sections_catalog: vec![],
            sections: BTreeSet::new(),
            attachments: vec![],
            uploads: UploadTracker::default(),
        }
    }

    pub fn for_create(backend: Arc<dyn Backend>, user_id: &str, folder_id: &str) -> Self {
        Self::blank(backend, user_id, FormMode::Create { folder_id: folder_id.to_string() })
    }

    /// Prefill from an existing theme, loading the scoped catalogs it needs.
    pub async fn for_edit(backend: Arc<dyn Backend>, user_id: &str, theme: Theme) -> ApiResult<Self> {
        let mode = FormMode::Edit {
            theme_id: theme.id.clone(),
            folder_id: theme.folder_id.clone(),
            author: theme.author.id().to_string(),
            was_draft: theme.is_draft,
        };
        let mut form = Self::blank(backend, user_id, mode);
        form.title = theme.title;
        form.description = theme.description;
        form.priority = Some(theme.priority);
        form.areas = theme.areas.into_iter().collect();
        form.positions = theme.positions.into_iter().collect();
        form.tags = theme.keywords;
        form.ai_models = theme.ai_models.into_iter().collect();
        form.sections = theme.sections.into_iter().collect();

        form.load_catalog().await?;
        form.refresh_positions().await?;
        form.refresh_sections().await?;

        let backend = form.backend.clone();
        let names = futures_util::future::join_all(theme.files.iter().map(|id| backend.get_file(id))).await;
        form.attachments = theme
            .files
            .into_iter()
            .zip(names)
            .map(|(id, file)| {
                let name = file.map(|f| f.name).unwrap_or_else(|_| id.clone());
                Attachment { id, name }
            })
            .collect();
        Ok(form)
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    fn folder_id(&self) -> &str {
        match &self.mode {
            FormMode::Create { folder_id } | FormMode::Edit { folder_id, .. } => folder_id,
        }
    }

    /// Areas and AI models offered by the form.
    pub async fn load_catalog(&mut self) -> ApiResult<()> {
        let (areas, models) = tokio::join!(self.backend.list_areas(), self.backend.list_ai_models());
        self.areas_catalog = areas?;
        self.models_catalog = models?;
        Ok(())
    }

    pub fn areas_catalog(&self) -> &[Area] {
        &self.areas_catalog
    }

    pub fn models_catalog(&self) -> &[AiModel] {
        &self.models_catalog
    }

    // ── priority ────────────────────────────────────────────────────

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = Some(priority);
    }

    /// Select by its label (`Baja`, `Normal`, `Alta`).
    pub fn set_priority_label(&mut self, label: &str) -> bool {
        match Priority::from_label(label) {
            Some(p) => {
                self.priority = Some(p);
                true
            }
            None => false,
        }
    }

    // ── areas and positions ─────────────────────────────────────────

    pub fn areas(&self) -> &BTreeSet<Id> {
        &self.areas
    }

    pub fn positions(&self) -> &BTreeSet<Id> {
        &self.positions
    }

    /// Positions available for the current area selection.
    pub fn positions_catalog(&self) -> &[Position] {
        &self.positions_catalog
    }

    /// Flip an area, then refetch the positions scoped to the new selection.
    pub async fn toggle_area(&mut self, area_id: &str) -> ApiResult<()> {
        if !self.areas.remove(area_id) {
            self.areas.insert(area_id.to_string());
        }
        self.prune_positions();
        self.refresh_positions().await
    }

    pub async fn set_areas(&mut self, area_ids: &[Id]) -> ApiResult<()> {
        self.areas = area_ids.iter().cloned().collect();
        self.prune_positions();
        self.refresh_positions().await
    }

    async fn refresh_positions(&mut self) -> ApiResult<()> {
        if self.areas.is_empty() {
            self.positions_catalog.clear();
            self.positions.clear();
            return Ok(());
        }
        let ids: Vec<Id> = self.areas.iter().cloned().collect();
        self.positions_catalog = self.backend.list_positions(&ids).await?;
        self.prune_positions();
        Ok(())
    }

    // drop positions whose area is no longer selected
    fn prune_positions(&mut self) {
        let catalog = &self.positions_catalog;
        let areas = &self.areas;
        self.positions.retain(|id| match catalog.iter().find(|p| &p.id == id) {
            Some(p) => areas.contains(&p.area_id),
            None => catalog.is_empty(),
        });
    }

    fn area_positions<'a>(&'a self, area_id: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions_catalog.iter().filter(move |p| p.area_id == area_id)
    }

    pub fn toggle_position(&mut self, position_id: &str) -> bool {
        if self.positions.remove(position_id) {
            return false;
        }
        let selectable = self
            .positions_catalog
            .iter()
            .any(|p| p.id == position_id && self.areas.contains(&p.area_id));
        if selectable {
            self.positions.insert(position_id.to_string());
        }
        selectable
    }

    /// Whether every position of the area is selected. Derived, so it turns
    /// false as soon as one of them is deselected.
    pub fn all_positions_selected(&self, area_id: &str) -> bool {
        let mut any = false;
        for p in self.area_positions(area_id) {
            if !self.positions.contains(&p.id) {
                return false;
            }
            any = true;
        }
        any
    }

    /// Select every position of the area, or clear them if all are selected.
    pub fn toggle_all_positions(&mut self, area_id: &str) {
        let ids: Vec<Id> = self.area_positions(area_id).map(|p| p.id.clone()).collect();
        if self.all_positions_selected(area_id) {
            for id in &ids {
                self.positions.remove(id);
            }
        } else if self.areas.contains(area_id) {
            self.positions.extend(ids);
        }
    }

    // ── tags ────────────────────────────────────────────────────────

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn tag_input(&self) -> &str {
        &self.tag_input
    }

    /// Type into the tag box. Each comma commits the text before it. Text
    /// refused at the tag limit stays visible until the next keystroke,
    /// which starts a fresh entry.
    pub fn type_tag_text(&mut self, text: &str) -> Vec<TagOutcome> {
        let mut outcomes = vec![];
        for ch in text.chars() {
            if std::mem::take(&mut self.tag_refused) {
                self.tag_input.clear();
            }
            if ch == ',' {
                outcomes.push(self.commit_tag());
            } else {
                self.tag_input.push(ch);
            }
        }
        outcomes
    }

    pub fn press_tag_key(&mut self, key: TagKey) -> TagOutcome {
        debug!(?key, "tag key");
        self.commit_tag()
    }

    pub fn blur_tag_input(&mut self) -> TagOutcome {
        self.commit_tag()
    }

    fn commit_tag(&mut self) -> TagOutcome {
        let pending = std::mem::take(&mut self.tag_input);
        let outcome = self.add_tag(&pending);
        self.tag_refused = outcome == TagOutcome::LimitReached;
        if self.tag_refused {
            self.tag_input = pending;
        }
        outcome
    }

    /// Add a tag; comparison ignores case and surrounding whitespace.
    pub fn add_tag(&mut self, tag: &str) -> TagOutcome {
        let tag = tag.trim();
        if tag.is_empty() {
            return TagOutcome::Empty;
        }
        if self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return TagOutcome::Duplicate;
        }
        if self.tags.len() >= MAX_TAGS {
            return TagOutcome::LimitReached;
        }
        self.tags.push(tag.to_string());
        TagOutcome::Added
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    // ── AI models and sections ──────────────────────────────────────

    pub fn ai_models(&self) -> &BTreeSet<Id> {
        &self.ai_models
    }

    pub fn sections(&self) -> &BTreeSet<Id> {
        &self.sections
    }

    pub async fn toggle_ai_model(&mut self, model_id: &str) -> ApiResult<()> {
        if !self.ai_models.remove(model_id) {
            self.ai_models.insert(model_id.to_string());
        }
        self.prune_sections();
        self.refresh_sections().await
    }

    async fn refresh_sections(&mut self) -> ApiResult<()> {
        if self.ai_models.is_empty() {
            self.sections_catalog.clear();
            self.sections.clear();
            return Ok(());
        }
        let ids: Vec<Id> = self.ai_models.iter().cloned().collect();
        self.sections_catalog = self.backend.list_sections(&ids).await?;
        self.prune_sections();
        Ok(())
    }

    fn prune_sections(&mut self) {
        let catalog = &self.sections_catalog;
        let models = &self.ai_models;
        self.sections.retain(|id| match catalog.iter().find(|s| &s.id == id) {
            Some(s) => models.contains(&s.ai_model_id),
            None => catalog.is_empty(),
        });
    }

    pub fn toggle_section(&mut self, section_id: &str) -> bool {
        if self.sections.remove(section_id) {
            return false;
        }
        let selectable = self
            .sections_catalog
            .iter()
            .any(|s| s.id == section_id && self.ai_models.contains(&s.ai_model_id));
        if selectable {
            self.sections.insert(section_id.to_string());
        }
        selectable
    }

    /// Available sections grouped under their selected model.
    pub fn section_groups(&self) -> Vec<SectionGroup> {
        self.ai_models
            .iter()
            .map(|model_id| SectionGroup {
                model_id: model_id.clone(),
                model_name: self
                    .models_catalog
                    .iter()
                    .find(|m| &m.id == model_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| model_id.clone()),
                sections: self.sections_catalog.iter().filter(|s| &s.ai_model_id == model_id).cloned().collect(),
            })
            .collect()
    }

    // ── attachments ─────────────────────────────────────────────────

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn uploads(&self) -> UploadTracker {
        self.uploads.clone()
    }

    /// Upload a batch right away. Progress advances in 10% steps up to 90%
    /// while the request is pending and jumps to 100% when it completes.
    pub async fn upload(&mut self, files: Vec<UploadFile>) -> ApiResult<Vec<Attachment>> {
        let batch = self.uploads.begin(files.iter().map(|f| f.name.clone()).collect());
        let backend = self.backend.clone();
        let folder_id = self.folder_id().to_string();
        let user_id = self.user_id.clone();
        let request = async move { backend.upload_for_theme(files, &folder_id, &user_id).await };
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(UPLOAD_PROGRESS_TICK);
        ticker.tick().await;
        let result = loop {
            tokio::select! {
                r = &mut request => break r,
                _ = ticker.tick() => self.uploads.advance(batch),
            }
        };
        match result {
            Ok(uploaded) => {
                self.uploads.finish(batch, Ok(()));
                let added: Vec<Attachment> =
                    uploaded.array_file.into_iter().map(|(id, name)| Attachment { id, name }).collect();
                info!(batch = %batch, count = added.len(), "attachments uploaded");
                self.attachments.extend(added.iter().cloned());
                Ok(added)
            }
            Err(e) => {
                warn!(batch = %batch, "upload failed: {e}");
                self.uploads.finish(batch, Err(e.to_string()));
                Err(e)
            }
        }
    }

    /// Delete an uploaded attachment on the server and drop it from the form.
    pub async fn remove_attachment(&mut self, file_id: &str) -> ApiResult<()> {
        self.backend.delete_file(file_id).await?;
        self.attachments.retain(|a| a.id != file_id);
        Ok(())
    }

    // ── validation and submit ───────────────────────────────────────

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.priority.is_none() {
            errors.priority = Some("Select a priority".into());
        }
        if self.areas.is_empty() {
            errors.area = Some("Select at least one area".into());
        }
        if self.positions.is_empty() {
            errors.position = Some("Select at least one position".into());
        }
        if self.tags.is_empty() {
            errors.tags = Some("Add at least one tag".into());
        } else if self.tags.len() > MAX_TAGS {
            errors.tags = Some(format!("At most {MAX_TAGS} tags"));
        }
        errors
    }

    pub fn can_publish(&self) -> bool {
        match self.mode {
            FormMode::Create { .. } => true,
            FormMode::Edit { was_draft, .. } => was_draft,
        }
    }

    pub fn available_actions(&self) -> Vec<SubmitAction> {
        if self.can_publish() {
            vec![SubmitAction::SaveDraft, SubmitAction::Publish]
        } else {
            vec![SubmitAction::Save]
        }
    }

    /// Wire body for the current state.
    pub fn payload(&self, is_draft: bool) -> Option<ThemePayload> {
        let author = match &self.mode {
            FormMode::Create { .. } => self.user_id.clone(),
            FormMode::Edit { author, .. } => author.clone(),
        };
        Some(ThemePayload {
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            priority: self.priority?,
            folder_id: self.folder_id().to_string(),
            keywords: self.tags.clone(),
            author,
            areas: self.areas.iter().cloned().collect(),
            positions: self.positions.iter().cloned().collect(),
            files: self.attachments.iter().map(|a| a.id.clone()).collect(),
            ai_models: self.ai_models.iter().cloned().collect(),
            sections: self.sections.iter().cloned().collect(),
            is_draft,
        })
    }

    pub async fn save_draft(&mut self) -> Result<Theme, SubmitError> {
        self.submit(SubmitAction::SaveDraft).await
    }

    pub async fn publish(&mut self) -> Result<Theme, SubmitError> {
        self.submit(SubmitAction::Publish).await
    }

    pub async fn submit(&mut self, action: SubmitAction) -> Result<Theme, SubmitError> {
        if !self.available_actions().contains(&action) {
            return Err(SubmitError::Unavailable(action));
        }
        let errors = self.validate();
        if !errors.is_clear() {
            return Err(SubmitError::Invalid(errors));
        }
        let is_draft = action == SubmitAction::SaveDraft;
        let payload = self.payload(is_draft).ok_or_else(|| SubmitError::Invalid(self.validate()))?;
        let theme = match &self.mode {
            FormMode::Create { .. } => self.backend.create_theme(payload).await?,
            FormMode::Edit { theme_id, .. } => self.backend.update_theme(theme_id, payload).await?,
        };
        info!(theme = %theme.id, draft = theme.is_draft, "theme saved");
        if let FormMode::Edit { was_draft, .. } = &mut self.mode {
            *was_draft = theme.is_draft;
        }
        Ok(theme)
    }
}

#[cfg(all(test, feature = "inmem-backend"))]
mod tests {
    use super::*;
    use crate::api::inmem::InMemBackend;

    fn backend() -> InMemBackend {
        let b = InMemBackend::new();
        b.seed_area("A", "Area A");
        b.seed_area("B", "Area B");
        b.seed_position("p1", "P1", "A");
        b.seed_position("p1b", "P1b", "A");
        b.seed_position("p2", "P2", "B");
        b.seed_ai_model("m1", "Model 1");
        b.seed_ai_model("m2", "Model 2");
        b.seed_section("s1", "S1", "m1");
        b.seed_section("s2", "S2", "m2");
        b
    }

    #[tokio::test]
    async fn select_all_is_derived() {
        let mut form = ThemeForm::for_create(Arc::new(backend()), "u1", "root");
        form.toggle_area("A").await.unwrap();
        assert!(!form.all_positions_selected("A"));
        form.toggle_all_positions("A");
        assert!(form.all_positions_selected("A"));
        form.toggle_position("p1");
        assert!(!form.all_positions_selected("A"));
        assert_eq!(form.positions().len(), 1);
    }

    #[tokio::test]
    async fn positions_outside_selected_areas_are_not_selectable() {
        let mut form = ThemeForm::for_create(Arc::new(backend()), "u1", "root");
        form.toggle_area("A").await.unwrap();
        assert!(!form.toggle_position("p2"));
        assert!(form.toggle_position("p1"));
    }

    #[tokio::test]
    async fn deselecting_model_prunes_its_sections() {
        let mut form = ThemeForm::for_create(Arc::new(backend()), "u1", "root");
        form.load_catalog().await.unwrap();
        form.toggle_ai_model("m1").await.unwrap();
        form.toggle_ai_model("m2").await.unwrap();
        assert!(form.toggle_section("s1"));
        assert!(form.toggle_section("s2"));
        let groups = form.section_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].model_name, "Model 1");

        form.toggle_ai_model("m1").await.unwrap();
        assert_eq!(form.sections().iter().collect::<Vec<_>>(), ["s2"]);
    }

    #[test]
    fn commas_commit_tags() {
        let mut form = ThemeForm::for_create(Arc::new(InMemBackend::new()), "u1", "root");
        let out = form.type_tag_text("rust, async,wip");
        assert_eq!(out, [TagOutcome::Added, TagOutcome::Added]);
        assert_eq!(form.tag_input(), "wip");
        assert_eq!(form.blur_tag_input(), TagOutcome::Added);
        assert_eq!(form.tags(), ["rust", "async", "wip"]);
        assert_eq!(form.add_tag("RUST"), TagOutcome::Duplicate);
    }

    #[test]
    fn validation_reports_every_field() {
        let form = ThemeForm::for_create(Arc::new(InMemBackend::new()), "u1", "root");
        let errors = form.validate();
        assert!(errors.priority.is_some());
        assert!(errors.area.is_some());
        assert!(errors.position.is_some());
        assert!(errors.tags.is_some());
    }
}
