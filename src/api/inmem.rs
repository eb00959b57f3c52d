//! In-memory backend with the same soft-delete semantics as the REST API.
//!
//! Trashed entities stay in their collections but are only reachable
//! through the trash-scoped endpoints until restored or purged.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::*;
use crate::config::DEFAULT_ROOT_FOLDER_ID;
use crate::error::ApiError;

#[derive(Default)]
struct State {
    folders: HashMap<Id, Folder>,
    themes: HashMap<Id, Theme>,
    files: HashMap<Id, File>,
    trash: HashMap<Id, TrashRecord>,
    trashed: HashSet<EntityRef>,
    favorites: HashMap<Id, FavoriteSet>,
    comments: HashMap<Id, Comment>,
    areas: Vec<Area>,
    positions: Vec<Position>,
    ai_models: HashMap<Id, AiModel>,
    sections: HashMap<Id, Section>,
    applications: Vec<Application>,
    tokens: HashMap<String, Id>,
    video_tokens: HashSet<String>,
    answers: HashMap<String, ChatAnswer>,
    /// Artificial delay before listing a folder's children.
    latency: HashMap<Id, std::time::Duration>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> Id {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn is_trashed(&self, kind: ContentKind, id: &str) -> bool {
        self.trashed.contains(&EntityRef { kind, id: id.to_string() })
    }

    fn exists(&self, entity: &EntityRef) -> bool {
        match entity.kind {
            ContentKind::Folder => self.folders.contains_key(&entity.id),
            ContentKind::Theme => self.themes.contains_key(&entity.id),
            ContentKind::File => self.files.contains_key(&entity.id),
        }
    }

    fn soft_delete(&mut self, entity: EntityRef, user_id: &str) -> ApiResult<TrashRecord> {
        if !self.exists(&entity) || self.trashed.contains(&entity) {
            return Err(ApiError::NotFound);
        }
        let now = Utc::now();
        let record = TrashRecord {
            id: self.next_id("trash-"),
            content_type: entity.kind,
            original_id: entity.id.clone(),
            created_at: now,
            expires_at: Some(now + Duration::days(TRASH_RETENTION_DAYS)),
            user_id: user_id.to_string(),
        };
        self.trashed.insert(entity);
        self.trash.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn theme_from_payload(&self, id: Id, payload: ThemePayload, created_at: chrono::DateTime<Utc>) -> Theme {
        Theme {
            id,
            title: payload.title,
            description: payload.description,
            priority: payload.priority,
            folder_id: payload.folder_id,
            keywords: payload.keywords,
            author: AuthorRef::Id(payload.author),
            areas: payload.areas,
            positions: payload.positions,
            files: payload.files,
            ai_models: payload.ai_models,
            sections: payload.sections,
            is_draft: payload.is_draft,
            created_at,
            updated_at: Utc::now(),
        }
    }

    fn store_uploads(&mut self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> Vec<File> {
        files
            .into_iter()
            .map(|f| {
                let id = self.next_id("file-");
                let now = Utc::now();
                let file = File {
                    path: format!("s3://kb-files/{id}/{}", f.name),
                    mime: Some(f.resolved_mime()),
                    name: f.name,
                    folder_id: Some(folder_id.to_string()),
                    created_by: Some(user_id.to_string()),
                    created_at: now,
                    updated_at: now,
                    id,
                };
                self.files.insert(file.id.clone(), file.clone());
                file
            })
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct InMemBackend {
    state: Arc<RwLock<State>>,
}

impl InMemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await, so poisoning only follows a panic elsewhere.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    // ── seeding helpers ─────────────────────────────────────────────

    pub fn seed_folder(&self, id: &str, name: &str, parent_id: Option<&str>, created_by: &str) -> Folder {
        let now = Utc::now();
        let folder = Folder {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            created_at: now,
            updated_at: now,
            created_by: created_by.to_string(),
            parent_id: parent_id.map(str::to_string),
        };
        self.write().folders.insert(folder.id.clone(), folder.clone());
        folder
    }

    pub fn seed_theme(&self, id: &str, title: &str, folder_id: &str, author: &str, is_draft: bool) -> Theme {
        let now = Utc::now();
        let theme = Theme {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("<p>{title}</p>"),
            priority: Priority::Normal,
            folder_id: folder_id.to_string(),
            keywords: vec![],
            author: AuthorRef::Id(author.to_string()),
            areas: vec![],
            positions: vec![],
            files: vec![],
            ai_models: vec![],
            sections: vec![],
            is_draft,
            created_at: now,
            updated_at: now,
        };
        self.write().themes.insert(theme.id.clone(), theme.clone());
        theme
    }

    pub fn seed_file(&self, id: &str, name: &str, folder_id: &str, created_by: &str) -> File {
        let now = Utc::now();
        let file = File {
            id: id.to_string(),
            name: name.to_string(),
            mime: None,
            path: format!("s3://kb-files/{id}/{name}"),
            folder_id: Some(folder_id.to_string()),
            created_by: Some(created_by.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.write().files.insert(file.id.clone(), file.clone());
        file
    }

    pub fn seed_area(&self, id: &str, name: &str) {
        self.write().areas.push(Area { id: id.into(), name: name.into() });
    }

    pub fn seed_position(&self, id: &str, name: &str, area_id: &str) {
        self.write().positions.push(Position { id: id.into(), name: name.into(), area_id: area_id.into() });
    }

    pub fn seed_ai_model(&self, id: &str, name: &str) {
        let model = AiModel { id: id.into(), name: name.into(), description: None, application_id: None };
        self.write().ai_models.insert(model.id.clone(), model);
    }

    pub fn seed_section(&self, id: &str, name: &str, ai_model_id: &str) {
        let section = Section { id: id.into(), name: name.into(), ai_model_id: ai_model_id.into() };
        self.write().sections.insert(section.id.clone(), section);
    }

    pub fn seed_application(&self, id: &str, name: &str) {
        self.write().applications.push(Application { id: id.into(), name: name.into(), url: None });
    }

    /// Make `token` validate to `user_id`.
    pub fn register_token(&self, token: &str, user_id: &str) {
        self.write().tokens.insert(token.to_string(), user_id.to_string());
    }

    pub fn set_answer(&self, question: &str, answer: ChatAnswer) {
        self.write().answers.insert(question.to_string(), answer);
    }

    /// Delay every listing of `folder_id` by `delay`, to stage out-of-order loads.
    pub fn set_latency(&self, folder_id: &str, delay: std::time::Duration) {
        self.write().latency.insert(folder_id.to_string(), delay);
    }

    /// Insert a raw trash record, even one whose original no longer exists.
    pub fn insert_trash_record(&self, record: TrashRecord) {
        let mut s = self.write();
        s.trashed.insert(record.original());
        s.trash.insert(record.id.clone(), record);
    }

    /// Drop an entity outright, bypassing the trash.
    pub fn remove_entity(&self, entity: &EntityRef) {
        let mut s = self.write();
        match entity.kind {
            ContentKind::Folder => { s.folders.remove(&entity.id); }
            ContentKind::Theme => { s.themes.remove(&entity.id); }
            ContentKind::File => { s.files.remove(&entity.id); }
        }
    }

    pub fn trash_len(&self) -> usize {
        self.read().trash.len()
    }
}

#[async_trait]
impl FolderApi for InMemBackend {
    async fn list_folders(&self, parent_id: &str) -> ApiResult<Vec<Folder>> {
        let delay = self.read().latency.get(parent_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let s = self.read();
        let mut v: Vec<_> = s
            .folders
            .values()
            .filter(|f| f.parent_id.as_deref().unwrap_or(DEFAULT_ROOT_FOLDER_ID) == parent_id)
            .filter(|f| !s.is_trashed(ContentKind::Folder, &f.id))
            .cloned()
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }
    async fn get_folder(&self, id: &str) -> ApiResult<Folder> {
        let s = self.read();
        if s.is_trashed(ContentKind::Folder, id) { return Err(ApiError::NotFound); }
        s.folders.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn get_folder_from_trash(&self, id: &str) -> ApiResult<Folder> {
        let s = self.read();
        if !s.is_trashed(ContentKind::Folder, id) { return Err(ApiError::NotFound); }
        s.folders.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn create_folder(&self, new: NewFolder) -> ApiResult<Folder> {
        let mut s = self.write();
        if s.folders.values().any(|f| f.parent_id == new.parent_id && f.name == new.name) {
            return Err(ApiError::Conflict);
        }
        let now = Utc::now();
        let folder = Folder {
            id: s.next_id("folder-"),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
            created_by: new.created_by,
            parent_id: new.parent_id,
        };
        s.folders.insert(folder.id.clone(), folder.clone());
        Ok(folder)
    }
    async fn update_folder(&self, id: &str, upd: UpdateFolder) -> ApiResult<Folder> {
        let mut s = self.write();
        let folder = s.folders.get_mut(id).ok_or(ApiError::NotFound)?;
        if let Some(name) = upd.name { folder.name = name; }
        if let Some(desc) = upd.description { folder.description = Some(desc); }
        folder.updated_at = Utc::now();
        Ok(folder.clone())
    }
    async fn trash_folder(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.write().soft_delete(EntityRef::folder(id), user_id)
    }
}

#[async_trait]
impl ThemeApi for InMemBackend {
    async fn list_themes(&self, folder_id: &str, user_id: &str) -> ApiResult<ThemeListing> {
        let s = self.read();
        let mut listing = ThemeListing::default();
        for t in s.themes.values() {
            if t.folder_id != folder_id || s.is_trashed(ContentKind::Theme, &t.id) { continue; }
            if !t.is_draft {
                listing.content.push(t.clone());
            } else if t.author.id() == user_id {
                listing.draft.push(t.clone());
            }
        }
        listing.content.sort_by(|a, b| a.title.cmp(&b.title));
        listing.draft.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(listing)
    }
    async fn get_theme(&self, id: &str) -> ApiResult<Theme> {
        let s = self.read();
        if s.is_trashed(ContentKind::Theme, id) { return Err(ApiError::NotFound); }
        s.themes.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn get_theme_from_trash(&self, id: &str) -> ApiResult<Theme> {
        let s = self.read();
        if !s.is_trashed(ContentKind::Theme, id) { return Err(ApiError::NotFound); }
        s.themes.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn create_theme(&self, payload: ThemePayload) -> ApiResult<Theme> {
        let mut s = self.write();
        let id = s.next_id("theme-");
        let theme = s.theme_from_payload(id, payload, Utc::now());
        s.themes.insert(theme.id.clone(), theme.clone());
        Ok(theme)
    }
    async fn update_theme(&self, id: &str, payload: ThemePayload) -> ApiResult<Theme> {
        let mut s = self.write();
        let created_at = s.themes.get(id).ok_or(ApiError::NotFound)?.created_at;
        let theme = s.theme_from_payload(id.to_string(), payload, created_at);
        s.themes.insert(theme.id.clone(), theme.clone());
        Ok(theme)
    }
    async fn trash_theme(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.write().soft_delete(EntityRef::theme(id), user_id)
    }
}

#[async_trait]
impl FileApi for InMemBackend {
    async fn upload_files(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<UploadResult> {
        let stored = self.write().store_uploads(files, folder_id, user_id);
        Ok(UploadResult { files: stored })
    }
    async fn upload_for_theme(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<ThemeUploadResult> {
        let stored = self.write().store_uploads(files, folder_id, user_id);
        Ok(ThemeUploadResult { array_file: stored.into_iter().map(|f| (f.id, f.name)).collect() })
    }
    async fn list_files(&self, folder_id: &str) -> ApiResult<Vec<File>> {
        let s = self.read();
        let mut v: Vec<_> = s
            .files
            .values()
            .filter(|f| f.folder_id.as_deref() == Some(folder_id))
            .filter(|f| !s.is_trashed(ContentKind::File, &f.id))
            .cloned()
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }
    async fn get_file(&self, id: &str) -> ApiResult<File> {
        let s = self.read();
        if s.is_trashed(ContentKind::File, id) { return Err(ApiError::NotFound); }
        s.files.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn get_file_from_trash(&self, id: &str) -> ApiResult<File> {
        let s = self.read();
        if !s.is_trashed(ContentKind::File, id) { return Err(ApiError::NotFound); }
        s.files.get(id).cloned().ok_or(ApiError::NotFound)
    }
    async fn update_file(&self, id: &str, upd: UpdateFile) -> ApiResult<File> {
        let mut s = self.write();
        let file = s.files.get_mut(id).ok_or(ApiError::NotFound)?;
        if let Some(name) = upd.name { file.name = name; }
        file.updated_at = Utc::now();
        Ok(file.clone())
    }
    async fn delete_file(&self, id: &str) -> ApiResult<()> {
        self.write().files.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }
    async fn trash_file(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.write().soft_delete(EntityRef::file(id), user_id)
    }
    async fn generate_video_token(&self) -> ApiResult<VideoToken> {
        let token = uuid::Uuid::new_v4().to_string();
        self.write().video_tokens.insert(token.clone());
        Ok(VideoToken { token })
    }
    async fn consume_video_token(&self, token: &str) -> ApiResult<TokenConsumption> {
        let removed = self.write().video_tokens.remove(token);
        Ok(TokenConsumption { error: (!removed).then(|| "token already used or unknown".to_string()) })
    }
}

#[async_trait]
impl FavoritesApi for InMemBackend {
    async fn add_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()> {
        let mut s = self.write();
        let set = s.favorites.entry(user_id.to_string()).or_default();
        if !set.ids_mut(kind).insert(id.to_string()) {
            return Err(ApiError::Conflict);
        }
        Ok(())
    }
    async fn remove_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()> {
        let mut s = self.write();
        let set = s.favorites.entry(user_id.to_string()).or_default();
        if !set.ids_mut(kind).remove(id) {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
    async fn favorites_by_user(&self, user_id: &str) -> ApiResult<FavoriteSet> {
        Ok(self.read().favorites.get(user_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl TrashApi for InMemBackend {
    async fn list_trash(&self, user_id: &str) -> ApiResult<Vec<TrashRecord>> {
        let s = self.read();
        let mut v: Vec<_> = s.trash.values().filter(|r| r.user_id == user_id).cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(v)
    }
    async fn restore(&self, trash_id: &str) -> ApiResult<()> {
        let mut s = self.write();
        let record = s.trash.remove(trash_id).ok_or(ApiError::NotFound)?;
        s.trashed.remove(&record.original());
        Ok(())
    }
    async fn delete_permanently(&self, trash_id: &str) -> ApiResult<()> {
        let mut s = self.write();
        let record = s.trash.remove(trash_id).ok_or(ApiError::NotFound)?;
        let entity = record.original();
        s.trashed.remove(&entity);
        match entity.kind {
            ContentKind::Folder => { s.folders.remove(&entity.id); }
            ContentKind::Theme => { s.themes.remove(&entity.id); }
            ContentKind::File => { s.files.remove(&entity.id); }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentApi for InMemBackend {
    async fn content_by_user(&self, user_id: &str) -> ApiResult<UserContent> {
        let s = self.read();
        let mut out = UserContent {
            folders: s.folders.values()
                .filter(|f| f.created_by == user_id && !s.is_trashed(ContentKind::Folder, &f.id))
                .cloned().collect(),
            themes: s.themes.values()
                .filter(|t| t.author.id() == user_id && !s.is_trashed(ContentKind::Theme, &t.id))
                .cloned().collect(),
            files: s.files.values()
                .filter(|f| f.created_by.as_deref() == Some(user_id) && !s.is_trashed(ContentKind::File, &f.id))
                .cloned().collect(),
        };
        out.folders.sort_by(|a, b| a.name.cmp(&b.name));
        out.themes.sort_by(|a, b| a.title.cmp(&b.title));
        out.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[async_trait]
impl CommentApi for InMemBackend {
    async fn list_comments(&self, theme_id: &str) -> ApiResult<Vec<Comment>> {
        let s = self.read();
        let mut v: Vec<_> = s.comments.values().filter(|c| c.theme_id == theme_id).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(v)
    }
    async fn create_comment(&self, new: NewComment) -> ApiResult<Comment> {
        let mut s = self.write();
        if !s.themes.contains_key(&new.theme_id) { return Err(ApiError::NotFound); }
        let comment = Comment {
            id: s.next_id("comment-"),
            message: new.message,
            author: AuthorRef::Id(new.author),
            theme_id: new.theme_id,
            created_at: Utc::now(),
        };
        s.comments.insert(comment.id.clone(), comment.clone());
        Ok(comment)
    }
    async fn delete_comment(&self, id: &str) -> ApiResult<()> {
        self.write().comments.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }
}

#[async_trait]
impl CatalogApi for InMemBackend {
    async fn list_areas(&self) -> ApiResult<Vec<Area>> {
        Ok(self.read().areas.clone())
    }
    async fn list_positions(&self, area_ids: &[Id]) -> ApiResult<Vec<Position>> {
        let wanted: BTreeSet<&Id> = area_ids.iter().collect();
        Ok(self.read().positions.iter().filter(|p| wanted.contains(&p.area_id)).cloned().collect())
    }
    async fn list_ai_models(&self) -> ApiResult<Vec<AiModel>> {
        let mut v: Vec<_> = self.read().ai_models.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }
    async fn create_ai_model(&self, input: AiModelInput) -> ApiResult<AiModel> {
        let mut s = self.write();
        if s.ai_models.values().any(|m| m.name == input.name) { return Err(ApiError::Conflict); }
        let model = AiModel {
            id: s.next_id("model-"),
            name: input.name,
            description: input.description,
            application_id: input.application_id,
        };
        s.ai_models.insert(model.id.clone(), model.clone());
        Ok(model)
    }
    async fn update_ai_model(&self, id: &str, input: AiModelInput) -> ApiResult<AiModel> {
        let mut s = self.write();
        let model = s.ai_models.get_mut(id).ok_or(ApiError::NotFound)?;
        model.name = input.name;
        model.description = input.description;
        model.application_id = input.application_id;
        Ok(model.clone())
    }
    async fn delete_ai_model(&self, id: &str) -> ApiResult<()> {
        let mut s = self.write();
        s.ai_models.remove(id).ok_or(ApiError::NotFound)?;
        s.sections.retain(|_, sec| sec.ai_model_id != id);
        Ok(())
    }
    async fn list_sections(&self, model_ids: &[Id]) -> ApiResult<Vec<Section>> {
        let wanted: BTreeSet<&Id> = model_ids.iter().collect();
        let mut v: Vec<_> = self.read().sections.values().filter(|sec| wanted.contains(&sec.ai_model_id)).cloned().collect();
        v.sort_by(|a, b| a.ai_model_id.cmp(&b.ai_model_id).then_with(|| a.name.cmp(&b.name)));
        Ok(v)
    }
    async fn create_section(&self, input: SectionInput) -> ApiResult<Section> {
        let mut s = self.write();
        if !s.ai_models.contains_key(&input.ai_model_id) { return Err(ApiError::NotFound); }
        let section = Section { id: s.next_id("section-"), name: input.name, ai_model_id: input.ai_model_id };
        s.sections.insert(section.id.clone(), section.clone());
        Ok(section)
    }
    async fn update_section(&self, id: &str, input: SectionInput) -> ApiResult<Section> {
        let mut s = self.write();
        let section = s.sections.get_mut(id).ok_or(ApiError::NotFound)?;
        section.name = input.name;
        section.ai_model_id = input.ai_model_id;
        Ok(section.clone())
    }
    async fn delete_section(&self, id: &str) -> ApiResult<()> {
        self.write().sections.remove(id).map(|_| ()).ok_or(ApiError::NotFound)
    }
    async fn list_applications(&self) -> ApiResult<Vec<Application>> {
        Ok(self.read().applications.clone())
    }
}

#[async_trait]
impl AuthApi for InMemBackend {
    async fn validate_token(&self, token: &str) -> ApiResult<TokenValidation> {
        Ok(match self.read().tokens.get(token) {
            Some(user) => TokenValidation { success: true, user_id: Some(user.clone()), message: None },
            None => TokenValidation { success: false, user_id: None, message: Some("invalid token".into()) },
        })
    }
}

#[async_trait]
impl ChatApi for InMemBackend {
    async fn ask(&self, question: &str, _section_ids: &[Id]) -> ApiResult<ChatAnswer> {
        self.read().answers.get(question).cloned().ok_or(ApiError::NotFound)
    }
}
