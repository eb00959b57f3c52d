//! Typed gateways over the knowledge-base REST API.
//!
//! One async trait per resource; every method maps to exactly one endpoint,
//! with no caching or retry. [`Backend`] bundles them so state machines can
//! hold a single `Arc<dyn Backend>`.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::*;

pub mod http;
#[cfg(feature = "inmem-backend")]
pub mod inmem;

#[async_trait]
pub trait FolderApi: Send + Sync {
    async fn list_folders(&self, parent_id: &str) -> ApiResult<Vec<Folder>>;
    async fn get_folder(&self, id: &str) -> ApiResult<Folder>;
    async fn get_folder_from_trash(&self, id: &str) -> ApiResult<Folder>;
    async fn create_folder(&self, new: NewFolder) -> ApiResult<Folder>;
    async fn update_folder(&self, id: &str, upd: UpdateFolder) -> ApiResult<Folder>;
    async fn trash_folder(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord>;
}

#[async_trait]
pub trait ThemeApi: Send + Sync {
    async fn list_themes(&self, folder_id: &str, user_id: &str) -> ApiResult<ThemeListing>;
    async fn get_theme(&self, id: &str) -> ApiResult<Theme>;
    async fn get_theme_from_trash(&self, id: &str) -> ApiResult<Theme>;
    async fn create_theme(&self, payload: ThemePayload) -> ApiResult<Theme>;
    async fn update_theme(&self, id: &str, payload: ThemePayload) -> ApiResult<Theme>;
    async fn trash_theme(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord>;
}

#[async_trait]
pub trait FileApi: Send + Sync {
    async fn upload_files(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<UploadResult>;
    async fn upload_for_theme(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<ThemeUploadResult>;
    async fn list_files(&self, folder_id: &str) -> ApiResult<Vec<File>>;
    async fn get_file(&self, id: &str) -> ApiResult<File>;
    async fn get_file_from_trash(&self, id: &str) -> ApiResult<File>;
    async fn update_file(&self, id: &str, upd: UpdateFile) -> ApiResult<File>;
    async fn delete_file(&self, id: &str) -> ApiResult<()>;
    async fn trash_file(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord>;
    async fn generate_video_token(&self) -> ApiResult<VideoToken>;
    async fn consume_video_token(&self, token: &str) -> ApiResult<TokenConsumption>;
}

#[async_trait]
pub trait FavoritesApi: Send + Sync {
    async fn add_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()>;
    async fn remove_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()>;
    async fn favorites_by_user(&self, user_id: &str) -> ApiResult<FavoriteSet>;
}

#[async_trait]
pub trait TrashApi: Send + Sync {
    async fn list_trash(&self, user_id: &str) -> ApiResult<Vec<TrashRecord>>;
    async fn restore(&self, trash_id: &str) -> ApiResult<()>;
    async fn delete_permanently(&self, trash_id: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn content_by_user(&self, user_id: &str) -> ApiResult<UserContent>;
}

#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn list_comments(&self, theme_id: &str) -> ApiResult<Vec<Comment>>;
    async fn create_comment(&self, new: NewComment) -> ApiResult<Comment>;
    async fn delete_comment(&self, id: &str) -> ApiResult<()>;
}

/// Areas, positions, AI models, sections and the application menu.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_areas(&self) -> ApiResult<Vec<Area>>;
    async fn list_positions(&self, area_ids: &[Id]) -> ApiResult<Vec<Position>>;
    async fn list_ai_models(&self) -> ApiResult<Vec<AiModel>>;
    async fn create_ai_model(&self, input: AiModelInput) -> ApiResult<AiModel>;
    async fn update_ai_model(&self, id: &str, input: AiModelInput) -> ApiResult<AiModel>;
    async fn delete_ai_model(&self, id: &str) -> ApiResult<()>;
    async fn list_sections(&self, model_ids: &[Id]) -> ApiResult<Vec<Section>>;
    async fn create_section(&self, input: SectionInput) -> ApiResult<Section>;
    async fn update_section(&self, id: &str, input: SectionInput) -> ApiResult<Section>;
    async fn delete_section(&self, id: &str) -> ApiResult<()>;
    async fn list_applications(&self) -> ApiResult<Vec<Application>>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn validate_token(&self, token: &str) -> ApiResult<TokenValidation>;
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn ask(&self, question: &str, section_ids: &[Id]) -> ApiResult<ChatAnswer>;
}

pub trait Backend:
    FolderApi + ThemeApi + FileApi + FavoritesApi + TrashApi + ContentApi + CommentApi + CatalogApi + AuthApi + ChatApi
{
}

impl<T> Backend for T where
    T: FolderApi + ThemeApi + FileApi + FavoritesApi + TrashApi + ContentApi + CommentApi + CatalogApi + AuthApi + ChatApi
{
}

/// Fetch the entity a reference points at through the normal endpoints.
pub async fn fetch_content<B: Backend + ?Sized>(backend: &B, entity: &EntityRef) -> ApiResult<Content> {
    Ok(match entity.kind {
        ContentKind::Folder => Content::Folder(backend.get_folder(&entity.id).await?),
        ContentKind::Theme => Content::Theme(backend.get_theme(&entity.id).await?),
        ContentKind::File => Content::File(backend.get_file(&entity.id).await?),
    })
}

/// Fetch the entity behind a trash record through the trash-scoped endpoints.
pub async fn fetch_trashed_content<B: Backend + ?Sized>(backend: &B, record: &TrashRecord) -> ApiResult<Content> {
    let id = record.original_id.as_str();
    Ok(match record.content_type {
        ContentKind::Folder => Content::Folder(backend.get_folder_from_trash(id).await?),
        ContentKind::Theme => Content::Theme(backend.get_theme_from_trash(id).await?),
        ContentKind::File => Content::File(backend.get_file_from_trash(id).await?),
    })
}

/// Soft-delete any entity kind.
pub async fn trash_entity<B: Backend + ?Sized>(backend: &B, entity: &EntityRef, user_id: &str) -> ApiResult<TrashRecord> {
    match entity.kind {
        ContentKind::Folder => backend.trash_folder(&entity.id, user_id).await,
        ContentKind::Theme => backend.trash_theme(&entity.id, user_id).await,
        ContentKind::File => backend.trash_file(&entity.id, user_id).await,
    }
}
