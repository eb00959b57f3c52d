use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use super::*;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// reqwest-backed implementation of every gateway trait.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base: impl Into<String>) -> Self {
        Self { client: Client::new(), base: base.into().trim_end_matches('/').to_string() }
    }

    pub fn from_config(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let base = cfg
            .api_base_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("KB_API_BASE_URL must be set"))?;
        let client = Client::builder().timeout(cfg.http_timeout).build()?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn ids_param(ids: &[Id]) -> String {
        ids.iter().map(|i| urlencoding::encode(i).into_owned()).collect::<Vec<_>>().join(",")
    }

    async fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send().await.map_err(|e| {
            error!("request failed: {e}");
            ApiError::from(e)
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "backend rejected request");
        Err(ApiError::from_status(status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let resp = self.send(req).await?;
        resp.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        debug!("GET {path}");
        self.json(self.client.get(self.url(path))).await
    }

    async fn post<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        debug!("POST {path}");
        self.json(self.client.post(self.url(path)).json(body)).await
    }

    async fn put<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        debug!("PUT {path}");
        self.json(self.client.put(self.url(path)).json(body)).await
    }

    // POST whose response body is ignored
    async fn post_unit<B: Serialize + ?Sized + Sync>(&self, path: &str, body: &B) -> ApiResult<()> {
        debug!("POST {path}");
        self.send(self.client.post(self.url(path)).json(body)).await.map(|_| ())
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        debug!("DELETE {path}");
        self.send(self.client.delete(self.url(path))).await.map(|_| ())
    }

    fn upload_form(files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<Form> {
        let mut form = Form::new()
            .text("folder_id", folder_id.to_string())
            .text("user_id", user_id.to_string());
        for f in files {
            let mime = f.resolved_mime();
            let part = Part::bytes(f.bytes)
                .file_name(f.name)
                .mime_str(&mime)
                .map_err(|e| ApiError::Network(format!("invalid mime {mime}: {e}")))?;
            form = form.part("files", part);
        }
        Ok(form)
    }
}

fn enc(s: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(s)
}

#[async_trait]
impl FolderApi for HttpBackend {
    async fn list_folders(&self, parent_id: &str) -> ApiResult<Vec<Folder>> {
        self.get(&format!("/folders?parent_id={}", enc(parent_id))).await
    }
    async fn get_folder(&self, id: &str) -> ApiResult<Folder> {
        self.get(&format!("/folders/{}", enc(id))).await
    }
    async fn get_folder_from_trash(&self, id: &str) -> ApiResult<Folder> {
        self.get(&format!("/folders/trash/{}", enc(id))).await
    }
    async fn create_folder(&self, new: NewFolder) -> ApiResult<Folder> {
        self.post("/folders", &new).await
    }
    async fn update_folder(&self, id: &str, upd: UpdateFolder) -> ApiResult<Folder> {
        self.put(&format!("/folders/{}", enc(id)), &upd).await
    }
    async fn trash_folder(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.post(&format!("/folders/{}/trash", enc(id)), &json!({ "user_id": user_id })).await
    }
}

#[async_trait]
impl ThemeApi for HttpBackend {
    async fn list_themes(&self, folder_id: &str, user_id: &str) -> ApiResult<ThemeListing> {
        self.get(&format!("/themes/folder/{}?user_id={}", enc(folder_id), enc(user_id))).await
    }
    async fn get_theme(&self, id: &str) -> ApiResult<Theme> {
        self.get(&format!("/themes/{}", enc(id))).await
    }
    async fn get_theme_from_trash(&self, id: &str) -> ApiResult<Theme> {
        self.get(&format!("/themes/trash/{}", enc(id))).await
    }
    async fn create_theme(&self, payload: ThemePayload) -> ApiResult<Theme> {
        self.post("/themes", &payload).await
    }
    async fn update_theme(&self, id: &str, payload: ThemePayload) -> ApiResult<Theme> {
        self.put(&format!("/themes/{}", enc(id)), &payload).await
    }
    async fn trash_theme(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.post(&format!("/themes/{}/trash", enc(id)), &json!({ "user_id": user_id })).await
    }
}

#[async_trait]
impl FileApi for HttpBackend {
    async fn upload_files(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<UploadResult> {
        let form = Self::upload_form(files, folder_id, user_id)?;
        debug!("POST /files/upload");
        self.json(self.client.post(self.url("/files/upload")).multipart(form)).await
    }
    async fn upload_for_theme(&self, files: Vec<UploadFile>, folder_id: &str, user_id: &str) -> ApiResult<ThemeUploadResult> {
        let form = Self::upload_form(files, folder_id, user_id)?;
        debug!("POST /files/upload-theme");
        self.json(self.client.post(self.url("/files/upload-theme")).multipart(form)).await
    }
    async fn list_files(&self, folder_id: &str) -> ApiResult<Vec<File>> {
        self.get(&format!("/files/folder/{}", enc(folder_id))).await
    }
    async fn get_file(&self, id: &str) -> ApiResult<File> {
        self.get(&format!("/files/{}", enc(id))).await
    }
    async fn get_file_from_trash(&self, id: &str) -> ApiResult<File> {
        self.get(&format!("/files/trash/{}", enc(id))).await
    }
    async fn update_file(&self, id: &str, upd: UpdateFile) -> ApiResult<File> {
        self.put(&format!("/files/{}", enc(id)), &upd).await
    }
    async fn delete_file(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("/files/{}", enc(id))).await
    }
    async fn trash_file(&self, id: &str, user_id: &str) -> ApiResult<TrashRecord> {
        self.post(&format!("/files/{}/trash", enc(id)), &json!({ "user_id": user_id })).await
    }
    async fn generate_video_token(&self) -> ApiResult<VideoToken> {
        self.post("/files/video-token", &json!({})).await
    }
    async fn consume_video_token(&self, token: &str) -> ApiResult<TokenConsumption> {
        self.post("/files/video-token/consume", &json!({ "token": token })).await
    }
}

#[async_trait]
impl FavoritesApi for HttpBackend {
    async fn add_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()> {
        self.post_unit(&format!("/favorites/{}", kind.collection()), &json!({ "user_id": user_id, "id": id })).await
    }
    async fn remove_favorite(&self, kind: ContentKind, user_id: &str, id: &str) -> ApiResult<()> {
        self.delete(&format!("/favorites/{}/{}/{}", kind.collection(), enc(user_id), enc(id))).await
    }
    async fn favorites_by_user(&self, user_id: &str) -> ApiResult<FavoriteSet> {
        self.get(&format!("/favorites/user/{}", enc(user_id))).await
    }
}

#[async_trait]
impl TrashApi for HttpBackend {
    async fn list_trash(&self, user_id: &str) -> ApiResult<Vec<TrashRecord>> {
        self.get(&format!("/trash/user/{}", enc(user_id))).await
    }
    async fn restore(&self, trash_id: &str) -> ApiResult<()> {
        self.post_unit(&format!("/trash/{}/restore", enc(trash_id)), &json!({})).await
    }
    async fn delete_permanently(&self, trash_id: &str) -> ApiResult<()> {
        self.delete(&format!("/trash/{}", enc(trash_id))).await
    }
}

#[async_trait]
impl ContentApi for HttpBackend {
    async fn content_by_user(&self, user_id: &str) -> ApiResult<UserContent> {
        self.get(&format!("/content/user/{}", enc(user_id))).await
    }
}

#[async_trait]
impl CommentApi for HttpBackend {
    async fn list_comments(&self, theme_id: &str) -> ApiResult<Vec<Comment>> {
        self.get(&format!("/comments/theme/{}", enc(theme_id))).await
    }
    async fn create_comment(&self, new: NewComment) -> ApiResult<Comment> {
        self.post("/comments", &new).await
    }
    async fn delete_comment(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("/comments/{}", enc(id))).await
    }
}

#[async_trait]
impl CatalogApi for HttpBackend {
    async fn list_areas(&self) -> ApiResult<Vec<Area>> {
        self.get("/areas").await
    }
    async fn list_positions(&self, area_ids: &[Id]) -> ApiResult<Vec<Position>> {
        self.get(&format!("/positions?areas={}", Self::ids_param(area_ids))).await
    }
    async fn list_ai_models(&self) -> ApiResult<Vec<AiModel>> {
        self.get("/ai-models").await
    }
    async fn create_ai_model(&self, input: AiModelInput) -> ApiResult<AiModel> {
        self.post("/ai-models", &input).await
    }
    async fn update_ai_model(&self, id: &str, input: AiModelInput) -> ApiResult<AiModel> {
        self.put(&format!("/ai-models/{}", enc(id)), &input).await
    }
    async fn delete_ai_model(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("/ai-models/{}", enc(id))).await
    }
    async fn list_sections(&self, model_ids: &[Id]) -> ApiResult<Vec<Section>> {
        self.get(&format!("/sections?models={}", Self::ids_param(model_ids))).await
    }
    async fn create_section(&self, input: SectionInput) -> ApiResult<Section> {
        self.post("/sections", &input).await
    }
    async fn update_section(&self, id: &str, input: SectionInput) -> ApiResult<Section> {
        self.put(&format!("/sections/{}", enc(id)), &input).await
    }
    async fn delete_section(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("/sections/{}", enc(id))).await
    }
    async fn list_applications(&self) -> ApiResult<Vec<Application>> {
        self.get("/applications").await
    }
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn validate_token(&self, token: &str) -> ApiResult<TokenValidation> {
        self.post("/auth/validate", &json!({ "token": token })).await
    }
}

#[async_trait]
impl ChatApi for HttpBackend {
    async fn ask(&self, question: &str, section_ids: &[Id]) -> ApiResult<ChatAnswer> {
        self.post("/chatbot/ask", &json!({ "question": question, "section_ids": section_ids })).await
    }
}
