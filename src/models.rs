use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Backend ids are opaque strings
pub type Id = String;

/// Retention window documented for trash records.
pub const TRASH_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Id,
    #[serde(default)]
    pub parent_id: Option<Id>, // None for children of the root container
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFolder {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Id>,
    pub created_by: Id,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFolder {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Theme priority, encoded as `0/1/2` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Baja",
            Priority::Normal => "Normal",
            Priority::High => "Alta",
        }
    }

    /// Resolve a select-box label back into a priority.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        match p {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            other => Err(format!("invalid priority {other}")),
        }
    }
}

/// Author as returned by the backend: either a bare id or an expanded user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorRef {
    Id(Id),
    Expanded {
        id: Id,
        first_name: String,
        last_name: String,
    },
}

impl AuthorRef {
    pub fn id(&self) -> &str {
        match self {
            AuthorRef::Id(id) => id,
            AuthorRef::Expanded { id, .. } => id,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            AuthorRef::Id(id) => id.clone(),
            AuthorRef::Expanded { first_name, last_name, .. } => {
                format!("{first_name} {last_name}").trim().to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: Id,
    pub title: String,
    pub description: String, // rich-text HTML
    pub priority: Priority,
    pub folder_id: Id,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub author: AuthorRef,
    #[serde(default)]
    pub areas: Vec<Id>,
    #[serde(default)]
    pub positions: Vec<Id>,
    #[serde(default)]
    pub files: Vec<Id>,
    #[serde(default)]
    pub ai_models: Vec<Id>,
    #[serde(default)]
    pub sections: Vec<Id>,
    #[serde(default)]
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body sent on theme create/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemePayload {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub folder_id: Id,
    pub keywords: Vec<String>,
    pub author: Id,
    pub areas: Vec<Id>,
    pub positions: Vec<Id>,
    pub files: Vec<Id>,
    pub ai_models: Vec<Id>,
    pub sections: Vec<Id>,
    pub is_draft: bool,
}

/// `listByFolder` splits published themes from the caller's drafts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeListing {
    #[serde(default)]
    pub content: Vec<Theme>,
    #[serde(default)]
    pub draft: Vec<Theme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub mime: Option<String>,
    pub path: String, // storage URL
    #[serde(default)]
    pub folder_id: Option<Id>,
    #[serde(default)]
    pub created_by: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFile {
    pub name: Option<String>,
}

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), mime: None, bytes }
    }

    /// Declared mime, else sniffed from content, else octet-stream.
    pub fn resolved_mime(&self) -> String {
        self.mime.clone().unwrap_or_else(|| {
            infer::get(&self.bytes)
                .map(|t| t.mime_type().to_string())
                .unwrap_or_else(|| "application/octet-stream".into())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub files: Vec<File>,
}

/// `uploadForTheme` answers with `[id, name]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeUploadResult {
    #[serde(default)]
    pub array_file: Vec<(Id, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoToken {
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenConsumption {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    Folder,
    Theme,
    File,
}

impl ContentKind {
    pub fn noun(self) -> &'static str {
        match self {
            ContentKind::Folder => "folder",
            ContentKind::Theme => "theme",
            ContentKind::File => "file",
        }
    }

    // path segment used by the favorites endpoints
    pub fn collection(self) -> &'static str {
        match self {
            ContentKind::Folder => "folders",
            ContentKind::Theme => "themes",
            ContentKind::File => "files",
        }
    }
}

/// A folder, theme or file; consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Content {
    Folder(Folder),
    Theme(Theme),
    File(File),
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Folder(_) => ContentKind::Folder,
            Content::Theme(_) => ContentKind::Theme,
            Content::File(_) => ContentKind::File,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Content::Folder(f) => &f.id,
            Content::Theme(t) => &t.id,
            Content::File(f) => &f.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Content::Folder(f) => &f.name,
            Content::Theme(t) => &t.title,
            Content::File(f) => &f.name,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef { kind: self.kind(), id: self.id().to_string() }
    }
}

/// Lightweight typed reference to a folder, theme or file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: ContentKind,
    pub id: Id,
}

impl EntityRef {
    pub fn folder(id: impl Into<Id>) -> Self {
        Self { kind: ContentKind::Folder, id: id.into() }
    }
    pub fn theme(id: impl Into<Id>) -> Self {
        Self { kind: ContentKind::Theme, id: id.into() }
    }
    pub fn file(id: impl Into<Id>) -> Self {
        Self { kind: ContentKind::File, id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashRecord {
    pub id: Id,
    pub content_type: ContentKind,
    pub original_id: Id,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Id,
}

impl TrashRecord {
    /// Moment the backend may purge the record.
    pub fn purge_at(&self) -> DateTime<Utc> {
        self.expires_at
            .unwrap_or_else(|| self.created_at + Duration::days(TRASH_RETENTION_DAYS))
    }

    pub fn days_until_purge(&self, now: DateTime<Utc>) -> i64 {
        (self.purge_at() - now).num_days().max(0)
    }

    pub fn original(&self) -> EntityRef {
        EntityRef { kind: self.content_type, id: self.original_id.clone() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteSet {
    #[serde(default)]
    pub folders: std::collections::BTreeSet<Id>,
    #[serde(default)]
    pub themes: std::collections::BTreeSet<Id>,
    #[serde(default)]
    pub files: std::collections::BTreeSet<Id>,
}

impl FavoriteSet {
    pub fn ids(&self, kind: ContentKind) -> &std::collections::BTreeSet<Id> {
        match kind {
            ContentKind::Folder => &self.folders,
            ContentKind::Theme => &self.themes,
            ContentKind::File => &self.files,
        }
    }

    pub fn ids_mut(&mut self, kind: ContentKind) -> &mut std::collections::BTreeSet<Id> {
        match kind {
            ContentKind::Folder => &mut self.folders,
            ContentKind::Theme => &mut self.themes,
            ContentKind::File => &mut self.files,
        }
    }

    pub fn contains(&self, kind: ContentKind, id: &str) -> bool {
        self.ids(kind).contains(id)
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.themes.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub message: String,
    pub author: AuthorRef,
    pub theme_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub message: String,
    pub author: Id,
    pub theme_id: Id,
}

/// Everything a user created, across the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContent {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub files: Vec<File>,
}

// ── catalog (admin-configured) ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Id,
    pub name: String,
    pub area_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub application_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiModelInput {
    pub name: String,
    pub description: Option<String>,
    pub application_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Id,
    pub name: String,
    pub ai_model_id: Id,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionInput {
    pub name: String,
    pub ai_model_id: Id,
}

/// Application menu entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub success: bool,
    #[serde(default)]
    pub user_id: Option<Id>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSource {
    pub title: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub theme_id: Option<Id>,
}
