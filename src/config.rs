use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROOT_FOLDER_ID: &str = "root";
pub const DEFAULT_ROOT_FOLDER_NAME: &str = "Inicio";
const DEFAULT_STORE_PATH: &str = "data/local_store.json";

/// Client settings derived from env.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: Option<String>,
    pub root_folder_id: String,
    pub root_folder_name: String,
    pub store_path: PathBuf,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            root_folder_id: DEFAULT_ROOT_FOLDER_ID.into(),
            root_folder_name: DEFAULT_ROOT_FOLDER_NAME.into(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        fn str_env(name: &str) -> Option<String> { std::env::var(name).ok().filter(|v| !v.trim().is_empty()) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        let d = Self::default();
        Self {
            api_base_url: str_env("KB_API_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            root_folder_id: str_env("KB_ROOT_FOLDER_ID").unwrap_or(d.root_folder_id),
            root_folder_name: str_env("KB_ROOT_FOLDER_NAME").unwrap_or(d.root_folder_name),
            store_path: str_env("KB_STORE_PATH").map(PathBuf::from).unwrap_or(d.store_path),
            http_timeout: dur_env("KB_HTTP_TIMEOUT_SECS", 30),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }
}
