//! Client core for the knowledge base: typed gateways over the REST API and
//! the navigation, favorites, trash, content and form state built on them.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod content;
pub mod error;
pub mod favorites;
pub mod form;
pub mod models;
pub mod nav;
pub mod route;
pub mod store;
pub mod trash;
pub mod workspace;

// Re-export commonly used items for tests / external users
pub use api::http::HttpBackend;
#[cfg(feature = "inmem-backend")]
pub use api::inmem::InMemBackend;
pub use api::Backend;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, KbError, KbResult};
pub use workspace::{ContentActions, ViewContent, ViewState, Workspace};
