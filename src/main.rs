use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use kbase::auth::{AuthGate, AuthState};
use kbase::chat::ChatSession;
use kbase::models::{ContentKind, EntityRef};
use kbase::store::{FileStore, LocalStore, SessionStore};
use kbase::{Backend, ClientConfig, ContentActions, HttpBackend, Workspace};

/// Knowledge-base client
#[derive(Parser, Debug)]
#[command(name = "kb", version, about, long_about = None)]
struct Cli {
    /// Base URL of the knowledge-base API
    #[arg(long, global = true, env = "KB_API_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a URL (`/`, `/folder/{id}`, `/favoritos`, ...) and print its view
    Open { url: String },
    /// Validate a token and remember the resolved user id
    Login { token: String },
    /// Forget the stored user id
    Logout,
    /// Toggle a favorite
    Favorite { kind: KindArg, id: String },
    /// Inspect and manage the trash
    Trash {
        #[command(subcommand)]
        action: TrashAction,
    },
    /// Ask the chatbot
    Ask {
        question: String,
        /// Restrict answers to these sections
        #[arg(long = "section")]
        sections: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TrashAction {
    List,
    Restore { record_id: String },
    /// Delete one trashed item permanently
    Delete {
        record_id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Delete every trashed item permanently
    Empty {
        /// Confirm the permanent deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Folder,
    Theme,
    File,
}

impl From<KindArg> for ContentKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Folder => ContentKind::Folder,
            KindArg::Theme => ContentKind::Theme,
            KindArg::File => ContentKind::File,
        }
    }
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // logs go to stderr; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }

    let http = Arc::new(HttpBackend::from_config(&config)?);
    let backend: Arc<dyn Backend> = http.clone();
    let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(config.store_path.clone()));
    let session = SessionStore::new(store.clone());
    info!(store = %config.store_path.display(), "kb client ready");

    let workspace = || Workspace::new(backend.clone(), &config, store.clone(), session.user_id());

    match cli.command {
        Command::Login { token } => {
            let mut gate = AuthGate::new(http.clone(), session.clone());
            let state = gate.validate(&token).await.clone();
            emit(&state)?;
            if let AuthState::Failed { message } = state {
                bail!("validation failed: {message}");
            }
        }
        Command::Logout => {
            session.clear().context("clearing stored user id")?;
            emit(&json!({ "logged_out": true }))?;
        }
        Command::Ask { question, sections } => {
            let mut chat = ChatSession::new(http.clone()).with_sections(sections);
            chat.ask(&question).await;
            emit(&chat.turns())?;
        }
        Command::Open { url } => emit(&workspace().open(&url).await)?,
        Command::Favorite { kind, id } => {
            let entity = EntityRef { kind: kind.into(), id };
            let member = workspace().toggle_favorite(&entity).await?;
            emit(&json!({ "kind": entity.kind, "id": entity.id, "favorite": member }))?;
        }
        Command::Trash { action } => run_trash(&workspace(), action).await?,
    }
    Ok(())
}

async fn run_trash(ws: &Workspace, action: TrashAction) -> anyhow::Result<()> {
    match action {
        TrashAction::List => {
            let mut trash = ws.trash().await?;
            trash.reload().await?;
            emit(&trash.entries())
        }
        TrashAction::Restore { record_id } => {
            ws.restore(&record_id).await?;
            emit(&json!({ "restored": record_id }))
        }
        TrashAction::Delete { record_id, yes } => {
            let confirmation = {
                let mut trash = ws.trash().await?;
                trash.reload().await?;
                trash.confirm_delete(&record_id)
            };
            let Some(confirmation) = confirmation else {
                bail!("no trashed item with id {record_id}");
            };
            if !yes {
                bail!("{} Re-run with --yes to confirm.", confirmation.message());
            }
            ws.permanently_delete(&confirmation).await?;
            emit(&json!({ "deleted": record_id }))
        }
        TrashAction::Empty { yes } => {
            let confirmation = {
                let mut trash = ws.trash().await?;
                trash.reload().await?;
                trash.confirm_empty()
            };
            let Some(confirmation) = confirmation else {
                return emit(&json!({ "deleted": 0 }));
            };
            if !yes {
                bail!("{} Re-run with --yes to confirm.", confirmation.message());
            }
            let outcome = ws.empty_trash(&confirmation).await?;
            emit(&outcome)
        }
    }
}
