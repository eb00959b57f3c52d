//! Chatbot session over the similarity-search endpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::models::{ChatSource, Id};

pub const CHAT_FAILURE_MESSAGE: &str = "Sorry, I could not get an answer right now. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatTurn {
    User { text: String, at: DateTime<Utc> },
    Bot { text: String, sources: Vec<ChatSource>, at: DateTime<Utc> },
    Error { text: String, at: DateTime<Utc> },
}

impl ChatTurn {
    pub fn text(&self) -> &str {
        match self {
            ChatTurn::User { text, .. } | ChatTurn::Bot { text, .. } | ChatTurn::Error { text, .. } => text,
        }
    }
}

pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    sections: Vec<Id>,
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api, sections: vec![], turns: vec![] }
    }

    /// Restrict answers to the given sections; empty means unrestricted.
    pub fn with_sections(mut self, sections: Vec<Id>) -> Self {
        self.sections = sections;
        self
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Ask a question and append both turns. Blank questions are ignored.
    pub async fn ask(&mut self, question: &str) -> Option<&ChatTurn> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        self.turns.push(ChatTurn::User { text: question.to_string(), at: Utc::now() });
        let reply = match self.api.ask(question, &self.sections).await {
            Ok(answer) => {
                debug!(sources = answer.sources.len(), "chat answer");
                ChatTurn::Bot { text: answer.answer, sources: answer.sources, at: Utc::now() }
            }
            Err(e) => {
                warn!("chatbot request failed: {e}");
                ChatTurn::Error { text: CHAT_FAILURE_MESSAGE.to_string(), at: Utc::now() }
            }
        };
        self.turns.push(reply);
        self.turns.last()
    }
}

#[cfg(all(test, feature = "inmem-backend"))]
mod tests {
    use super::*;
    use crate::api::inmem::InMemBackend;
    use crate::models::ChatAnswer;

    #[tokio::test]
    async fn failed_question_adds_error_turn() {
        let backend = InMemBackend::new();
        backend.set_answer("what is a theme?", ChatAnswer { answer: "A guidance page.".into(), sources: vec![] });
        let mut chat = ChatSession::new(Arc::new(backend));

        assert!(chat.ask("   ").await.is_none());
        assert_eq!(chat.ask("what is a theme?").await.map(ChatTurn::text), Some("A guidance page."));
        assert!(matches!(chat.ask("unknown").await, Some(ChatTurn::Error { .. })));
        assert_eq!(chat.turns().len(), 4);
    }
}
