//! Conversation Data Models
//!
//! Messages exchanged with the model and the chunks streamed back to callers.

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

/// One incremental fragment of a streamed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatChunk {
    pub content: String,
    pub is_final: bool,
}

impl ChatChunk {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
        }
    }

    /// The terminating chunk of a turn; carries no content
    pub fn final_chunk() -> Self {
        Self {
            content: String::new(),
            is_final: true,
        }
    }
}

/// Conversation mode of an agent session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Chat,
}

impl AgentMode {
    /// System prompt prepended to every completion in this mode
    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentMode::Chat => CHAT_SYSTEM_PROMPT,
        }
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Chat => write!(f, "chat"),
        }
    }
}

const CHAT_SYSTEM_PROMPT: &str = r#"You are howai, an open-source coding assistant that lives in the user's terminal and works with any model provider.

You help with programming questions and with setting up development environments.

Guidelines:
1. Keep a helpful, professional tone.
2. Break multi-step processes (installing a toolchain, configuring Docker, ...) into numbered steps.
3. Ask for clarification when a request is ambiguous.
4. Stay on coding and development-environment topics.
5. Never claim capabilities you do not have. If unsure, say so and point to where the answer can be found.
6. Mention common pitfalls when they are relevant.

Shell commands:
- Put commands the user may want to run inside ```bash fenced blocks, one command per line.
- The user is asked to confirm every command before it runs, and its output is shown to them.
- Do not suggest interactive programs (editors, pagers, REPLs, ssh sessions) inside those blocks; they cannot be run here.
- Do not chain commands with &&, ; or pipes into a shell. Prefer several simple lines.

Use markdown for code and emphasis. This is an ongoing conversation: offer to go deeper or clarify after answering."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("hi").role, MessageRole::User);
        assert_eq!(Message::assistant("hello").role, MessageRole::Assistant);
        assert!(Message::system("rules").is_system());
        assert!(!Message::user("hi").is_system());
    }

    #[test]
    fn test_message_role_serialization() {
        let json = serde_json::to_value(Message::assistant("ok")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "ok");
    }

    #[test]
    fn test_chat_chunks() {
        let chunk = ChatChunk::partial("Run ");
        assert_eq!(chunk.content, "Run ");
        assert!(!chunk.is_final);

        let last = ChatChunk::final_chunk();
        assert!(last.content.is_empty());
        assert!(last.is_final);
    }

    #[test]
    fn test_chat_mode_prompt_mentions_fenced_blocks() {
        assert_eq!(AgentMode::default(), AgentMode::Chat);
        assert_eq!(AgentMode::Chat.to_string(), "chat");
        assert!(AgentMode::Chat.system_prompt().contains("```bash"));
    }
}
