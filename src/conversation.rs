use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GREETING: &str = "Hi Data Engineer, I am here to save your time. Please tell me which hive function you are struggling to convert to Snowflake?";

/// Placeholder the agent uses between list items; rendered as a paragraph break.
pub const BULLET_PLACEHOLDER: char = '•';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn avatar(&self) -> &'static str {
        match self {
            Role::User => "👩‍💻",
            Role::Assistant => "👸",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new_user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn new_assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Display form of the content. Storage keeps the placeholder intact.
    pub fn rendered(&self) -> String {
        render_content(&self.content)
    }
}

pub fn render_content(content: &str) -> String {
    content.replace(BULLET_PLACEHOLDER, "\n\n")
}

/// Append-only chat log for one session.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: vec![Message::new_assistant(GREETING)],
        }
    }

    /// Starts over with a fresh id and only the greeting.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new_user(content))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new_assistant(content))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        // just pushed, cannot be empty
        &self.messages[self.messages.len() - 1]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
