use serde::{ Serialize, Deserialize };

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

/// Per-connection transcript. Lives only as long as the socket; nothing here
/// is persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: String) -> Self {
        Self { id, messages: Vec::new() }
    }

    pub fn push(&mut self, role: &str, content: &str, timestamp: i64) {
        self.messages.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp,
        });
    }
}
