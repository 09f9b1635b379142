//! Message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemRef;

/// Row of `messages`, optionally joined to the referenced item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub item: Option<ItemRef>,
}

impl Message {
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.read_at.is_none() && !self.is_from(user_id)
    }
}

/// Insert payload for `messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub item_id: Option<String>,
}

/// Last message shown in the conversation directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_id: String,
}
