//! Conversation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessagePreview, Profile};

/// Which participant column the actor occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantSlot {
    First,
    Second,
}

impl ParticipantSlot {
    pub const BOTH: [ParticipantSlot; 2] = [ParticipantSlot::First, ParticipantSlot::Second];

    pub fn column(&self) -> &'static str {
        match self {
            ParticipantSlot::First => "participant_1",
            ParticipantSlot::Second => "participant_2",
        }
    }
}

/// Row of `conversations`: an unordered pair of participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_1: String,
    pub participant_2: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// The participant that is not `actor`.
    pub fn counterpart(&self, actor: &str) -> &str {
        if self.participant_1 == actor {
            &self.participant_2
        } else {
            &self.participant_1
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_1 == user_id || self.participant_2 == user_id
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// One entry of the conversation directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub other_user: Profile,
    pub last_message: Option<MessagePreview>,
    pub unread_count: u64,
}

impl ConversationSummary {
    pub fn id(&self) -> &str {
        &self.conversation.id
    }
}
