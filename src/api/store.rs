//! Backend operations used by the chat and marketplace logic.
//!
//! `SupabaseClient` implements these against the hosted project; tests use
//! an in-memory implementation.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Category, Conversation, Item, ItemPatch, ItemStatus, Message, MessagePreview, NewItem,
    NewMessage, NewProfile, ParticipantSlot, Profile, ProfilePatch, UserStats,
};

/// Server-side item filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub owner: Option<String>,
    pub status: Option<ItemStatus>,
    pub category: Option<Category>,
    pub min_weight: Option<f64>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>>;
    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>>;
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile>;
    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<Profile>;
    async fn user_stats(&self, user_id: &str) -> Result<UserStats>;
}

#[async_trait]
pub trait ChatStore: ProfileStore {
    /// Conversations where `user_id` occupies `slot`, newest first.
    async fn conversations_in_slot(
        &self,
        slot: ParticipantSlot,
        user_id: &str,
    ) -> Result<Vec<Conversation>>;
    async fn last_message(&self, conversation_id: &str) -> Result<Option<MessagePreview>>;
    /// Messages in the conversation not sent by `reader_id` and not yet read.
    async fn unread_count(&self, conversation_id: &str, reader_id: &str) -> Result<u64>;
    async fn get_or_create_conversation(&self, user1_id: &str, user2_id: &str) -> Result<String>;
    async fn start_conversation_about_item(
        &self,
        other_user_id: &str,
        item_id: &str,
        initial_message: Option<&str>,
    ) -> Result<String>;
    /// All messages, oldest first, joined to their referenced item.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    async fn message(&self, message_id: &str) -> Result<Option<Message>>;
    /// Set `read_at` on every unread message not sent by `reader_id`.
    /// Returns how many rows changed.
    async fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str)
        -> Result<usize>;
    async fn mark_message_read(&self, message_id: &str) -> Result<()>;
    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;
}

#[async_trait]
pub trait MarketStore: ProfileStore {
    /// Items matching `filter`, newest first.
    async fn items(&self, filter: &ItemFilter) -> Result<Vec<Item>>;
    async fn item(&self, id: &str) -> Result<Option<Item>>;
    async fn insert_item(&self, item: &NewItem) -> Result<Item>;
    /// Update an item owned by `owner_id`. `None` when no such row.
    async fn update_item(&self, id: &str, owner_id: &str, patch: &ItemPatch)
        -> Result<Option<Item>>;
    /// Delete an item owned by `owner_id`. `false` when no such row.
    async fn delete_item(&self, id: &str, owner_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a new object and return its public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
    async fn remove(&self, paths: &[String]) -> Result<()>;
}
