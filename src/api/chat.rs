//! Conversation and message tables, plus the conversation RPCs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::client::SupabaseClient;
use super::query::Query;
use super::store::ChatStore;
use crate::models::rows::{parse_row, parse_rows};
use crate::models::{Conversation, Message, MessagePreview, NewMessage, ParticipantSlot};

/// Message columns with the referenced item embedded.
pub const MESSAGE_SELECT: &str = "*, item:items(id, title, material_type, image_url)";

const CONVERSATION_SELECT: &str = "id, participant_1, participant_2, created_at, updated_at";

/// Conversation-returning RPCs answer with a bare uuid, but tolerate the
/// row and single-row-set shapes as well.
fn rpc_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(rows) => rows.first().and_then(rpc_id),
        serde_json::Value::Object(map) => ["id", "conversation_id"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(rpc_id),
        _ => None,
    }
}

#[async_trait]
impl ChatStore for SupabaseClient {
    async fn conversations_in_slot(
        &self,
        slot: ParticipantSlot,
        user_id: &str,
    ) -> Result<Vec<Conversation>> {
        let query = Query::table("conversations")
            .select(CONVERSATION_SELECT)
            .eq(slot.column(), user_id)
            .order("created_at", false);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "conversation"))
    }

    async fn last_message(&self, conversation_id: &str) -> Result<Option<MessagePreview>> {
        let query = Query::table("messages")
            .select("content, created_at, sender_id")
            .eq("conversation_id", conversation_id)
            .order("created_at", false)
            .limit(1);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "message preview").into_iter().next())
    }

    async fn unread_count(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let query = Query::table("messages")
            .select("id")
            .eq("conversation_id", conversation_id)
            .neq("sender_id", reader_id)
            .is_null("read_at");
        self.count(&query).await
    }

    async fn get_or_create_conversation(&self, user1_id: &str, user2_id: &str) -> Result<String> {
        let args = serde_json::json!({ "user1_id": user1_id, "user2_id": user2_id });
        let value = self.rpc("get_or_create_conversation", &args).await?;
        rpc_id(&value).context("get_or_create_conversation returned no conversation id")
    }

    async fn start_conversation_about_item(
        &self,
        other_user_id: &str,
        item_id: &str,
        initial_message: Option<&str>,
    ) -> Result<String> {
        let args = serde_json::json!({
            "other_user_id": other_user_id,
            "item_id": item_id,
            "initial_message": initial_message,
        });
        let value = self.rpc("start_conversation_about_item", &args).await?;
        rpc_id(&value).context("start_conversation_about_item returned no conversation id")
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let query = Query::table("messages")
            .select(MESSAGE_SELECT)
            .eq("conversation_id", conversation_id)
            .order("created_at", true);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "message"))
    }

    async fn message(&self, message_id: &str) -> Result<Option<Message>> {
        let query = Query::table("messages")
            .select(MESSAGE_SELECT)
            .eq("id", message_id)
            .limit(1);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "message").into_iter().next())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<usize> {
        let query = Query::table("messages")
            .select("id")
            .eq("conversation_id", conversation_id)
            .neq("sender_id", reader_id)
            .is_null("read_at");
        let patch = serde_json::json!({ "read_at": Utc::now() });
        let updated = self.update(&query, &patch).await?;
        Ok(updated.len())
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        let query = Query::table("messages")
            .select("id")
            .eq("id", message_id)
            .is_null("read_at");
        let patch = serde_json::json!({ "read_at": Utc::now() });
        self.update(&query, &patch).await?;
        Ok(())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let rows = self
            .insert("messages", message, Some(MESSAGE_SELECT))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .context("Insert returned no message row")?;
        parse_row(row, "message")
    }
}
