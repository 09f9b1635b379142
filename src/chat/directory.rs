//! Conversation directory: every conversation the actor takes part in.

use std::collections::HashSet;

use anyhow::{Context, Result};
use futures::future::join_all;

use crate::api::ChatStore;
use crate::auth::Session;
use crate::error::AppError;
use crate::models::{Conversation, ConversationSummary, ParticipantSlot, Profile};

/// Load the directory, most recently active first.
///
/// The actor may sit in either participant column, so both are looked up
/// and merged by id. A failed lookup fails the directory; a missing
/// counterpart profile, preview or unread count does not.
pub async fn load<S: ChatStore + ?Sized>(
    store: &S,
    session: &Session,
) -> Result<Vec<ConversationSummary>> {
    let actor = session.user_id();

    let mut seen = HashSet::new();
    let mut conversations: Vec<Conversation> = Vec::new();
    for slot in ParticipantSlot::BOTH {
        let rows = store
            .conversations_in_slot(slot, actor)
            .await
            .with_context(|| format!("Failed to load conversations as {}", slot.column()))?;
        for c in rows {
            if seen.insert(c.id.clone()) {
                conversations.push(c);
            }
        }
    }
    conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
    tracing::debug!("{} conversations for {}", conversations.len(), actor);

    let summaries = join_all(
        conversations
            .into_iter()
            .map(|c| summarize(store, actor, c)),
    )
    .await;
    Ok(summaries)
}

async fn summarize<S: ChatStore + ?Sized>(
    store: &S,
    actor: &str,
    conversation: Conversation,
) -> ConversationSummary {
    let other_id = conversation.counterpart(actor).to_string();

    let other_user = match store.profile(&other_id).await {
        Ok(Some(p)) => p,
        Ok(None) => Profile::placeholder(&other_id),
        Err(e) => {
            tracing::warn!("Profile lookup for {} failed: {:#}", other_id, e);
            Profile::placeholder(&other_id)
        }
    };

    let last_message = store
        .last_message(&conversation.id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Last message of {} unavailable: {:#}", conversation.id, e);
            None
        });

    let unread_count = store
        .unread_count(&conversation.id, actor)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Unread count of {} unavailable: {:#}", conversation.id, e);
            0
        });

    ConversationSummary {
        conversation,
        other_user,
        last_message,
        unread_count,
    }
}

/// Entries whose counterpart's full name or username contains `query`.
pub fn search<'a>(list: &'a [ConversationSummary], query: &str) -> Vec<&'a ConversationSummary> {
    list.iter().filter(|s| s.other_user.matches(query)).collect()
}

/// Conversation with `other_user_id`, created when missing.
pub async fn open_with<S: ChatStore + ?Sized>(
    store: &S,
    session: &Session,
    other_user_id: &str,
) -> Result<String> {
    let other = other_user_id.trim();
    if other.is_empty() {
        return Err(AppError::validation("Falta el usuario con quien conversar").into());
    }
    if other == session.user_id() {
        return Err(AppError::forbidden("No puedes contactarte a ti mismo").into());
    }
    store
        .get_or_create_conversation(session.user_id(), other)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{conversation, message, profile, session, FakeBackend};

    fn backend() -> FakeBackend {
        FakeBackend::with(|s| {
            s.profiles.push(profile("ana", "Ana García"));
            s.profiles.push(profile("luis", "Luis Pérez"));
            s.conversations.push(conversation("c-old", "me", "ana", 0));
            s.conversations.push(conversation("c-new", "luis", "me", 10));
            s.conversations.push(conversation("c-other", "ana", "luis", 20));
            s.messages.push(message("m1", "c-old", "ana", "¿Sigue disponible?", 1));
            s.messages.push(message("m2", "c-old", "me", "Sí", 2));
            s.messages.push(message("m3", "c-old", "ana", "Genial", 3));
        })
    }

    #[tokio::test]
    async fn test_includes_both_participant_slots() {
        let store = backend();
        let list = load(&store, &session("me")).await.unwrap();

        let ids: Vec<&str> = list.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["c-new", "c-old"]);
        assert_eq!(list[0].other_user.display_name(), "Luis Pérez");
        assert_eq!(list[1].other_user.display_name(), "Ana García");
    }

    #[tokio::test]
    async fn test_preview_and_unread() {
        let store = backend();
        let list = load(&store, &session("me")).await.unwrap();
        let old = list.iter().find(|s| s.id() == "c-old").unwrap();
        assert_eq!(old.last_message.as_ref().unwrap().content, "Genial");
        assert_eq!(old.unread_count, 2);
        let new = list.iter().find(|s| s.id() == "c-new").unwrap();
        assert!(new.last_message.is_none());
        assert_eq!(new.unread_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_merged() {
        let store = backend();
        store
            .state()
            .conversations
            .push(conversation("c-self", "me", "me", 30));
        let list = load(&store, &session("me")).await.unwrap();
        let selfs = list.iter().filter(|s| s.id() == "c-self").count();
        assert_eq!(selfs, 1);
    }

    #[tokio::test]
    async fn test_missing_profile_uses_placeholder() {
        let store = backend();
        store.state().fail_profiles = true;
        let list = load(&store, &session("me")).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|s| s.other_user.display_name() == "Usuario"));
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_directory() {
        let store = backend();
        store.state().fail_slot = Some(ParticipantSlot::Second);
        assert!(load(&store, &session("me")).await.is_err());
    }

    #[tokio::test]
    async fn test_search_and_open() {
        let store = backend();
        let list = load(&store, &session("me")).await.unwrap();
        let hits = search(&list, "garcía");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "c-old");
        assert_eq!(search(&list, "  ").len(), 2);

        let id = open_with(&store, &session("me"), "ana").await.unwrap();
        assert_eq!(id, "c-old");
        assert!(open_with(&store, &session("me"), "me").await.is_err());
        assert_eq!(store.state().rpc_calls.len(), 1);
    }
}
