//! Keeps a thread or the directory in step with row-change notifications.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use super::thread::MessageThread;
use crate::api::ChatStore;
use crate::models::Message;
use crate::realtime::{Binding, ChangeKind, Notice};

/// Inserts and updates of one conversation's messages.
pub fn thread_bindings(conversation_id: &str) -> Vec<Binding> {
    vec![
        Binding::new(ChangeKind::Insert, "messages").eq("conversation_id", conversation_id),
        Binding::new(ChangeKind::Update, "messages").eq("conversation_id", conversation_id),
    ]
}

/// Any change to the actor's conversations, in either participant column,
/// plus every new message.
pub fn directory_bindings(user_id: &str) -> Vec<Binding> {
    vec![
        Binding::new(ChangeKind::Any, "conversations").eq("participant_1", user_id),
        Binding::new(ChangeKind::Any, "conversations").eq("participant_2", user_id),
        Binding::new(ChangeKind::Insert, "messages"),
    ]
}

/// What a notice did to the thread.
#[derive(Debug)]
pub enum ThreadUpdate {
    /// A new message was appended. Counterpart messages come with the
    /// background read receipt that was fired for them.
    Appended {
        message: Message,
        read_receipt: Option<JoinHandle<()>>,
    },
    /// The message was already shown (e.g. our own optimistic append).
    AlreadyShown,
    /// The whole thread was fetched again.
    Refetched,
    Ignored,
}

/// Apply one notice from the thread subscription.
pub async fn apply_to_thread<S: ChatStore + 'static>(
    thread: &mut MessageThread,
    store: &Arc<S>,
    notice: Notice,
) -> Result<ThreadUpdate> {
    let change = match notice {
        Notice::Resubscribed => {
            thread.fetch(store.as_ref()).await?;
            return Ok(ThreadUpdate::Refetched);
        }
        Notice::Change(change) => change,
    };
    if change.table != "messages" {
        return Ok(ThreadUpdate::Ignored);
    }

    match change.kind {
        ChangeKind::Insert => {
            let raw: Message = match change.record_as() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Ignoring message notification: {:#}", e);
                    return Ok(ThreadUpdate::Ignored);
                }
            };
            if thread.conversation_id() != Some(raw.conversation_id.as_str()) {
                return Ok(ThreadUpdate::Ignored);
            }

            let message = if raw.item_id.is_some() {
                match store.message(&raw.id).await {
                    Ok(Some(enriched)) => enriched,
                    Ok(None) => raw,
                    Err(e) => {
                        tracing::debug!("Enriched fetch of {} failed: {:#}", raw.id, e);
                        raw
                    }
                }
            } else {
                raw
            };

            let read_receipt = if !message.is_from(thread.actor()) && message.read_at.is_none() {
                let store = Arc::clone(store);
                let id = message.id.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = store.mark_message_read(&id).await {
                        tracing::warn!("Could not mark {} as read: {:#}", id, e);
                    }
                }))
            } else {
                None
            };

            if thread.append(message.clone()) {
                Ok(ThreadUpdate::Appended {
                    message,
                    read_receipt,
                })
            } else {
                Ok(ThreadUpdate::AlreadyShown)
            }
        }
        ChangeKind::Update => {
            thread.fetch(store.as_ref()).await?;
            Ok(ThreadUpdate::Refetched)
        }
        ChangeKind::Delete | ChangeKind::Any => Ok(ThreadUpdate::Ignored),
    }
}

/// Whether a notice on the directory subscription calls for a reload.
///
/// Any message insert counts, including the actor's own: one sent from
/// another device still changes the last-message preview.
pub fn touches_directory(notice: &Notice) -> bool {
    match notice {
        Notice::Resubscribed => true,
        Notice::Change(change) => matches!(change.table.as_str(), "conversations" | "messages"),
    }
}
