//! Message thread of one conversation, as seen by the actor.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::api::ChatStore;
use crate::auth::Session;
use crate::models::{Message, NewMessage};

pub struct MessageThread {
    conversation_id: Option<String>,
    actor: String,
    messages: Vec<Message>,
    error: Option<String>,
}

impl MessageThread {
    pub fn new(conversation_id: Option<String>, session: &Session) -> Self {
        Self {
            conversation_id: conversation_id.filter(|id| !id.trim().is_empty()),
            actor: session.user_id().to_string(),
            messages: Vec::new(),
            error: None,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Messages oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Last failure, kept until the next successful fetch or send.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reload every message, then mark the counterpart's unread ones as read
    /// with a single write. No conversation means an empty thread and no
    /// requests.
    pub async fn fetch<S: ChatStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let conversation_id = match self.conversation_id.clone() {
            Some(id) => id,
            None => {
                self.messages.clear();
                return Ok(());
            }
        };

        let messages = match store.messages(&conversation_id).await {
            Ok(m) => m,
            Err(e) => {
                self.error = Some(format!("{:#}", e));
                return Err(e).context("Failed to load messages");
            }
        };
        self.messages = messages;
        self.error = None;

        match store
            .mark_conversation_read(&conversation_id, &self.actor)
            .await
        {
            Ok(n) => {
                tracing::debug!("Marked {} messages read in {}", n, conversation_id);
                let now = Utc::now();
                let actor = self.actor.clone();
                for m in self.messages.iter_mut().filter(|m| m.is_unread_for(&actor)) {
                    m.read_at = Some(now);
                }
            }
            Err(e) => tracing::warn!("Could not mark {} as read: {:#}", conversation_id, e),
        }
        Ok(())
    }

    /// Add a message unless one with the same id is already present, in
    /// which case the stored copy is refreshed. Returns whether it was new.
    pub fn append(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                // Keep the joined item when the update is a bare row
                let item = existing.item.take();
                *existing = message;
                if existing.item.is_none() {
                    existing.item = item;
                }
                false
            }
            None => {
                self.messages.push(message);
                true
            }
        }
    }

    /// Send `text` as the actor. Blank text is ignored without a request.
    /// On success the stored row is appended right away.
    pub async fn send<S: ChatStore + ?Sized>(
        &mut self,
        store: &S,
        text: &str,
        item_id: Option<String>,
    ) -> Result<Option<Message>> {
        let content = text.trim();
        let conversation_id = match self.conversation_id.clone() {
            Some(id) if !content.is_empty() => id,
            _ => return Ok(None),
        };

        let new = NewMessage {
            conversation_id,
            sender_id: self.actor.clone(),
            content: content.to_string(),
            item_id,
        };
        match store.insert_message(&new).await {
            Ok(stored) => {
                self.error = None;
                self.append(stored.clone());
                Ok(Some(stored))
            }
            Err(e) => {
                self.error = Some(format!("{:#}", e));
                Err(e).context("Failed to send message")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, message, session, FakeBackend};

    fn backend() -> FakeBackend {
        FakeBackend::with(|s| {
            s.items.push(item("i1", "ana", "Cartón de mudanza", 0));
            s.messages.push(message("m1", "c1", "ana", "Hola", 1));
            let mut m2 = message("m2", "c1", "ana", "Mira esto", 2);
            m2.item_id = Some("i1".to_string());
            s.messages.push(m2);
            s.messages.push(message("m3", "c1", "me", "Dale", 3));
            s.messages.push(message("x1", "c2", "luis", "otro chat", 4));
        })
    }

    #[tokio::test]
    async fn test_no_conversation_no_requests() {
        let store = backend();
        let mut thread = MessageThread::new(None, &session("me"));
        thread.fetch(&store).await.unwrap();
        assert!(thread.messages().is_empty());
        assert_eq!(store.state().mark_conversation_read_calls, 0);

        assert!(thread.send(&store, "hola", None).await.unwrap().is_none());
        assert_eq!(store.state().message_inserts, 0);
    }

    #[tokio::test]
    async fn test_fetch_orders_joins_and_marks_read_once() {
        let store = backend();
        let mut thread = MessageThread::new(Some("c1".into()), &session("me"));
        thread.fetch(&store).await.unwrap();

        let ids: Vec<&str> = thread.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(
            thread.messages()[1].item.as_ref().unwrap().title,
            "Cartón de mudanza"
        );
        assert_eq!(store.state().mark_conversation_read_calls, 1);
        {
            let s = store.state();
            let read: Vec<bool> = s.messages.iter().map(|m| m.read_at.is_some()).collect();
            // Own message and the other conversation stay untouched
            assert_eq!(read, vec![true, true, false, false]);
        }
        assert!(thread.messages().iter().all(|m| !m.is_unread_for("me")));

        // Re-fetching a read thread is one more write that changes nothing
        let before: Vec<_> = store.state().messages.iter().map(|m| m.read_at).collect();
        thread.fetch(&store).await.unwrap();
        let after: Vec<_> = store.state().messages.iter().map(|m| m.read_at).collect();
        assert_eq!(store.state().mark_conversation_read_calls, 2);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_blank_message_is_not_sent() {
        let store = backend();
        let mut thread = MessageThread::new(Some("c1".into()), &session("me"));
        for text in ["", "   ", "\n\t "] {
            assert!(thread.send(&store, text, None).await.unwrap().is_none());
        }
        assert_eq!(store.state().message_inserts, 0);
        assert!(thread.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_trimmed() {
        let store = backend();
        let mut thread = MessageThread::new(Some("c1".into()), &session("me"));
        let sent = thread
            .send(&store, "  ¿Lo paso a buscar mañana?  ", Some("i1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.content, "¿Lo paso a buscar mañana?");
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].item.as_ref().unwrap().id, "i1");
        assert_eq!(store.state().message_inserts, 1);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_error_and_list() {
        let store = backend();
        store.state().fail_inserts = true;
        let mut thread = MessageThread::new(Some("c1".into()), &session("me"));
        assert!(thread.send(&store, "hola", None).await.is_err());
        assert!(thread.messages().is_empty());
        assert!(thread.error().unwrap().contains("insert rejected"));
    }

    #[test]
    fn test_append_dedupes_by_id() {
        let mut thread = MessageThread::new(Some("c1".into()), &session("me"));
        let mut m = message("m1", "c1", "ana", "Hola", 1);
        m.item_id = Some("i1".into());
        m.item = Some(crate::models::ItemRef {
            id: "i1".into(),
            title: "Cartón".into(),
            material_type: None,
            image_url: None,
        });
        assert!(thread.append(m.clone()));

        let mut bare = m.clone();
        bare.item = None;
        bare.read_at = Some(Utc::now());
        assert!(!thread.append(bare));
        assert_eq!(thread.messages().len(), 1);
        assert!(thread.messages()[0].read_at.is_some());
        assert!(thread.messages()[0].item.is_some());
    }
}
