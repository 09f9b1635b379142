//! "Contactar": open a conversation with an item's owner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::api::ChatStore;
use crate::auth::Session;
use crate::error::AppError;
use crate::models::Item;
use crate::notify::Notification;

/// Result of a contact attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Opened { conversation_id: String },
    /// The actor owns the item; nothing was requested.
    OwnItem,
}

impl ContactOutcome {
    pub fn notification(&self) -> Notification {
        match self {
            ContactOutcome::Opened { .. } => Notification::info(
                "Chat iniciado",
                "Se ha abierto una conversación sobre este producto",
            ),
            ContactOutcome::OwnItem => {
                Notification::info("Información", "No puedes contactarte a ti mismo")
            }
        }
    }
}

pub fn default_message(item_id: &str) -> String {
    format!("Hola, estoy interesado en tu publicación: {}", item_id)
}

/// Contact action shared by everything that can trigger it. Concurrent
/// requests for the same item wait on a single RPC; once it has succeeded
/// the conversation id is reused.
pub struct Contact<S: ?Sized> {
    store: Arc<S>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl<S: ChatStore + ?Sized> Contact<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, item_id: &str) -> Arc<OnceCell<String>> {
        let mut map = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(map.entry(item_id.to_string()).or_default())
    }

    pub async fn contact(
        &self,
        session: Option<&Session>,
        item: &Item,
        initial_message: Option<&str>,
    ) -> Result<ContactOutcome> {
        let session = session.ok_or_else(|| {
            AppError::NotSignedIn("Debes iniciar sesión para contactar al vendedor".into())
        })?;
        if item.user_id.trim().is_empty() {
            return Err(
                AppError::validation("No se pudo obtener la información del vendedor").into(),
            );
        }
        if item.is_owned_by(session.user_id()) {
            return Ok(ContactOutcome::OwnItem);
        }

        let message = initial_message
            .map(String::from)
            .unwrap_or_else(|| default_message(&item.id));
        let cell = self.cell(&item.id);
        let conversation_id = cell
            .get_or_try_init(|| async {
                tracing::info!("Starting conversation about {}", item.id);
                self.store
                    .start_conversation_about_item(&item.user_id, &item.id, Some(&message))
                    .await
                    .context("No se pudo iniciar la conversación")
            })
            .await?
            .clone();

        Ok(ContactOutcome::Opened { conversation_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, session, FakeBackend};
    use std::time::Duration;

    fn backend() -> Arc<FakeBackend> {
        Arc::new(FakeBackend::with(|s| {
            s.actor = "me".to_string();
            s.rpc_delay = Some(Duration::from_millis(20));
        }))
    }

    #[tokio::test]
    async fn test_concurrent_contact_shares_one_call() {
        let store = backend();
        let contact = Contact::new(Arc::clone(&store));
        let me = session("me");
        let listing = item("i1", "ana", "Cartón de mudanza", 0);

        let (a, b) = tokio::join!(
            contact.contact(Some(&me), &listing, None),
            contact.contact(Some(&me), &listing, None),
        );
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert!(matches!(a, ContactOutcome::Opened { .. }));
        assert_eq!(store.state().rpc_calls.len(), 1);
        assert_eq!(store.state().conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_own_item_makes_no_request() {
        let store = backend();
        let contact = Contact::new(Arc::clone(&store));
        let mine = item("i2", "me", "Frascos de vidrio", 0);

        let outcome = contact.contact(Some(&session("me")), &mine, None).await.unwrap();
        assert_eq!(outcome, ContactOutcome::OwnItem);
        assert_eq!(
            outcome.notification().description,
            "No puedes contactarte a ti mismo"
        );
        assert!(store.state().rpc_calls.is_empty());
        assert!(store.state().conversations.is_empty());
    }

    #[tokio::test]
    async fn test_requires_session_and_owner() {
        let store = backend();
        let contact = Contact::new(Arc::clone(&store));
        let listing = item("i1", "ana", "Cartón", 0);

        let err = contact.contact(None, &listing, None).await.unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::NotSignedIn(_))
        ));

        let orphan = item("i3", "", "Sin dueño", 0);
        let err = contact
            .contact(Some(&session("me")), &orphan, None)
            .await
            .unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::Validation(_))
        ));
        assert!(store.state().rpc_calls.is_empty());
    }

    #[tokio::test]
    async fn test_default_initial_message() {
        let store = backend();
        let contact = Contact::new(Arc::clone(&store));
        contact
            .contact(Some(&session("me")), &item("i1", "ana", "Cartón", 0), None)
            .await
            .unwrap();
        let s = store.state();
        assert_eq!(
            s.messages[0].content,
            "Hola, estoy interesado en tu publicación: i1"
        );
    }
}
