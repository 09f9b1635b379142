//! In-memory backend for unit tests.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::api::{ChatStore, ItemFilter, MarketStore, ObjectStore, ProfileStore};
use crate::auth::{Identity, Session, UserMetadata};
use crate::error::AppError;
use crate::models::{
    Category, Conversation, Item, ItemPatch, ItemRef, ItemStatus, Message, MessagePreview,
    NewItem, NewMessage, NewProfile, ParticipantSlot, Profile, ProfilePatch, UserStats,
};

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

pub fn session(user_id: &str) -> Session {
    Session {
        access_token: "token".to_string(),
        refresh_token: None,
        expires_at: None,
        user: Identity {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
            user_metadata: UserMetadata::default(),
        },
    }
}

pub fn profile(user_id: &str, full_name: &str) -> Profile {
    Profile {
        id: Some(format!("p-{}", user_id)),
        user_id: user_id.to_string(),
        username: Some(user_id.to_string()),
        full_name: Some(full_name.to_string()),
        avatar_url: None,
        bio: None,
        phone: None,
        created_at: Some(at(0)),
        updated_at: None,
    }
}

pub fn conversation(id: &str, p1: &str, p2: &str, minute: i64) -> Conversation {
    Conversation {
        id: id.to_string(),
        participant_1: p1.to_string(),
        participant_2: p2.to_string(),
        created_at: at(minute),
        updated_at: None,
    }
}

pub fn message(id: &str, conversation_id: &str, sender: &str, content: &str, minute: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender.to_string(),
        content: content.to_string(),
        item_id: None,
        read_at: None,
        created_at: at(minute),
        item: None,
    }
}

pub fn item(id: &str, owner: &str, title: &str, minute: i64) -> Item {
    Item {
        id: id.to_string(),
        user_id: owner.to_string(),
        title: title.to_string(),
        description: Some(format!("{} en buen estado", title)),
        material_type: Category::Cardboard,
        weight_kg: 5.0,
        location_name: "Palermo".to_string(),
        image_url: None,
        image_urls: Vec::new(),
        price: Some(0.0),
        is_free: true,
        status: ItemStatus::Available,
        created_at: at(minute),
        updated_at: None,
        owner: None,
    }
}

/// Rows plus call counters. Failure switches make single operations fail.
#[derive(Default)]
pub struct State {
    pub actor: String,
    pub profiles: Vec<Profile>,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub items: Vec<Item>,
    pub objects: Vec<String>,
    pub stats: Option<UserStats>,

    pub mark_conversation_read_calls: usize,
    pub marked_messages: Vec<String>,
    pub message_inserts: usize,
    pub rpc_calls: Vec<String>,
    pub uploads: usize,
    pub item_inserts: usize,

    pub fail_slot: Option<ParticipantSlot>,
    pub fail_profiles: bool,
    pub fail_inserts: bool,
    pub fail_uploads_containing: Option<String>,
    pub fail_updates: bool,
    pub updates_find_nothing: bool,
    pub rpc_delay: Option<Duration>,
    next_id: usize,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn item_ref(&self, item_id: Option<&str>) -> Option<ItemRef> {
        let id = item_id?;
        self.items.iter().find(|i| i.id == id).map(|i| ItemRef {
            id: i.id.clone(),
            title: i.title.clone(),
            material_type: Some(i.material_type.as_str().to_string()),
            image_url: i.image_url.clone(),
        })
    }

    fn enriched(&self, m: &Message) -> Message {
        let mut m = m.clone();
        m.item = self.item_ref(m.item_id.as_deref());
        m
    }

    fn conversation_between(&mut self, a: &str, b: &str) -> String {
        if let Some(c) = self
            .conversations
            .iter()
            .find(|c| c.has_participant(a) && c.has_participant(b))
        {
            return c.id.clone();
        }
        let id = self.next_id("conv");
        self.conversations.push(Conversation {
            id: id.clone(),
            participant_1: a.to_string(),
            participant_2: b.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        });
        id
    }
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn with(setup: impl FnOnce(&mut State)) -> Self {
        let backend = Self::default();
        setup(&mut backend.state());
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ProfileStore for FakeBackend {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let s = self.state();
        if s.fail_profiles {
            bail!("profiles unavailable");
        }
        Ok(s.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        let s = self.state();
        if s.fail_profiles {
            bail!("profiles unavailable");
        }
        Ok(s.profiles
            .iter()
            .filter(|p| user_ids.contains(&p.user_id))
            .cloned()
            .collect())
    }

    async fn insert_profile(&self, new: &NewProfile) -> Result<Profile> {
        let mut s = self.state();
        let id = s.next_id("profile");
        let p = Profile {
            id: Some(id),
            user_id: new.user_id.clone(),
            username: new.username.clone(),
            full_name: new.full_name.clone(),
            avatar_url: new.avatar_url.clone(),
            bio: None,
            phone: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        };
        s.profiles.push(p.clone());
        Ok(p)
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<Profile> {
        let mut s = self.state();
        let p = s
            .profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::not_found("Profile"))?;
        if patch.username.is_some() {
            p.username = patch.username.clone();
        }
        if patch.full_name.is_some() {
            p.full_name = patch.full_name.clone();
        }
        if patch.avatar_url.is_some() {
            p.avatar_url = patch.avatar_url.clone();
        }
        if patch.bio.is_some() {
            p.bio = patch.bio.clone();
        }
        if patch.phone.is_some() {
            p.phone = patch.phone.clone();
        }
        p.updated_at = patch.updated_at;
        Ok(p.clone())
    }

    async fn user_stats(&self, _user_id: &str) -> Result<UserStats> {
        Ok(self.state().stats.clone().unwrap_or_default())
    }
}

#[async_trait]
impl ChatStore for FakeBackend {
    async fn conversations_in_slot(
        &self,
        slot: ParticipantSlot,
        user_id: &str,
    ) -> Result<Vec<Conversation>> {
        let s = self.state();
        if s.fail_slot == Some(slot) {
            bail!("{} lookup failed", slot.column());
        }
        let mut rows: Vec<Conversation> = s
            .conversations
            .iter()
            .filter(|c| match slot {
                ParticipantSlot::First => c.participant_1 == user_id,
                ParticipantSlot::Second => c.participant_2 == user_id,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn last_message(&self, conversation_id: &str) -> Result<Option<MessagePreview>> {
        let s = self.state();
        Ok(s.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .max_by_key(|m| m.created_at)
            .map(|m| MessagePreview {
                content: m.content.clone(),
                created_at: m.created_at,
                sender_id: m.sender_id.clone(),
            }))
    }

    async fn unread_count(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let s = self.state();
        Ok(s.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.is_unread_for(reader_id))
            .count() as u64)
    }

    async fn get_or_create_conversation(&self, user1_id: &str, user2_id: &str) -> Result<String> {
        let mut s = self.state();
        s.rpc_calls.push(format!("get_or_create_conversation:{}", user2_id));
        Ok(s.conversation_between(user1_id, user2_id))
    }

    async fn start_conversation_about_item(
        &self,
        other_user_id: &str,
        item_id: &str,
        initial_message: Option<&str>,
    ) -> Result<String> {
        let delay = {
            let mut s = self.state();
            s.rpc_calls
                .push(format!("start_conversation_about_item:{}", item_id));
            s.rpc_delay
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut s = self.state();
        let actor = s.actor.clone();
        let conversation_id = s.conversation_between(&actor, other_user_id);
        if let Some(content) = initial_message {
            let id = s.next_id("msg");
            s.messages.push(Message {
                id,
                conversation_id: conversation_id.clone(),
                sender_id: actor,
                content: content.to_string(),
                item_id: Some(item_id.to_string()),
                read_at: None,
                created_at: Utc::now(),
                item: None,
            });
        }
        Ok(conversation_id)
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let s = self.state();
        let mut rows: Vec<Message> = s
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| s.enriched(m))
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn message(&self, message_id: &str) -> Result<Option<Message>> {
        let s = self.state();
        Ok(s.messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| s.enriched(m)))
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<usize> {
        let mut s = self.state();
        s.mark_conversation_read_calls += 1;
        let now = Utc::now();
        let mut changed = 0;
        for m in s
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.is_unread_for(reader_id))
        {
            m.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        let mut s = self.state();
        s.marked_messages.push(message_id.to_string());
        let now = Utc::now();
        if let Some(m) = s.messages.iter_mut().find(|m| m.id == message_id) {
            m.read_at.get_or_insert(now);
        }
        Ok(())
    }

    async fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        let mut s = self.state();
        if s.fail_inserts {
            bail!("insert rejected");
        }
        s.message_inserts += 1;
        let id = s.next_id("msg");
        let m = Message {
            id,
            conversation_id: new.conversation_id.clone(),
            sender_id: new.sender_id.clone(),
            content: new.content.clone(),
            item_id: new.item_id.clone(),
            read_at: None,
            created_at: Utc::now(),
            item: None,
        };
        s.messages.push(m.clone());
        Ok(s.enriched(&m))
    }
}

#[async_trait]
impl MarketStore for FakeBackend {
    async fn items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let s = self.state();
        let mut rows: Vec<Item> = s
            .items
            .iter()
            .filter(|i| filter.owner.as_ref().map_or(true, |o| &i.user_id == o))
            .filter(|i| filter.status.map_or(true, |st| i.status == st))
            .filter(|i| filter.category.map_or(true, |c| i.material_type == c))
            .filter(|i| filter.min_weight.map_or(true, |w| i.weight_kg >= w))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(n) = filter.limit {
            rows.truncate(n);
        }
        Ok(rows)
    }

    async fn item(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.state().items.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_item(&self, new: &NewItem) -> Result<Item> {
        let mut s = self.state();
        if s.fail_inserts {
            bail!("insert rejected");
        }
        s.item_inserts += 1;
        let id = s.next_id("item");
        let item = Item {
            id,
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            description: Some(new.description.clone()),
            material_type: new.material_type,
            weight_kg: new.weight_kg,
            location_name: new.location_name.clone(),
            image_url: new.image_url.clone(),
            image_urls: new.image_urls.clone(),
            price: Some(new.price),
            is_free: new.is_free,
            status: new.status,
            created_at: Utc::now(),
            updated_at: None,
            owner: None,
        };
        s.items.push(item.clone());
        Ok(item)
    }

    async fn update_item(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ItemPatch,
    ) -> Result<Option<Item>> {
        let mut s = self.state();
        if s.fail_updates {
            bail!("update rejected");
        }
        if s.updates_find_nothing {
            return Ok(None);
        }
        let item = match s
            .items
            .iter_mut()
            .find(|i| i.id == id && i.user_id == owner_id)
        {
            Some(i) => i,
            None => return Ok(None),
        };
        if let Some(ref v) = patch.title {
            item.title = v.clone();
        }
        if patch.description.is_some() {
            item.description = patch.description.clone();
        }
        if let Some(v) = patch.material_type {
            item.material_type = v;
        }
        if let Some(v) = patch.weight_kg {
            item.weight_kg = v;
        }
        if let Some(ref v) = patch.location_name {
            item.location_name = v.clone();
        }
        if patch.image_url.is_some() {
            item.image_url = patch.image_url.clone();
        }
        if let Some(ref v) = patch.image_urls {
            item.image_urls = v.clone();
        }
        if patch.price.is_some() {
            item.price = patch.price;
        }
        if let Some(v) = patch.is_free {
            item.is_free = v;
        }
        if let Some(v) = patch.status {
            item.status = v;
        }
        if patch.updated_at.is_some() {
            item.updated_at = patch.updated_at;
        }
        Ok(Some(item.clone()))
    }

    async fn delete_item(&self, id: &str, owner_id: &str) -> Result<bool> {
        let mut s = self.state();
        let before = s.items.len();
        s.items.retain(|i| !(i.id == id && i.user_id == owner_id));
        Ok(s.items.len() != before)
    }
}

#[async_trait]
impl ObjectStore for FakeBackend {
    async fn upload(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let mut s = self.state();
        if let Some(ref pattern) = s.fail_uploads_containing {
            if path.contains(pattern.as_str()) {
                bail!("upload of {} failed", path);
            }
        }
        s.uploads += 1;
        s.objects.push(path.to_string());
        Ok(format!("https://cdn.test/item-images/{}", path))
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        self.state().objects.retain(|o| !paths.contains(o));
        Ok(())
    }
}
