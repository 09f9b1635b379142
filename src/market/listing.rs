//! Marketplace listing, the actor's own items, and item detail.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};

use crate::api::{ItemFilter, MarketStore};
use crate::auth::Session;
use crate::models::{Category, Item, ItemStatus};

/// Marketplace filters. `category: None` is "todos".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketQuery {
    pub category: Option<Category>,
    pub min_weight: Option<f64>,
    pub text: Option<String>,
}

/// Parse a category filter, where `todos` means any category.
pub fn parse_category_filter(s: &str) -> Result<Option<Category>, String> {
    match s.trim().to_lowercase().as_str() {
        "" | "todos" | "all" => Ok(None),
        _ => s.parse().map(Some),
    }
}

/// Attach owner profiles with one lookup for every distinct owner.
///
/// A failed lookup leaves the items without owners; they still list, under
/// the anonymous fallback name.
pub async fn attach_owners<S: MarketStore + ?Sized>(store: &S, items: &mut [Item]) {
    let ids: Vec<String> = items
        .iter()
        .map(|i| i.user_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return;
    }

    let profiles = match store.profiles(&ids).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Owner lookup failed: {:#}", e);
            return;
        }
    };
    let by_user: HashMap<&str, _> = profiles.iter().map(|p| (p.user_id.as_str(), p)).collect();
    for item in items.iter_mut() {
        item.owner = by_user.get(item.user_id.as_str()).map(|p| (*p).clone());
    }
}

/// Case-insensitive match over title, description, category, location and
/// owner name.
pub fn matches_text(item: &Item, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    [
        Some(item.title.as_str()),
        item.description.as_deref(),
        Some(item.material_type.as_str()),
        Some(item.material_type.label()),
        Some(item.location_name.as_str()),
        Some(item.owner_name()),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&q))
}

/// Available items for everyone, newest first.
pub async fn marketplace<S: MarketStore + ?Sized>(
    store: &S,
    query: &MarketQuery,
) -> Result<Vec<Item>> {
    let filter = ItemFilter {
        status: Some(ItemStatus::Available),
        category: query.category,
        min_weight: query.min_weight.filter(|w| *w > 0.0),
        ..Default::default()
    };
    let mut items = store
        .items(&filter)
        .await
        .context("No se pudieron cargar los ítems")?;
    attach_owners(store, &mut items).await;

    if let Some(ref text) = query.text {
        items.retain(|i| matches_text(i, text));
    }
    Ok(items)
}

/// The actor's items, split by lifecycle.
#[derive(Debug, Clone, Default)]
pub struct OwnItems {
    /// Available or reserved.
    pub active: Vec<Item>,
    /// Withdrawn.
    pub completed: Vec<Item>,
}

pub async fn own_items<S: MarketStore + ?Sized>(store: &S, session: &Session) -> Result<OwnItems> {
    let filter = ItemFilter {
        owner: Some(session.user_id().to_string()),
        ..Default::default()
    };
    let items = store
        .items(&filter)
        .await
        .context("No se pudieron cargar tus ítems")?;

    let (completed, active): (Vec<Item>, Vec<Item>) = items
        .into_iter()
        .partition(|i| i.status == ItemStatus::Withdrawn);
    Ok(OwnItems { active, completed })
}

/// One item with its owner attached. `None` when there is no such item.
pub async fn detail<S: MarketStore + ?Sized>(store: &S, item_id: &str) -> Result<Option<Item>> {
    let item = store
        .item(item_id)
        .await
        .context("No se pudo cargar el ítem")?;
    let Some(item) = item else {
        return Ok(None);
    };
    let mut one = [item];
    attach_owners(store, &mut one).await;
    let [item] = one;
    Ok(Some(item))
}
