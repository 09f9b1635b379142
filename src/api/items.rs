//! Items table.

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::client::SupabaseClient;
use super::query::Query;
use super::store::{ItemFilter, MarketStore};
use crate::models::rows::{parse_row, parse_rows};
use crate::models::{Item, ItemPatch, NewItem};

impl ItemFilter {
    fn to_query(&self) -> Query {
        let mut query = Query::table("items").select("*");
        if let Some(ref owner) = self.owner {
            query = query.eq("user_id", owner);
        }
        if let Some(status) = self.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(category) = self.category {
            query = query.eq("material_type", category.as_str());
        }
        if let Some(min) = self.min_weight.filter(|w| *w > 0.0) {
            query = query.gte("weight_kg", min);
        }
        query = query.order("created_at", false);
        if let Some(n) = self.limit {
            query = query.limit(n);
        }
        query
    }
}

#[async_trait]
impl MarketStore for SupabaseClient {
    async fn items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let rows = self.select(&filter.to_query()).await?;
        Ok(parse_rows(rows, "item"))
    }

    async fn item(&self, id: &str) -> Result<Option<Item>> {
        let query = Query::table("items").select("*").eq("id", id).limit(1);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "item").into_iter().next())
    }

    async fn insert_item(&self, item: &NewItem) -> Result<Item> {
        let rows = self.insert("items", item, None).await?;
        let row = rows
            .into_iter()
            .next()
            .context("Insert returned no item row")?;
        parse_row(row, "item")
    }

    async fn update_item(
        &self,
        id: &str,
        owner_id: &str,
        patch: &ItemPatch,
    ) -> Result<Option<Item>> {
        let query = Query::table("items").eq("id", id).eq("user_id", owner_id);
        let rows = self.update(&query, patch).await?;
        rows.into_iter()
            .next()
            .map(|row| parse_row(row, "item"))
            .transpose()
    }

    async fn delete_item(&self, id: &str, owner_id: &str) -> Result<bool> {
        let query = Query::table("items").eq("id", id).eq("user_id", owner_id);
        let rows = self.delete(&query).await?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ItemStatus};

    #[test]
    fn test_marketplace_filter_query() {
        let filter = ItemFilter {
            status: Some(ItemStatus::Available),
            category: Some(Category::Cardboard),
            min_weight: Some(2.5),
            ..Default::default()
        };
        let pairs = filter.to_query().to_pairs();
        assert!(pairs.contains(&("status".to_string(), "eq.disponible".to_string())));
        assert!(pairs.contains(&("material_type".to_string(), "eq.carton".to_string())));
        assert!(pairs.contains(&("weight_kg".to_string(), "gte.2.5".to_string())));
        assert!(pairs.contains(&("order".to_string(), "created_at.desc".to_string())));
    }

    #[test]
    fn test_zero_min_weight_is_not_a_filter() {
        let filter = ItemFilter {
            min_weight: Some(0.0),
            ..Default::default()
        };
        assert!(!filter.to_query().has_filters());
    }
}
