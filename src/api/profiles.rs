//! Profiles table and the per-user statistics RPC.

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::client::SupabaseClient;
use super::query::Query;
use super::store::ProfileStore;
use crate::error::AppError;
use crate::models::rows::{parse_row, parse_rows};
use crate::models::{NewProfile, Profile, ProfilePatch, UserStats};

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let query = Query::table("profiles")
            .select("*")
            .eq("user_id", user_id)
            .limit(1);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "profile").into_iter().next())
    }

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("profiles")
            .select("id, user_id, username, full_name, avatar_url")
            .in_list("user_id", user_ids);
        let rows = self.select(&query).await?;
        Ok(parse_rows(rows, "profile"))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let rows = self.insert("profiles", profile, None).await?;
        let row = rows
            .into_iter()
            .next()
            .context("Insert returned no profile row")?;
        parse_row(row, "profile")
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<Profile> {
        let query = Query::table("profiles").eq("user_id", user_id);
        let rows = self.update(&query, patch).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("Profile"))?;
        parse_row(row, "profile")
    }

    async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let args = serde_json::json!({ "target_user_id": user_id });
        let value = self.rpc("get_user_stats", &args).await?;
        let first = match value {
            serde_json::Value::Array(rows) => rows.into_iter().next(),
            serde_json::Value::Null => None,
            row => Some(row),
        };
        match first {
            Some(row) => parse_row(row, "user stats"),
            // New users have no rows yet
            None => Ok(UserStats::default()),
        }
    }
}
