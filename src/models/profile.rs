//! Profile and statistics models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rows::{lenient_f64, lenient_u64};

/// Public profile, one per auth identity (`user_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Stand-in for a counterpart whose profile could not be loaded.
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            username: Some("Usuario".to_string()),
            full_name: Some("Usuario".to_string()),
            avatar_url: None,
            bio: None,
            phone: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Full name, else username. `None` when neither is set.
    pub fn name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.username.as_deref().filter(|s| !s.trim().is_empty()))
    }

    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("Usuario")
    }

    /// Case-insensitive substring match on full name or username.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        [&self.full_name, &self.username]
            .into_iter()
            .flatten()
            .any(|s| s.to_lowercase().contains(&q))
    }
}

/// Insert payload for a lazily created profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub user_id: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial profile update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregates from the `get_user_stats` RPC.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_posts: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_weight_kg: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub active_posts: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub completed_posts: u64,
    #[serde(default)]
    pub most_frequent_type: Option<String>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            total_posts: 0,
            total_weight_kg: 0.0,
            active_posts: 0,
            completed_posts: 0,
            most_frequent_type: None,
        }
    }
}

impl UserStats {
    pub fn most_frequent_type_label(&self) -> &str {
        self.most_frequent_type.as_deref().unwrap_or("N/A")
    }
}
