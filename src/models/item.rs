//! Marketplace item models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rows::null_as_default;
use super::Profile;

/// Lifecycle status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ItemStatus {
    #[default]
    #[serde(rename = "disponible")]
    Available,
    #[serde(rename = "reservado")]
    Reserved,
    #[serde(rename = "retirado")]
    Withdrawn,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "disponible",
            ItemStatus::Reserved => "reservado",
            ItemStatus::Withdrawn => "retirado",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disponible" | "available" => Ok(ItemStatus::Available),
            "reservado" | "reserved" => Ok(ItemStatus::Reserved),
            "retirado" | "withdrawn" | "collected" => Ok(ItemStatus::Withdrawn),
            other => Err(format!(
                "Unknown status: {}. Use: disponible, reservado, retirado",
                other
            )),
        }
    }
}

/// Material category. Unknown wire values read back as [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Plastic,
    Cardboard,
    Glass,
    Metal,
    Paper,
    Organic,
    Textile,
    Electronic,
    Wood,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Plastic,
        Category::Cardboard,
        Category::Glass,
        Category::Metal,
        Category::Paper,
        Category::Organic,
        Category::Textile,
        Category::Electronic,
        Category::Wood,
        Category::Other,
    ];

    /// Value stored in `items.material_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Plastic => "plastico",
            Category::Cardboard => "carton",
            Category::Glass => "vidrio",
            Category::Metal => "metal",
            Category::Paper => "papel",
            Category::Organic => "organico",
            Category::Textile => "textil",
            Category::Electronic => "electronico",
            Category::Wood => "madera",
            Category::Other => "otro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Plastic => "Plástico",
            Category::Cardboard => "Cartón",
            Category::Glass => "Vidrio",
            Category::Metal => "Metal",
            Category::Paper => "Papel",
            Category::Organic => "Orgánico",
            Category::Textile => "Textil",
            Category::Electronic => "Electrónico",
            Category::Wood => "Madera",
            Category::Other => "Otro",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted || c.label().to_lowercase() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                format!("Unknown category: {}. Use: {}", s, known.join(", "))
            })
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Category::Other)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

/// Item row as read from `items`, with the owner's profile attached when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub material_type: Category,
    pub weight_kg: f64,
    pub location_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_free: bool,
    #[serde(default)]
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Owner profile, attached after a profile lookup.
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Profile>,
}

impl Item {
    /// Display price. Free items never show their stored price.
    pub fn price_label(&self) -> String {
        if self.is_free {
            return "Gratuito".to_string();
        }
        format_price(self.price.unwrap_or(0.0))
    }

    /// First image of the gallery, falling back to the legacy single image.
    pub fn primary_image(&self) -> Option<&str> {
        self.image_urls
            .first()
            .map(String::as_str)
            .or(self.image_url.as_deref())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn owner_name(&self) -> &str {
        self.owner
            .as_ref()
            .and_then(|p| p.name())
            .unwrap_or("Usuario Anónimo")
    }
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("${:.0}", price)
    } else {
        format!("${:.2}", price)
    }
}

/// Insert payload for `items`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub material_type: Category,
    pub weight_kg: f64,
    pub location_name: String,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub price: f64,
    pub is_free: bool,
    pub status: ItemStatus,
}

/// Partial update for `items`. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_type: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == ItemPatch::default()
    }
}

/// Joined item summary carried on a message (`item:items(...)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_json() -> serde_json::Value {
        json!({
            "id": "item-1",
            "user_id": "user-b",
            "title": "Cartón de mudanza",
            "description": "Cajas grandes",
            "material_type": "carton",
            "weight_kg": 12,
            "location_name": "Palermo",
            "image_url": null,
            "image_urls": null,
            "price": 150,
            "is_free": true,
            "status": "disponible",
            "created_at": "2024-05-01T10:00:00.123456+00:00",
            "updated_at": null
        })
    }

    #[test]
    fn test_free_item_price_label_ignores_stored_price() {
        let item: Item = serde_json::from_value(item_json()).unwrap();
        assert_eq!(item.price_label(), "Gratuito");
    }

    #[test]
    fn test_paid_item_price_label() {
        let mut v = item_json();
        v["is_free"] = json!(false);
        v["price"] = json!(99.5);
        let item: Item = serde_json::from_value(v).unwrap();
        assert_eq!(item.price_label(), "$99.50");
    }

    #[test]
    fn test_missing_is_free_defaults_false() {
        let mut v = item_json();
        v.as_object_mut().unwrap().remove("is_free");
        v["price"] = json!(40);
        let item: Item = serde_json::from_value(v).unwrap();
        assert!(!item.is_free);
        assert_eq!(item.price_label(), "$40");
    }

    #[test]
    fn test_primary_image_prefers_gallery() {
        let mut v = item_json();
        v["image_url"] = json!("https://cdn/legacy.jpg");
        let item: Item = serde_json::from_value(v.clone()).unwrap();
        assert_eq!(item.primary_image(), Some("https://cdn/legacy.jpg"));

        v["image_urls"] = json!(["https://cdn/a.jpg", "https://cdn/b.jpg"]);
        let item: Item = serde_json::from_value(v).unwrap();
        assert_eq!(item.primary_image(), Some("https://cdn/a.jpg"));
    }

    #[test]
    fn test_unknown_category_reads_as_other() {
        let mut v = item_json();
        v["material_type"] = json!("Plástico PET");
        let item: Item = serde_json::from_value(v).unwrap();
        assert_eq!(item.material_type, Category::Other);
    }

    #[test]
    fn test_category_parse_accepts_labels() {
        assert_eq!("Cartón".parse::<Category>().unwrap(), Category::Cardboard);
        assert_eq!("carton".parse::<Category>().unwrap(), Category::Cardboard);
        assert!("asbesto".parse::<Category>().is_err());
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_value(ItemStatus::Withdrawn).unwrap(),
            json!("retirado")
        );
        assert_eq!("reserved".parse::<ItemStatus>().unwrap(), ItemStatus::Reserved);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = ItemPatch {
            status: Some(ItemStatus::Reserved),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"status": "reservado"}));
        assert!(ItemPatch::default().is_empty());
    }
}
