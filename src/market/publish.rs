//! Publishing and maintaining one's own items.

use anyhow::{Context, Result};
use chrono::Utc;

use super::images::{self, ImageFile};
use crate::api::{MarketStore, ObjectStore};
use crate::auth::Session;
use crate::error::AppError;
use crate::models::{Category, Item, ItemPatch, ItemStatus, NewItem};
use crate::notify::Notification;

/// Fields of the publish form, as entered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemForm {
    pub title: String,
    pub description: String,
    pub category: Option<Category>,
    pub weight_kg: Option<f64>,
    pub location: String,
    pub is_free: bool,
    pub price: Option<f64>,
}

fn required(value: &str, message: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(message).into());
    }
    Ok(value.to_string())
}

fn positive_weight(weight: Option<f64>) -> Result<f64> {
    match weight {
        None => Err(AppError::validation("El peso es obligatorio").into()),
        Some(w) if w.is_nan() || w <= 0.0 => Err(AppError::validation("El peso debe ser mayor a 0").into()),
        Some(w) => Ok(w),
    }
}

fn valid_price(price: Option<f64>) -> Result<f64> {
    let price = price.unwrap_or(0.0);
    if price.is_nan() || price < 0.0 {
        return Err(AppError::validation("El precio debe ser mayor o igual a 0").into());
    }
    Ok(price)
}

impl ItemForm {
    /// Validate the form into the row to insert for `owner_id`.
    pub fn to_new_item(&self, owner_id: &str) -> Result<NewItem> {
        let title = required(&self.title, "El título es obligatorio")?;
        let weight_kg = positive_weight(self.weight_kg)?;
        let material_type = self
            .category
            .ok_or_else(|| AppError::validation("La categoría es obligatoria"))?;
        let location_name = required(&self.location, "La ubicación es obligatoria")?;
        let description = required(&self.description, "La descripción es obligatoria")?;
        let price = if self.is_free {
            0.0
        } else {
            valid_price(self.price)?
        };

        Ok(NewItem {
            user_id: owner_id.to_string(),
            title,
            description,
            material_type,
            weight_kg,
            location_name,
            image_url: None,
            image_urls: Vec::new(),
            price,
            is_free: self.is_free,
            status: ItemStatus::Available,
        })
    }
}

/// A published item and how many of its images made it.
#[derive(Debug, Clone)]
pub struct Published {
    pub item: Item,
    pub uploaded: usize,
    pub failed: usize,
}

impl Published {
    pub fn notification(&self) -> Notification {
        Notification::info(
            "¡Ítem publicado!",
            format!(
                "Tu ítem ha sido publicado exitosamente con {} imagen(es).",
                self.uploaded
            ),
        )
    }
}

/// Upload images one by one under the item. Failures are logged and
/// skipped; returns `(path, public_url)` for each stored image.
async fn upload_images<S: ObjectStore + ?Sized>(
    store: &S,
    owner_id: &str,
    item_id: &str,
    images: &[ImageFile],
) -> Vec<(String, String)> {
    let mut stored = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let path = images::object_path(owner_id, Some(item_id), &image.extension);
        tracing::debug!("Uploading image {}/{}: {}", i + 1, images.len(), image.name);
        match store
            .upload(&path, image.bytes.clone(), image.content_type)
            .await
        {
            Ok(url) => stored.push((path, url)),
            Err(e) => {
                tracing::warn!("Error al subir imagen {}: {:#}", image.name, e);
                Notification::error(
                    "Error al subir imagen",
                    format!("No se pudo subir {}", image.name),
                )
                .show();
            }
        }
    }
    stored
}

/// Best-effort removal of objects stored for a write that did not land.
async fn discard_uploads<S: ObjectStore + ?Sized>(store: &S, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    if let Err(e) = store.remove(paths).await {
        tracing::warn!("Could not remove uploaded images: {:#}", e);
    }
}

/// Publish a new item with its images.
///
/// Everything is validated before the first request. The row is created
/// first so images can be stored under its id; the gallery is written back
/// once the uploads are done. Some images may fail as long as one succeeds.
pub async fn publish<S>(
    store: &S,
    session: &Session,
    form: &ItemForm,
    images: &[ImageFile],
) -> Result<Published>
where
    S: MarketStore + ObjectStore + ?Sized,
{
    let owner = session.user_id();
    let new_item = form.to_new_item(owner)?;
    if images.is_empty() {
        return Err(AppError::validation("Debes subir al menos una imagen").into());
    }
    images::check_count(0, images.len())?;

    let item = store
        .insert_item(&new_item)
        .await
        .context("No se pudo publicar el ítem")?;
    tracing::info!("Created item {}", item.id);

    let stored = upload_images(store, owner, &item.id, images).await;
    if stored.is_empty() {
        // Leave nothing half-published behind
        if let Err(e) = store.delete_item(&item.id, owner).await {
            tracing::warn!("Could not remove item {} without images: {:#}", item.id, e);
        }
        return Err(AppError::rejected(
            "Error al subir imagen",
            "No se pudieron subir las imágenes",
        )
        .into());
    }

    let uploaded = stored.len();
    let (paths, urls): (Vec<String>, Vec<String>) = stored.into_iter().unzip();
    let patch = ItemPatch {
        image_url: urls.first().cloned(),
        image_urls: Some(urls),
        ..Default::default()
    };
    let result = match store.update_item(&item.id, owner, &patch).await {
        Ok(Some(updated)) => Ok(updated),
        Ok(None) => Err(AppError::not_found("Item").into()),
        Err(e) => Err(e.context("No se pudo publicar el ítem")),
    };
    let updated = match result {
        Ok(updated) => updated,
        Err(e) => {
            // An item without its gallery must not stay listed
            discard_uploads(store, &paths).await;
            if let Err(cleanup) = store.delete_item(&item.id, owner).await {
                tracing::warn!("Could not remove item {}: {:#}", item.id, cleanup);
            }
            return Err(e);
        }
    };

    Ok(Published {
        uploaded,
        failed: images.len().saturating_sub(uploaded),
        item: updated,
    })
}

/// Load an item the actor owns. Ownership is checked here, before any
/// write is attempted.
pub async fn owned_item<S: MarketStore + ?Sized>(
    store: &S,
    session: &Session,
    item_id: &str,
) -> Result<Item> {
    let item = store
        .item(item_id)
        .await
        .context("No se pudo cargar el ítem")?
        .ok_or_else(|| AppError::not_found("Item"))?;
    if !item.is_owned_by(session.user_id()) {
        return Err(AppError::forbidden("Solo puedes modificar tus propias publicaciones").into());
    }
    Ok(item)
}

/// Changes to an existing item. Unset fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub weight_kg: Option<f64>,
    pub location: Option<String>,
    pub is_free: Option<bool>,
    pub price: Option<f64>,
}

impl ItemEdit {
    fn to_patch(&self) -> Result<ItemPatch> {
        const MISSING: &str = "Por favor completa todos los campos obligatorios";
        let text = |v: &Option<String>| -> Result<Option<String>> {
            v.as_deref().map(|s| required(s, MISSING)).transpose()
        };

        let weight_kg = match self.weight_kg {
            Some(w) => Some(positive_weight(Some(w))?),
            None => None,
        };
        let price = match (self.is_free, self.price) {
            (Some(true), _) => Some(0.0),
            (_, Some(p)) => Some(valid_price(Some(p))?),
            _ => None,
        };

        Ok(ItemPatch {
            title: text(&self.title)?,
            description: text(&self.description)?,
            material_type: self.category,
            weight_kg,
            location_name: text(&self.location)?,
            price,
            is_free: self.is_free,
            ..Default::default()
        })
    }
}

/// Update an owned item and append any new images to its gallery.
pub async fn edit<S>(
    store: &S,
    session: &Session,
    item_id: &str,
    changes: &ItemEdit,
    new_images: &[ImageFile],
) -> Result<Item>
where
    S: MarketStore + ObjectStore + ?Sized,
{
    let mut patch = changes.to_patch()?;
    if patch.is_empty() && new_images.is_empty() {
        return Err(AppError::validation("No hay cambios para guardar").into());
    }

    let item = owned_item(store, session, item_id).await?;
    let mut gallery = item.image_urls.clone();
    if gallery.is_empty() {
        gallery.extend(item.image_url.clone());
    }
    images::check_count(gallery.len(), new_images.len())?;

    let mut paths = Vec::new();
    if !new_images.is_empty() {
        let stored = upload_images(store, session.user_id(), &item.id, new_images).await;
        if stored.is_empty() {
            return Err(AppError::rejected(
                "Error al subir imagen",
                "No se pudieron subir las imágenes",
            )
            .into());
        }
        for (path, url) in stored {
            paths.push(path);
            gallery.push(url);
        }
        if item.image_url.is_none() {
            patch.image_url = gallery.first().cloned();
        }
        patch.image_urls = Some(gallery);
    }

    patch.updated_at = Some(Utc::now());
    let result = match store.update_item(&item.id, session.user_id(), &patch).await {
        Ok(Some(updated)) => Ok(updated),
        Ok(None) => Err(AppError::not_found("Item").into()),
        Err(e) => Err(e.context("No se pudo actualizar el material")),
    };
    if result.is_err() {
        discard_uploads(store, &paths).await;
    }
    result
}

/// Move an owned item to another lifecycle status.
pub async fn set_status<S: MarketStore + ?Sized>(
    store: &S,
    session: &Session,
    item_id: &str,
    status: ItemStatus,
) -> Result<Item> {
    let item = owned_item(store, session, item_id).await?;
    let patch = ItemPatch {
        status: Some(status),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    store
        .update_item(&item.id, session.user_id(), &patch)
        .await
        .context("No se pudo actualizar el material")?
        .ok_or_else(|| AppError::not_found("Item").into())
}

/// Delete an owned item.
pub async fn delete<S: MarketStore + ?Sized>(
    store: &S,
    session: &Session,
    item_id: &str,
) -> Result<()> {
    let item = owned_item(store, session, item_id).await?;
    let removed = store
        .delete_item(&item.id, session.user_id())
        .await
        .context("No se pudo eliminar el material")?;
    if !removed {
        return Err(AppError::not_found("Item").into());
    }
    tracing::info!("Deleted item {}", item.id);
    Ok(())
}
