//! Marketplace commands: browse, publish and manage items.

pub mod images;
pub mod listing;
pub mod publish;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use crate::api::SupabaseClient;
use crate::error::AppError;
use crate::models::{Item, ItemStatus};
use crate::notify::Notification;
use crate::pages;
use crate::prompt;
use crate::render;
use listing::MarketQuery;
use publish::{ItemEdit, ItemForm};

fn print_item(item: &Item, editable: bool) {
    let weight = format!("{} kg", item.weight_kg);
    println!(
        "{} {} {:>8} {}",
        render::fit(&item.title, 32),
        render::fit(item.material_type.label(), 12),
        weight,
        item.price_label()
    );
    println!(
        "  ID: {}  ·  {}  ·  {}",
        item.id,
        item.location_name,
        item.owner_name()
    );
    if editable {
        println!("  Editar: circulapp items edit {}", item.id);
    }
}

/// Browse available items.
pub async fn list_items(
    category: &str,
    min_weight: Option<f64>,
    search: Option<String>,
) -> Result<()> {
    let category = listing::parse_category_filter(category).map_err(AppError::validation)?;
    let client = SupabaseClient::connect_optional().await?;
    let query = MarketQuery {
        category,
        min_weight,
        text: search,
    };
    let items = listing::marketplace(&client, &query).await?;

    pages::MARKETPLACE.render();
    println!("{} ítems encontrados\n", items.len());
    let me = client.session_opt().map(|s| s.user_id());
    for item in &items {
        print_item(item, me.is_some_and(|id| item.is_owned_by(id)));
        println!();
    }
    Ok(())
}

/// Show one item. A missing item reports the failure and falls back to the
/// marketplace listing.
pub async fn show_item(item_id: &str) -> Result<()> {
    let client = SupabaseClient::connect_optional().await?;
    let Some(item) = listing::detail(&client, item_id).await? else {
        tracing::debug!("Item {} not found", item_id);
        Notification::error("Error", "No se pudo cargar el ítem").show();
        return list_items("todos", None, None).await;
    };

    pages::ITEM_DETAIL.render();
    println!("{}", item.title);
    println!("{:-<60}", "");
    println!("Categoría:   {}", item.material_type.label());
    println!("Peso:        {} kg", item.weight_kg);
    println!("Precio:      {}", item.price_label());
    println!("Ubicación:   {}", item.location_name);
    println!("Estado:      {}", item.status);
    println!("Publicado:   {}", item.created_at.with_timezone(&Local).format("%d/%m/%Y %H:%M"));
    println!("Publicado por {}", item.owner_name());
    if let Some(ref description) = item.description {
        println!("\n{}", description);
    }
    let gallery: Vec<&str> = if item.image_urls.is_empty() {
        item.primary_image().into_iter().collect()
    } else {
        item.image_urls.iter().map(String::as_str).collect()
    };
    if !gallery.is_empty() {
        println!("\nImágenes:");
        for url in gallery {
            println!("  {}", url);
        }
    }
    println!("{:-<60}", "");

    match client.session_opt() {
        Some(s) if item.is_owned_by(s.user_id()) => {
            println!("Editar: circulapp items edit {}", item.id)
        }
        _ => println!("Contactar: circulapp contact {}", item.id),
    }
    Ok(())
}

/// The signed-in user's items, active and completed.
pub async fn my_items() -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let own = listing::own_items(&client, client.session()?).await?;

    pages::MY_PROFILE.render();
    println!("Activos ({})", own.active.len());
    if own.active.is_empty() {
        println!("  (no items)");
    }
    for item in &own.active {
        print_item(item, true);
        println!();
    }
    println!("Completados ({})", own.completed.len());
    if own.completed.is_empty() {
        println!("  (no items)");
    }
    for item in &own.completed {
        print_item(item, true);
        println!();
    }
    Ok(())
}

async fn fill(value: &mut String, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        *value = prompt::line(label).await?;
    }
    Ok(())
}

/// Publish a new item. Text fields left out on the command line are asked
/// for interactively.
pub async fn publish_item(mut form: ItemForm, image_paths: Vec<PathBuf>) -> Result<()> {
    pages::PUBLISH_ITEM.render();
    let client = SupabaseClient::connect().await?;
    let session = client.session()?;

    fill(&mut form.title, "Título").await?;
    fill(&mut form.location, "Ubicación").await?;
    fill(&mut form.description, "Descripción").await?;
    // Fail on form errors before reading any file
    form.to_new_item(session.user_id())?;
    let images = images::load_all(&image_paths).await?;

    let published = publish::publish(&client, session, &form, &images).await?;
    published.notification().show();
    if published.failed > 0 {
        tracing::warn!("{} image(s) could not be uploaded", published.failed);
    }
    println!("ID: {}", published.item.id);
    Ok(())
}

/// Edit an owned item, optionally adding images.
pub async fn edit_item(item_id: &str, changes: ItemEdit, image_paths: Vec<PathBuf>) -> Result<()> {
    pages::EDIT_ITEM.render();
    let client = SupabaseClient::connect().await?;
    let images = images::load_all(&image_paths).await?;

    let item = publish::edit(&client, client.session()?, item_id, &changes, &images).await?;
    Notification::info("¡Éxito!", "Material actualizado correctamente").show();
    print_item(&item, true);
    Ok(())
}

pub async fn set_item_status(item_id: &str, status: ItemStatus) -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let item = publish::set_status(&client, client.session()?, item_id, status)
        .await
        .context("No se pudo actualizar el material")?;
    println!("Item {} is now {}.", item.id, item.status);
    Ok(())
}

pub async fn delete_item(item_id: &str) -> Result<()> {
    let client = SupabaseClient::connect().await?;
    publish::delete(&client, client.session()?, item_id).await?;
    Notification::info(
        "Material eliminado",
        "El material ha sido eliminado correctamente",
    )
    .show();
    Ok(())
}
