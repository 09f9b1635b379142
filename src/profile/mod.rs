//! Profile commands: the signed-in user's profile, statistics and edits.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::api::{ProfileStore, SupabaseClient};
use crate::auth::Session;
use crate::error::AppError;
use crate::models::{NewProfile, Profile, ProfilePatch, UserStats};
use crate::notify::Notification;
use crate::pages;

/// The actor's profile, created from the sign-up metadata the first time
/// it is needed.
pub async fn ensure_profile<S: ProfileStore + ?Sized>(
    store: &S,
    session: &Session,
) -> Result<Profile> {
    if let Some(existing) = store
        .profile(session.user_id())
        .await
        .context("No se pudo cargar el perfil")?
    {
        return Ok(existing);
    }

    let identity = &session.user;
    tracing::info!("Creating profile for {}", identity.id);
    let new = NewProfile {
        user_id: identity.id.clone(),
        username: identity.default_username(),
        full_name: identity.user_metadata.full_name.clone(),
        avatar_url: identity.user_metadata.avatar_url.clone(),
    };
    store
        .insert_profile(&new)
        .await
        .context("No se pudo crear el perfil")
}

pub async fn load_stats<S: ProfileStore + ?Sized>(store: &S, session: &Session) -> Result<UserStats> {
    store
        .user_stats(session.user_id())
        .await
        .context("No se pudieron cargar las estadísticas")
}

/// Profile fields to change. Blank values clear the optional fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileEdit {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileEdit {
    fn to_patch(&self) -> Result<ProfilePatch> {
        let username = match self.username.as_deref().map(str::trim) {
            Some("") => {
                return Err(
                    AppError::validation("El nombre de usuario no puede estar vacío").into(),
                )
            }
            other => other.map(String::from),
        };
        let trimmed = |v: &Option<String>| v.as_deref().map(|s| s.trim().to_string());

        let patch = ProfilePatch {
            username,
            full_name: trimmed(&self.full_name),
            bio: trimmed(&self.bio),
            phone: trimmed(&self.phone),
            avatar_url: trimmed(&self.avatar_url),
            updated_at: None,
        };
        if patch == ProfilePatch::default() {
            return Err(AppError::validation("No hay cambios para guardar").into());
        }
        Ok(patch)
    }
}

pub async fn apply_edit<S: ProfileStore + ?Sized>(
    store: &S,
    session: &Session,
    edit: &ProfileEdit,
) -> Result<Profile> {
    let mut patch = edit.to_patch()?;
    ensure_profile(store, session).await?;
    patch.updated_at = Some(Utc::now());
    store
        .update_profile(session.user_id(), &patch)
        .await
        .context("No se pudo actualizar el perfil")
}

fn print_profile(profile: &Profile, session: &Session) {
    println!("Name:     {}", profile.display_name());
    if let Some(ref username) = profile.username {
        println!("Username: @{}", username);
    }
    if let Some(ref email) = session.user.email {
        println!("Email:    {}", email);
    }
    if let Some(ref phone) = profile.phone {
        println!("Phone:    {}", phone);
    }
    if let Some(ref avatar) = profile.avatar_url {
        println!("Avatar:   {}", avatar);
    }
    if let Some(ref bio) = profile.bio {
        println!("\n{}", bio);
    }
    println!("\nID: {}", profile.user_id);
}

/// Show the signed-in user's profile.
pub async fn whoami() -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let session = client.session()?;
    let profile = ensure_profile(&client, session).await?;

    pages::MY_PROFILE.render();
    print_profile(&profile, session);
    Ok(())
}

/// Show the signed-in user's publishing statistics.
pub async fn stats() -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let stats = load_stats(&client, client.session()?).await?;

    pages::MY_PROFILE.render();
    println!("Publicaciones:        {}", stats.total_posts);
    println!("Activas:              {}", stats.active_posts);
    println!("Completadas:          {}", stats.completed_posts);
    println!("Peso total:           {} kg", stats.total_weight_kg);
    println!("Material más común:   {}", stats.most_frequent_type_label());
    Ok(())
}

pub async fn edit_profile(edit: ProfileEdit) -> Result<()> {
    let client = SupabaseClient::connect().await?;
    let session = client.session()?;
    let profile = apply_edit(&client, session, &edit).await?;

    Notification::info("Perfil actualizado", "Tus cambios se guardaron correctamente.").show();
    print_profile(&profile, session);
    Ok(())
}
