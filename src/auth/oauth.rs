//! Sign-in, sign-up, sign-out and password recovery commands

use anyhow::{Context, Result};
use oauth2::PkceCodeChallenge;

use super::gotrue::{self, Provider, SignUp};
use super::recovery::{parse_redirect, Redirect};
use super::{Session, SessionStore, UserMetadata};
use crate::config::Config;
use crate::error::AppError;
use crate::notify::Notification;
use crate::pages;
use crate::prompt;

fn save_session(config: &mut Config, session: Session) -> Result<()> {
    let who = session
        .user
        .email
        .clone()
        .unwrap_or_else(|| session.user.id.clone());
    config.set_session(session);
    config.save()?;
    println!("Signed in as {}.", who);
    Ok(())
}

/// Sign in with e-mail and password, or through a federated provider.
pub async fn login(
    email: Option<String>,
    password: Option<String>,
    provider: Option<Provider>,
) -> Result<()> {
    pages::SIGN_IN.render();
    let mut config = Config::load()?;
    let project = config.project()?;
    let http = reqwest::Client::new();

    let session = match provider {
        Some(provider) => {
            let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
            let redirect_to = format!("{}/", config.site_url());
            let url = gotrue::authorize_url(&project, provider, &redirect_to, challenge.as_str())?;

            println!();
            println!("To sign in, visit: {}", url);
            println!("Then paste the address your browser was sent back to.");
            println!();

            let landed = prompt::line("Redirect URL").await?;
            match parse_redirect(&landed)? {
                Redirect::Code(code) => {
                    gotrue::exchange_pkce_code(&http, &project, &code, verifier.secret())
                        .await
                        .context("Error al iniciar sesión")?
                }
                Redirect::Tokens { session, .. } => session,
            }
        }
        None => {
            let email = prompt::or_ask(email, "Email").await?;
            let password = prompt::or_ask(password, "Password").await?;
            if email.is_empty() || password.is_empty() {
                return Err(AppError::validation("Por favor completa todos los campos").into());
            }
            tracing::info!("Signing in {}...", email);
            gotrue::sign_in_password(&http, &project, &email, &password)
                .await
                .context("Error al iniciar sesión")?
        }
    };

    save_session(&mut config, session)
}

/// Create an account. Username and full name go into the user metadata.
pub async fn signup(
    email: Option<String>,
    password: Option<String>,
    username: Option<String>,
    full_name: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    let project = config.project()?;
    let http = reqwest::Client::new();

    let email = prompt::or_ask(email, "Email").await?;
    let password = prompt::or_ask(password, "Password").await?;
    let username = prompt::or_ask(username, "Username").await?;
    let full_name = prompt::or_ask(full_name, "Full name").await?;
    if [&email, &password, &username, &full_name]
        .iter()
        .any(|v| v.is_empty())
    {
        return Err(AppError::validation("Por favor completa todos los campos").into());
    }

    let metadata = UserMetadata {
        username: Some(username),
        full_name: Some(full_name),
        avatar_url: None,
    };
    let redirect_to = format!("{}/", config.site_url());
    let outcome = gotrue::sign_up(&http, &project, &email, &password, &metadata, &redirect_to)
        .await
        .context("Error al registrarse")?;

    match outcome {
        SignUp::SignedIn(session) => save_session(&mut config, session)?,
        SignUp::ConfirmationSent => Notification::info(
            "¡Cuenta creada!",
            "Revisa tu email para verificar tu cuenta y luego inicia sesión",
        )
        .show(),
    }
    Ok(())
}

/// Revoke the session server-side (best effort) and forget it locally.
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    if let Some(session) = config.get_session() {
        if let Ok(project) = config.project() {
            let http = reqwest::Client::new();
            if let Err(e) = gotrue::sign_out(&http, &project, &session).await {
                tracing::warn!("Server-side sign-out failed: {:#}", e);
            }
        }
    }
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    match config.project() {
        Ok(project) => println!("Project:  {}", project.url),
        Err(_) => println!("Project:  not configured"),
    }

    match config.get_session() {
        Some(session) => {
            let state = if session.is_expired() {
                if session.refresh_token.is_some() {
                    "expired (will refresh)"
                } else {
                    "expired"
                }
            } else {
                "valid"
            };
            println!("Session:  {}", state);
            println!("  user:   {}", session.user_id());
            if let Some(ref email) = session.user.email {
                println!("  email:  {}", email);
            }
            if let Some(exp) = session.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        None => println!("Session:  none"),
    }
    Ok(())
}

/// Send the password-reset e-mail.
pub async fn reset_password(email: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let project = config.project()?;
    let email = prompt::or_ask(email, "Email").await?;
    if email.is_empty() {
        return Err(AppError::validation("Por favor completa todos los campos").into());
    }

    let redirect_to = format!("{}/reset-password", config.site_url());
    gotrue::recover(&reqwest::Client::new(), &project, &email, &redirect_to).await?;
    Notification::info(
        "Revisa tu email",
        "Te enviamos un enlace para restablecer tu contraseña",
    )
    .show();
    Ok(())
}

/// Adopt the session from a confirmation or recovery link, optionally
/// setting a new password with it.
pub async fn recover(link: &str, new_password: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    let project = config.project()?;

    let session = match parse_redirect(link)? {
        Redirect::Tokens { session, kind } => {
            tracing::debug!("Link type: {:?}", kind);
            session
        }
        Redirect::Code(_) => {
            return Err(AppError::validation(
                "This link carries an authorization code; use 'circulapp login --provider'",
            )
            .into());
        }
    };

    if let Some(password) = new_password {
        gotrue::update_password(&reqwest::Client::new(), &project, &session, &password).await?;
        Notification::info("¡Éxito!", "Tu contraseña fue actualizada").show();
    }

    save_session(&mut config, session)
}
