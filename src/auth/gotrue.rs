//! Auth service endpoints (password, sign-up, refresh, recovery, PKCE)

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use super::tokens::{Identity, Session, UserMetadata};
use crate::api::client::check_response;
use crate::config::Project;

/// Federated sign-in providers enabled for the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }
}

/// Token grant response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl From<AuthUser> for Identity {
    fn from(u: AuthUser) -> Self {
        Identity {
            id: u.id,
            email: u.email.filter(|e| !e.is_empty()),
            user_metadata: u.user_metadata,
        }
    }
}

impl TokenResponse {
    fn into_session(self) -> Result<Session> {
        let user = match self.user {
            Some(u) => u.into(),
            None => Identity::from_access_token(&self.access_token)?,
        };
        Ok(Session::new(
            self.access_token,
            self.refresh_token,
            self.expires_in,
            user,
        ))
    }
}

/// Outcome of a sign-up: a session when the project auto-confirms,
/// otherwise a confirmation e-mail is pending.
#[derive(Debug)]
pub enum SignUp {
    SignedIn(Session),
    ConfirmationSent,
}

fn auth_url(project: &Project, path: &str) -> String {
    format!("{}/auth/v1/{}", project.url, path)
}

async fn token_grant(
    http: &reqwest::Client,
    project: &Project,
    grant_type: &str,
    body: serde_json::Value,
) -> Result<Session> {
    let url = auth_url(project, "token");
    tracing::debug!("Auth token grant: {}", grant_type);

    let resp = http
        .post(&url)
        .query(&[("grant_type", grant_type)])
        .header("apikey", &project.anon_key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Auth {} grant request failed", grant_type))?;

    let resp = check_response(resp, &url).await?;
    let token: TokenResponse = resp
        .json()
        .await
        .context("Failed to parse auth token response")?;
    token.into_session()
}

pub async fn sign_in_password(
    http: &reqwest::Client,
    project: &Project,
    email: &str,
    password: &str,
) -> Result<Session> {
    token_grant(
        http,
        project,
        "password",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

pub async fn refresh_session(
    http: &reqwest::Client,
    project: &Project,
    refresh_token: &str,
) -> Result<Session> {
    token_grant(
        http,
        project,
        "refresh_token",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await
}

pub async fn exchange_pkce_code(
    http: &reqwest::Client,
    project: &Project,
    auth_code: &str,
    code_verifier: &str,
) -> Result<Session> {
    token_grant(
        http,
        project,
        "pkce",
        serde_json::json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
    )
    .await
}

/// Register with e-mail and password; `username` and `full_name` travel as
/// user metadata so the profile can be created from them later.
pub async fn sign_up(
    http: &reqwest::Client,
    project: &Project,
    email: &str,
    password: &str,
    metadata: &UserMetadata,
    redirect_to: &str,
) -> Result<SignUp> {
    let url = auth_url(project, "signup");
    tracing::debug!("Auth sign-up for {}", email);

    let resp = http
        .post(&url)
        .query(&[("redirect_to", redirect_to)])
        .header("apikey", &project.anon_key)
        .json(&serde_json::json!({
            "email": email,
            "password": password,
            "data": metadata,
        }))
        .send()
        .await
        .context("Auth sign-up request failed")?;

    let resp = check_response(resp, &url).await?;
    let body: serde_json::Value = resp
        .json()
        .await
        .context("Failed to parse sign-up response")?;

    // With e-mail confirmation enabled the body is the bare user
    if body.get("access_token").is_some() {
        let token: TokenResponse =
            serde_json::from_value(body).context("Failed to parse sign-up session")?;
        Ok(SignUp::SignedIn(token.into_session()?))
    } else {
        Ok(SignUp::ConfirmationSent)
    }
}

/// Send the password-reset e-mail.
pub async fn recover(
    http: &reqwest::Client,
    project: &Project,
    email: &str,
    redirect_to: &str,
) -> Result<()> {
    let url = auth_url(project, "recover");
    let resp = http
        .post(&url)
        .query(&[("redirect_to", redirect_to)])
        .header("apikey", &project.anon_key)
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .context("Auth recover request failed")?;
    check_response(resp, &url).await?;
    Ok(())
}

/// Set a new password for the session's user.
pub async fn update_password(
    http: &reqwest::Client,
    project: &Project,
    session: &Session,
    password: &str,
) -> Result<()> {
    let url = auth_url(project, "user");
    let resp = http
        .put(&url)
        .header("apikey", &project.anon_key)
        .bearer_auth(&session.access_token)
        .json(&serde_json::json!({ "password": password }))
        .send()
        .await
        .context("Auth user update failed")?;
    check_response(resp, &url).await?;
    Ok(())
}

/// Revoke the session's refresh tokens server-side.
pub async fn sign_out(http: &reqwest::Client, project: &Project, session: &Session) -> Result<()> {
    let url = auth_url(project, "logout");
    let resp = http
        .post(&url)
        .header("apikey", &project.anon_key)
        .bearer_auth(&session.access_token)
        .send()
        .await
        .context("Auth logout request failed")?;
    check_response(resp, &url).await?;
    Ok(())
}

/// Browser URL that starts a federated sign-in.
pub fn authorize_url(
    project: &Project,
    provider: Provider,
    redirect_to: &str,
    code_challenge: &str,
) -> Result<Url> {
    let mut url =
        Url::parse(&auth_url(project, "authorize")).context("Invalid project URL")?;
    url.query_pairs_mut()
        .append_pair("provider", provider.as_str())
        .append_pair("redirect_to", redirect_to)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project() -> Project {
        Project {
            url: "https://p.supabase.co".into(),
            anon_key: "anon".into(),
        }
    }

    #[test]
    fn test_authorize_url() {
        let url = authorize_url(&project(), Provider::Google, "http://localhost:8080/", "abc")
            .unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&("redirect_to".into(), "http://localhost:8080/".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "s256".into())));
    }

    #[test]
    fn test_token_response_into_session() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": {
                "id": "u1",
                "email": "ana@example.com",
                "user_metadata": {"username": "ana", "avatar_url": null, "iss": "x"}
            }
        }))
        .unwrap();
        let session = token.into_session().unwrap();
        assert_eq!(session.user_id(), "u1");
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
        assert_eq!(session.user.user_metadata.username.as_deref(), Some("ana"));
        assert!(!session.is_expired());
    }
}
