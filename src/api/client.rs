//! Authenticated HTTP client for the Circulapp backend
//!
//! Wraps reqwest::Client with the project key, the session's bearer token
//! and the row, RPC and storage endpoints. The token is checked before every
//! request and refreshed once it is close to expiry, so long-running
//! commands keep working past the token lifetime.

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::api::query::Query;
use crate::auth::{self, Session, SessionStore};
use crate::config::{Config, Project};
use crate::error::AppError;

/// Client for one project, optionally acting on behalf of a session.
pub struct SupabaseClient {
    http: reqwest::Client,
    project: Project,
    /// Who is signed in, as of startup. The identity does not change on refresh.
    session: Option<Session>,
    /// Latest tokens. Locked across a refresh so concurrent requests wait for it.
    tokens: Mutex<Option<Session>>,
    /// Write refreshed sessions back to the config file.
    persist: bool,
    bucket: String,
}

/// Trade the refresh token for a new session.
async fn refreshed(http: &reqwest::Client, project: &Project, session: &Session) -> Result<Session> {
    let Some(refresh_token) = session.refresh_token.as_deref() else {
        return Err(AppError::NotSignedIn(
            "Session expired and no refresh token. Run 'circulapp login'.".into(),
        )
        .into());
    };
    tracing::info!("Session expired, refreshing...");
    match auth::gotrue::refresh_session(http, project, refresh_token).await {
        Ok(fresh) => {
            tracing::info!("Session refreshed");
            Ok(fresh)
        }
        Err(e) => Err(AppError::NotSignedIn(format!(
            "Session refresh failed: {:#}. Run 'circulapp login'.",
            e
        ))
        .into()),
    }
}

fn save_session(session: &Session) -> Result<()> {
    let mut config = Config::load()?;
    config.set_session(session.clone());
    config.save()
}

impl SupabaseClient {
    pub fn new(project: Project, session: Option<Session>, bucket: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            project,
            tokens: Mutex::new(session.clone()),
            session,
            persist: false,
            bucket: bucket.into(),
        }
    }

    /// Load config and build a client for the signed-in user.
    /// Refreshes the session first if it has expired.
    pub async fn connect() -> Result<Self> {
        let client = Self::connect_optional().await?;
        client.session()?;
        Ok(client)
    }

    /// Like [`connect`](Self::connect) but falls back to anonymous access
    /// when nobody is signed in (public listings).
    pub async fn connect_optional() -> Result<Self> {
        let mut config = Config::load()?;
        let project = config.project()?;
        let http = reqwest::Client::new();

        let session = match config.get_session() {
            Some(s) if s.is_expired() => {
                let fresh = refreshed(&http, &project, &s).await?;
                config.set_session(fresh.clone());
                config.save()?;
                Some(fresh)
            }
            other => other,
        };

        let bucket = config.bucket().to_string();
        Ok(Self {
            http,
            project,
            tokens: Mutex::new(session.clone()),
            session,
            persist: true,
            bucket,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The signed-in session, or a classified error telling the user to sign in.
    pub fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            AppError::NotSignedIn("Debes iniciar sesión. Run 'circulapp login'.".into()).into()
        })
    }

    pub fn session_opt(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Bearer token for the next request: the session's, refreshed first
    /// when expired, or the anon key when nobody is signed in.
    pub async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        let Some(current) = tokens.as_mut() else {
            return Ok(self.project.anon_key.clone());
        };
        if current.is_expired() {
            let fresh = refreshed(&self.http, &self.project, current).await?;
            if self.persist {
                if let Err(e) = save_session(&fresh) {
                    tracing::warn!("Could not save refreshed session: {:#}", e);
                }
            }
            *current = fresh;
        }
        Ok(current.access_token.clone())
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.project.url, path)
    }

    async fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.project.anon_key)
            .bearer_auth(token))
    }

    /// GET rows matching `query`.
    pub async fn select(&self, query: &Query) -> Result<Vec<serde_json::Value>> {
        let url = self.rest_url(query.table_name());
        tracing::debug!("REST GET {} {:?}", url, query.to_pairs());

        let resp = self
            .request(reqwest::Method::GET, &url)
            .await?
            .query(&query.to_pairs())
            .send()
            .await
            .with_context(|| format!("REST GET {} failed", url))?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} rows", query.table_name()))
    }

    /// Exact row count of `query` (no rows transferred).
    pub async fn count(&self, query: &Query) -> Result<u64> {
        let url = self.rest_url(query.table_name());
        tracing::debug!("REST HEAD {} {:?}", url, query.to_pairs());

        let resp = self
            .request(reqwest::Method::HEAD, &url)
            .await?
            .header("Prefer", "count=exact")
            .query(&query.to_pairs())
            .send()
            .await
            .with_context(|| format!("REST HEAD {} failed", url))?;

        let resp = check_response(resp, &url).await?;
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .context("Count response has no Content-Range header")?;
        parse_content_range_total(range)
            .with_context(|| format!("Unexpected Content-Range: {}", range))
    }

    /// INSERT one row and return the stored representation.
    pub async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        row: &T,
        select: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let url = self.rest_url(table);
        tracing::debug!("REST POST {}", url);

        let mut req = self
            .request(reqwest::Method::POST, &url)
            .await?
            .header("Prefer", "return=representation")
            .json(row);
        if let Some(cols) = select {
            req = req.query(&Query::table(table).select(cols).to_pairs());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("REST POST {} failed", url))?;
        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse inserted {} row", table))
    }

    /// PATCH rows matching `query`; returns the updated rows.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        query: &Query,
        patch: &T,
    ) -> Result<Vec<serde_json::Value>> {
        anyhow::ensure!(query.has_filters(), "Refusing unfiltered update");
        let url = self.rest_url(query.table_name());
        tracing::debug!("REST PATCH {} {:?}", url, query.to_pairs());

        let resp = self
            .request(reqwest::Method::PATCH, &url)
            .await?
            .header("Prefer", "return=representation")
            .query(&query.to_pairs())
            .json(patch)
            .send()
            .await
            .with_context(|| format!("REST PATCH {} failed", url))?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse updated {} rows", query.table_name()))
    }

    /// DELETE rows matching `query`; returns the deleted rows.
    pub async fn delete(&self, query: &Query) -> Result<Vec<serde_json::Value>> {
        anyhow::ensure!(query.has_filters(), "Refusing unfiltered delete");
        let url = self.rest_url(query.table_name());
        tracing::debug!("REST DELETE {} {:?}", url, query.to_pairs());

        let resp = self
            .request(reqwest::Method::DELETE, &url)
            .await?
            .header("Prefer", "return=representation")
            .query(&query.to_pairs())
            .send()
            .await
            .with_context(|| format!("REST DELETE {} failed", url))?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse deleted {} rows", query.table_name()))
    }

    /// Call a database function.
    pub async fn rpc(&self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value> {
        let url = self.rest_url(&format!("rpc/{}", name));
        tracing::debug!("RPC {}", name);

        let resp = self
            .request(reqwest::Method::POST, &url)
            .await?
            .json(args)
            .send()
            .await
            .with_context(|| format!("RPC {} failed", name))?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} result", name))
    }

    /// Upload a new object (never overwrites).
    pub async fn storage_upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.project.url, self.bucket, path
        );
        tracing::debug!("Storage POST {} ({} bytes)", url, bytes.len());

        let resp = self
            .request(reqwest::Method::POST, &url)
            .await?
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Storage POST {} failed", url))?;

        check_response(resp, &url).await?;
        Ok(())
    }

    /// Delete objects by path.
    pub async fn storage_remove(&self, paths: &[String]) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}", self.project.url, self.bucket);
        tracing::debug!("Storage DELETE {:?}", paths);

        let resp = self
            .request(reqwest::Method::DELETE, &url)
            .await?
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await
            .with_context(|| format!("Storage DELETE {} failed", url))?;

        check_response(resp, &url).await?;
        Ok(())
    }

    /// Public URL of an object in the image bucket.
    pub fn public_url(&self, path: &str) -> String {
        public_object_url(&self.project.url, &self.bucket, path)
    }
}

pub fn public_object_url(project_url: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{}/{}",
        project_url.trim_end_matches('/'),
        bucket,
        path.trim_start_matches('/')
    )
}

/// `0-24/573` or `*/573` → 573.
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit('/').next()?.trim().parse().ok()
}

/// Pull a human-readable message out of an error body from any of the
/// backend services (rows, auth, storage).
pub fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
        })
        .map(String::from)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Check HTTP response status code and return a classified error on failure.
pub async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("HTTP {} for {}: {}", status.as_u16(), url, body);

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AppError::NotSignedIn(format!(
            "401 Unauthorized: {}. Run 'circulapp login'.",
            error_message(&body)
        ))
        .into());
    }
    Err(AppError::Backend {
        status: status.as_u16(),
        message: error_message(&body),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/573"), Some(573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("*/*"), None);
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"code":"23505","message":"duplicate key value"}"#),
            "duplicate key value"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://p.supabase.co/", "item-images", "/u1/i1/a.jpg"),
            "https://p.supabase.co/storage/v1/object/public/item-images/u1/i1/a.jpg"
        );
    }

    #[test]
    fn test_session_required() {
        let client = SupabaseClient::new(
            Project {
                url: "https://p.supabase.co".into(),
                anon_key: "anon".into(),
            },
            None,
            "item-images",
        );
        let err = client.session().unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::NotSignedIn(_))
        ));
    }

    fn project(url: &str) -> Project {
        Project {
            url: url.into(),
            anon_key: "anon".into(),
        }
    }

    fn expired(refresh_token: Option<&str>) -> Session {
        let mut session = crate::test_support::session("ana");
        session.access_token = "stale".into();
        session.refresh_token = refresh_token.map(String::from);
        session.expires_at = Some(0);
        session
    }

    /// Answer a single HTTP request with `body` as JSON.
    async fn serve_once(body: serde_json::Value) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await;
            let body = body.to_string();
            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(resp.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_bearer_falls_back_to_anon_key() {
        let client = SupabaseClient::new(project("https://p.supabase.co"), None, "item-images");
        assert_eq!(client.access_token().await.unwrap(), "anon");
    }

    #[tokio::test]
    async fn test_live_session_token_used_as_is() {
        let client = SupabaseClient::new(
            project("http://127.0.0.1:9"),
            Some(crate::test_support::session("ana")),
            "item-images",
        );
        assert_eq!(client.access_token().await.unwrap(), "token");
    }

    #[tokio::test]
    async fn test_expired_session_refreshed_before_request() {
        let url = serve_once(serde_json::json!({
            "access_token": "fresh",
            "refresh_token": "rt-2",
            "expires_in": 3600,
            "user": {"id": "ana", "email": "ana@example.com"}
        }))
        .await;
        let client = SupabaseClient::new(project(&url), Some(expired(Some("rt-1"))), "item-images");

        assert_eq!(client.access_token().await.unwrap(), "fresh");
        // Still valid, so no second round-trip
        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(client.session().unwrap().user_id(), "ana");
    }

    #[tokio::test]
    async fn test_expired_session_without_refresh_token() {
        let client = SupabaseClient::new(
            project("http://127.0.0.1:9"),
            Some(expired(None)),
            "item-images",
        );
        let err = client.access_token().await.unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::NotSignedIn(_))
        ));
    }
}
