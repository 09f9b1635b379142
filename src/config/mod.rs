//! Configuration and session storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::{Session, SessionStore};
use crate::error::AppError;

const DEFAULT_BUCKET: &str = "item-images";
const DEFAULT_SITE_URL: &str = "http://localhost:8080";

const ENV_URL: &str = "CIRCULAPP_SUPABASE_URL";
const ENV_ANON_KEY: &str = "CIRCULAPP_SUPABASE_ANON_KEY";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend project URL, e.g. `https://abcd.supabase.co`
    pub supabase_url: Option<String>,
    /// Public (anon) API key of the project
    pub anon_key: Option<String>,
    /// Storage bucket for item images
    pub storage_bucket: Option<String>,
    /// Where OAuth and password-recovery flows redirect back to
    pub site_url: Option<String>,
    /// Current session (access token, refresh token, identity)
    pub session: Option<Session>,
}

/// Resolved project endpoint and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub url: String,
    pub anon_key: String,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "circulapp", "circulapp")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Project URL and key. Environment variables take precedence over the file.
    pub fn project(&self) -> Result<Project> {
        self.project_with(|k| std::env::var(k).ok())
    }

    fn project_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Project> {
        let url = env(ENV_URL)
            .or_else(|| self.supabase_url.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::NotSignedIn(format!(
                    "No project URL configured. Run 'circulapp configure' or set {}.",
                    ENV_URL
                ))
            })?;
        let anon_key = env(ENV_ANON_KEY)
            .or_else(|| self.anon_key.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::NotSignedIn(format!(
                    "No anon key configured. Run 'circulapp configure' or set {}.",
                    ENV_ANON_KEY
                ))
            })?;

        Ok(Project {
            url: url.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        self.storage_bucket.as_deref().unwrap_or(DEFAULT_BUCKET)
    }

    pub fn site_url(&self) -> &str {
        self.site_url
            .as_deref()
            .unwrap_or(DEFAULT_SITE_URL)
            .trim_end_matches('/')
    }
}

/// Store project settings given on the command line.
pub fn configure(
    url: Option<String>,
    anon_key: Option<String>,
    bucket: Option<String>,
    site_url: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = url {
        config.supabase_url = Some(url.trim().trim_end_matches('/').to_string());
    }
    if anon_key.is_some() {
        config.anon_key = anon_key;
    }
    if bucket.is_some() {
        config.storage_bucket = bucket;
    }
    if site_url.is_some() {
        config.site_url = site_url;
    }
    config.save()?;

    match config.project_with(|_| None) {
        Ok(project) => println!("Configured project {}.", project.url),
        Err(e) => println!("Saved. {}", e),
    }
    Ok(())
}

impl SessionStore for Config {
    fn get_session(&self) -> Option<Session> {
        self.session.clone()
    }

    fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, UserMetadata};

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.bucket(), "item-images");
        assert_eq!(config.site_url(), "http://localhost:8080");
        assert!(config.project_with(|_| None).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::from_toml(
            r#"
supabase_url = "https://file.supabase.co/"
anon_key = "file-key"
"#,
        )
        .unwrap();

        let project = config.project_with(|_| None).unwrap();
        assert_eq!(project.url, "https://file.supabase.co");
        assert_eq!(project.anon_key, "file-key");

        let project = config
            .project_with(|k| (k == ENV_URL).then(|| "https://env.supabase.co".to_string()))
            .unwrap();
        assert_eq!(project.url, "https://env.supabase.co");
        assert_eq!(project.anon_key, "file-key");
    }

    #[test]
    fn test_session_round_trips_through_toml() {
        let mut config = Config::default();
        config.set_session(Session {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: Some(1_900_000_000),
            user: Identity {
                id: "u1".to_string(),
                email: None,
                user_metadata: UserMetadata {
                    full_name: Some("Ana".to_string()),
                    ..Default::default()
                },
            },
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.get_session(), config.get_session());

        let mut back = back;
        back.clear_session();
        assert!(back.get_session().is_none());
    }
}
