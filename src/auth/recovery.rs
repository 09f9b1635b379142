//! Sessions carried in redirect URLs
//!
//! E-mail confirmation and password-recovery links land on the site URL with
//! the tokens in the fragment (`#access_token=…&refresh_token=…`); the PKCE
//! flow lands with `?code=…` instead.

use anyhow::{bail, Context, Result};
use url::Url;

use super::tokens::{Identity, Session};

/// What a redirect URL carried.
#[derive(Debug, PartialEq)]
pub enum Redirect {
    /// Tokens embedded directly; `kind` is e.g. `recovery` or `signup`.
    Tokens { session: Session, kind: Option<String> },
    /// Authorization code to exchange with the PKCE verifier.
    Code(String),
}

fn params(url: &Url) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        pairs.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    pairs
}

pub fn parse_redirect(input: &str) -> Result<Redirect> {
    let url = Url::parse(input.trim()).context("Not a valid URL")?;
    let pairs = params(&url);
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    if let Some(description) = get("error_description").or_else(|| get("error")) {
        bail!("Sign-in was rejected: {}", description);
    }

    if let Some(access_token) = get("access_token") {
        let user = Identity::from_access_token(&access_token)?;
        let expires_in = get("expires_in").and_then(|s| s.parse().ok());
        let session = Session::new(access_token, get("refresh_token"), expires_in, user);
        return Ok(Redirect::Tokens {
            session,
            kind: get("type"),
        });
    }

    match get("code") {
        Some(code) => Ok(Redirect::Code(code)),
        None => bail!("The URL carries neither tokens nor an authorization code"),
    }
}
