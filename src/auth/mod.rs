//! Authentication against the project's auth service
//!
//! Password and federated (PKCE) sign-in, sign-up, recovery links, and the
//! explicit session handle every authenticated operation receives.

pub mod gotrue;
pub mod oauth;
pub mod recovery;
pub mod tokens;

pub use gotrue::Provider;
pub use oauth::{login, logout, recover, reset_password, signup, status};
pub use tokens::{Identity, Session, SessionStore, UserMetadata};
