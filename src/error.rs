//! Error taxonomy shared by every command.
//!
//! Commands propagate `anyhow::Error`; the variants below are attached at the
//! point where the failure is classified so the command boundary can pick a
//! notification for it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed input, caught before any request is made.
    #[error("{0}")]
    Validation(String),

    /// Input refused with a headline of its own, e.g. an image that cannot
    /// be uploaded.
    #[error("{title}: {message}")]
    Rejected { title: String, message: String },

    /// The actor tried to act on something they do not own (client-side check only).
    #[error("{0}")]
    Forbidden(String),

    /// No usable session; the user has to sign in again.
    #[error("{0}")]
    NotSignedIn(String),

    /// A requested row does not exist (or is not visible to the actor).
    #[error("{0} not found")]
    NotFound(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Backend { status: u16, message: String },
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn rejected(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Find the classified cause of an error chain, if there is one.
pub fn classify(err: &anyhow::Error) -> Option<&AppError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AppError>())
}
