//! Transient notifications (title + description) shown after an action.

use std::fmt;

use crate::error::{classify, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: Variant::Destructive,
        }
    }

    /// Build the notification for a failed action.
    ///
    /// Classified errors are shown verbatim; anything else (network, parse)
    /// gets `fallback` as its description and is logged in full.
    pub fn from_error(err: &anyhow::Error, fallback: &str) -> Self {
        match classify(err) {
            Some(AppError::Validation(msg)) => Self::error("Error", msg.clone()),
            Some(AppError::Rejected { title, message }) => Self::error(title.clone(), message.clone()),
            Some(AppError::Forbidden(msg)) => Self::error("Acción no permitida", msg.clone()),
            Some(AppError::NotSignedIn(msg)) => Self::error("Sesión requerida", msg.clone()),
            Some(AppError::NotFound(_)) => Self::error("Error", fallback.to_string()),
            Some(AppError::Backend { message, .. }) => Self::error("Error", message.clone()),
            None => {
                tracing::debug!("Unclassified failure: {:#}", err);
                Self::error("Error", fallback.to_string())
            }
        }
    }

    /// Print to the terminal. Errors go to stderr.
    pub fn show(&self) {
        match self.variant {
            Variant::Default => println!("{}", self),
            Variant::Destructive => eprintln!("{}", self),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.variant {
            Variant::Default => "*",
            Variant::Destructive => "!",
        };
        write!(f, "[{}] {}: {}", marker, self.title, self.description)
    }
}
