//! Data models for Circulapp entities

mod conversation;
mod item;
mod message;
mod profile;
pub mod rows;

pub use conversation::*;
pub use item::*;
pub use message::*;
pub use profile::*;
