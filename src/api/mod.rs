//! Backend access: authenticated client, row queries and the store traits

mod chat;
pub mod client;
mod items;
mod profiles;
pub mod query;
mod storage;
pub mod store;

pub use client::SupabaseClient;
pub use store::{ChatStore, ItemFilter, MarketStore, ObjectStore, ProfileStore};
