//! Image bucket.

use anyhow::Result;
use async_trait::async_trait;

use super::client::SupabaseClient;
use super::store::ObjectStore;

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.storage_upload(path, bytes, content_type).await?;
        Ok(self.public_url(path))
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.storage_remove(paths).await
    }
}
