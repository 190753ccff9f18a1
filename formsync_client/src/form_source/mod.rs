//! Where server forms come from.

use async_trait::async_trait;
use formsync_core::models::server::{MediaFile, ServerFormListItem};

use crate::error::FormSourceError;

mod openrosa;

pub use openrosa::OpenRosaFormSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait FormSource: Send + Sync {
    async fn fetch_form_list(&self) -> Result<Vec<ServerFormListItem>, FormSourceError>;

    async fn fetch_manifest(&self, manifest_url: &str) -> Result<Vec<MediaFile>, FormSourceError>;

    async fn fetch_form(&self, form_url: &str) -> Result<Vec<u8>, FormSourceError>;

    async fn fetch_media_file(&self, media_url: &str) -> Result<Vec<u8>, FormSourceError>;
}
