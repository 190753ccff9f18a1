use serde::{Deserialize, Serialize};

use crate::FormDetailsType;

/// One `<xform>` entry of a server's form list. Hashes are stored without
/// their `md5:` prefix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerFormListItem {
    pub form_id: String,
    pub name: String,
    pub version: Option<String>,
    pub hash: Option<String>,
    pub download_url: String,
    pub manifest_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFile {
    pub filename: String,
    pub hash: String,
    pub download_url: String,
}

impl MediaFile {
    pub fn is_zip(&self) -> bool {
        self.filename.to_lowercase().ends_with(".zip")
    }
}

/// Result of comparing one server form against the local catalog.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerFormDetails {
    pub form_name: String,
    pub download_url: String,
    pub form_id: String,
    pub form_version: Option<String>,
    pub hash: Option<String>,
    pub manifest: Option<Vec<MediaFile>>,
    pub details_type: FormDetailsType,
    pub is_not_on_device: bool,
    pub is_updated: bool,
}

impl ServerFormDetails {
    /// New forms and updates are downloaded; forms already up to date are not.
    pub fn needs_download(&self) -> bool {
        self.is_not_on_device || self.is_updated
    }
}
