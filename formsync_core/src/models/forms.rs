use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::FormDbId, xform::FormMetadata, FormState};

/// Suffix of the directory holding a form's media, next to its definition.
pub const MEDIA_DIR_SUFFIX: &str = "-media";

/// Name of the instance copied forward between versions of the same form.
pub const LAST_SAVED_FILENAME: &str = "last-saved.xml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub db_id: Option<FormDbId>,
    pub form_id: String,
    pub version: Option<String>,
    pub display_name: String,
    pub md5_hash: Option<String>,
    pub form_file_path: String,
    pub form_media_path: String,
    pub submission_uri: Option<String>,
    pub base64_rsa_public_key: Option<String>,
    pub auto_delete: Option<String>,
    pub auto_send: Option<String>,
    pub geometry_xpath: Option<String>,
    pub state: FormState,
    pub last_modified: DateTime<Utc>,
}

impl Form {
    /// Builds an unsaved catalog row for a parsed definition at `path`.
    pub fn from_metadata(metadata: FormMetadata, path: &Path, md5_hash: String) -> Self {
        Form {
            db_id: None,
            form_id: metadata.form_id,
            version: metadata.version,
            display_name: metadata.title,
            md5_hash: Some(md5_hash),
            form_file_path: path.to_string_lossy().to_string(),
            form_media_path: media_path_for(path).to_string_lossy().to_string(),
            submission_uri: metadata.submission_uri,
            base64_rsa_public_key: metadata.base64_rsa_public_key,
            auto_delete: metadata.auto_delete,
            auto_send: metadata.auto_send,
            geometry_xpath: metadata.geometry_xpath,
            state: FormState::Active,
            last_modified: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state == FormState::SoftDeleted
    }

    pub fn file_path(&self) -> &Path {
        Path::new(&self.form_file_path)
    }

    pub fn media_path(&self) -> &Path {
        Path::new(&self.form_media_path)
    }
}

/// `forms/birds.xml` keeps its media in `forms/birds-media/`.
pub fn media_path_for(form_file: &Path) -> PathBuf {
    let stem = form_file
        .file_stem()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();
    form_file.with_file_name(format!("{}{}", stem, MEDIA_DIR_SUFFIX))
}
