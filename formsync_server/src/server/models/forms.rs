use std::path::{Path, PathBuf};

use formsync_core::{
    hash::md5_file,
    models::{
        forms::media_path_for,
        server::{MediaFile, ServerFormListItem},
    },
    xform::{parse_xform_file, FormMetadata},
};
use tracing::warn;
use walkdir::WalkDir;

/// A definition found in the served directory, with its md5 taken at scan time.
pub struct ServedForm {
    pub file_name: String,
    pub path: PathBuf,
    pub metadata: FormMetadata,
    pub hash: String,
}

impl ServedForm {
    pub fn media_dir(&self) -> PathBuf {
        media_path_for(&self.path)
    }

    pub fn list_item(&self, base_url: &str) -> std::io::Result<ServerFormListItem> {
        let has_media = !self.media_files()?.is_empty();
        Ok(ServerFormListItem {
            form_id: self.metadata.form_id.clone(),
            name: self.metadata.title.clone(),
            version: self.metadata.version.clone(),
            hash: Some(self.hash.clone()),
            download_url: format!("{}/forms/{}", base_url, self.file_name),
            manifest_url: has_media
                .then(|| format!("{}/manifest/{}", base_url, self.metadata.form_id)),
        })
    }

    pub fn manifest(&self, base_url: &str) -> std::io::Result<Vec<MediaFile>> {
        Ok(self
            .media_files()?
            .into_iter()
            .map(|(filename, hash)| MediaFile {
                download_url: format!(
                    "{}/media/{}/{}",
                    base_url, self.metadata.form_id, filename
                ),
                filename,
                hash,
            })
            .collect())
    }

    /// `(file name, md5)` of every file in the media directory, by name.
    pub fn media_files(&self) -> std::io::Result<Vec<(String, String)>> {
        let media_dir = self.media_dir();
        if !media_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&media_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            files.push((
                entry.file_name().to_string_lossy().to_string(),
                md5_file(entry.path())?,
            ));
        }
        Ok(files)
    }

    /// A file of this form's media directory, if `name` names one.
    pub fn media_file(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            return None;
        }
        let path = self.media_dir().join(name);
        path.is_file().then_some(path)
    }
}

/// Every parseable definition directly inside `forms_dir`, by file name.
/// Unparseable files are skipped.
pub fn scan_forms(forms_dir: &Path) -> std::io::Result<Vec<ServedForm>> {
    let mut forms = Vec::new();
    for entry in WalkDir::new(forms_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type().is_file() || !is_form_file(&file_name) {
            continue;
        }
        let metadata = match parse_xform_file(entry.path()) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Not serving {}", e);
                continue;
            }
        };
        forms.push(ServedForm {
            hash: md5_file(entry.path())?,
            path: entry.into_path(),
            file_name,
            metadata,
        });
    }
    Ok(forms)
}

fn is_form_file(name: &str) -> bool {
    !name.starts_with('.') && (name.ends_with(".xml") || name.ends_with(".xhtml"))
}

/// Rejects anything that could leave the directory it is joined to.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
