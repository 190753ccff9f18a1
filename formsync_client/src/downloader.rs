//! Materializes server forms into the forms directory and the catalog.
//!
//! Everything is first written into a scratch directory under the project
//! cache. Only when the definition and all of its media have arrived are the
//! files moved into the forms directory and the row saved, so a failed or
//! cancelled download leaves the catalog untouched.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use formsync_core::{
    hash::{md5_bytes, md5_file_opt},
    models::{
        forms::{media_path_for, Form, LAST_SAVED_FILENAME},
        server::{MediaFile, ServerFormDetails},
    },
};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    deletion::FormDeleter,
    error::FormDownloadError,
    form_source::FormSource,
    metadata::FormMetadataParser,
    repository::{FormsRepository, InstancesRepository},
};

/// Progress sink for media downloads. Purely informational.
pub trait FormDownloaderListener: Send + Sync {
    fn on_downloading_media_file(&self, count: usize, total: usize);
}

#[derive(Debug)]
pub struct FormDownloadResult {
    pub form_id: String,
    pub form_name: String,
    pub error: Option<FormDownloadError>,
}

impl FormDownloadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<FormDownloadResult>,
    /// Set when cancellation stopped the batch early.
    pub interrupted: bool,
}

impl BatchOutcome {
    pub fn failures(self) -> Vec<FormDownloadResult> {
        self.results.into_iter().filter(|x| !x.is_success()).collect()
    }
}

pub struct ServerFormDownloader {
    form_source: Arc<dyn FormSource>,
    forms_repository: Arc<dyn FormsRepository>,
    instances_repository: Arc<dyn InstancesRepository>,
    parser: Arc<dyn FormMetadataParser>,
    forms_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ServerFormDownloader {
    pub fn new(
        form_source: Arc<dyn FormSource>,
        forms_repository: Arc<dyn FormsRepository>,
        instances_repository: Arc<dyn InstancesRepository>,
        parser: Arc<dyn FormMetadataParser>,
        forms_dir: PathBuf,
        cache_dir: PathBuf,
    ) -> Self {
        ServerFormDownloader {
            form_source,
            forms_repository,
            instances_repository,
            parser,
            forms_dir,
            cache_dir,
        }
    }

    /// Downloads each form in turn. A failing form is recorded and skipped;
    /// cancellation stops the whole batch.
    pub async fn download_all(
        &self,
        forms: &[ServerFormDetails],
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for details in forms {
            if cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            let error = match self.download_form(details, listener, cancel).await {
                Ok(()) => None,
                Err(FormDownloadError::Interrupted) => {
                    info!("Download of {} was interrupted", details.form_id);
                    outcome.interrupted = true;
                    break;
                }
                Err(e) => {
                    warn!("Could not download {}: {}", details.form_id, e);
                    Some(e)
                }
            };
            outcome.results.push(FormDownloadResult {
                form_id: details.form_id.clone(),
                form_name: details.form_name.clone(),
                error,
            });
        }
        outcome
    }

    pub async fn download_form(
        &self,
        details: &ServerFormDetails,
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> Result<(), FormDownloadError> {
        if cancel.is_cancelled() {
            return Err(FormDownloadError::Interrupted);
        }
        info!("Downloading {} from {}", details.form_id, details.download_url);

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new()
            .prefix("download-")
            .tempdir_in(&self.cache_dir)?;

        let definition = self.form_source.fetch_form(&details.download_url).await?;
        let hash = md5_bytes(&definition);
        let scratch_form = scratch.path().join("form.xml");
        tokio::fs::write(&scratch_form, &definition).await?;

        let metadata = self
            .parser
            .parse(&scratch_form)
            .map_err(|x| FormDownloadError::FormParsing(x.to_string()))?;
        if metadata.form_id != details.form_id {
            return Err(FormDownloadError::FormIdMismatch {
                expected: details.form_id.clone(),
                actual: metadata.form_id,
            });
        }

        let previous_versions = self
            .forms_repository
            .get_all_by_form_id(&details.form_id)
            .await?;

        let scratch_media = scratch.path().join("media");
        tokio::fs::create_dir_all(&scratch_media).await?;
        if let Some(manifest) = &details.manifest {
            self.download_media_files(manifest, &previous_versions, &scratch_media, listener, cancel)
                .await?;
        }

        if cancel.is_cancelled() {
            return Err(FormDownloadError::Interrupted);
        }

        let existing = self.forms_repository.get_one_by_md5_hash(&hash).await?;
        let form = match existing {
            Some(existing) => {
                // Same definition is already installed; only media may change.
                debug!("{} is already on disk at {}", details.form_id, existing.form_file_path);
                install_media(&scratch_media, existing.media_path()).await?;
                if let Some(id) = existing.db_id.filter(|_| existing.is_deleted()) {
                    info!("Restoring soft-deleted form {}", details.form_id);
                    self.forms_repository.restore(id).await?;
                }
                existing
            }
            None => {
                tokio::fs::create_dir_all(&self.forms_dir).await?;
                let final_path = unique_form_path(&self.forms_dir, &metadata.title);
                move_file(&scratch_form, &final_path).await?;
                let form = Form::from_metadata(metadata, &final_path, hash);
                let installed: Result<Form, FormDownloadError> =
                    match install_media(&scratch_media, form.media_path()).await {
                        Ok(()) => self
                            .forms_repository
                            .save(&form)
                            .await
                            .map_err(FormDownloadError::from),
                        Err(e) => Err(FormDownloadError::from(e)),
                    };
                let saved = match installed {
                    Ok(saved) => saved,
                    Err(e) => {
                        uninstall(&form).await;
                        return Err(e);
                    }
                };
                self.supersede_same_version(&saved).await?;
                saved
            }
        };

        self.copy_last_saved(&form, &previous_versions).await;
        info!("Downloaded {} to {}", form.form_id, form.form_file_path);
        Ok(())
    }

    async fn download_media_files(
        &self,
        manifest: &[MediaFile],
        previous_versions: &[Form],
        scratch_media: &Path,
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> Result<(), FormDownloadError> {
        for (index, media_file) in manifest.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(FormDownloadError::Interrupted);
            }
            if let Some(listener) = listener {
                listener.on_downloading_media_file(index + 1, manifest.len());
            }

            let Some(filename) = safe_filename(&media_file.filename) else {
                warn!("Skipping media file with unusable name {:?}", media_file.filename);
                continue;
            };
            let dest = scratch_media.join(filename);

            if let Some(local) = find_local_copy(previous_versions, filename, &media_file.hash) {
                debug!("Reusing {} from {}", filename, local.display());
                tokio::fs::copy(&local, &dest).await?;
                continue;
            }

            let data = self
                .form_source
                .fetch_media_file(&media_file.download_url)
                .await?;
            tokio::fs::write(&dest, &data).await?;
        }
        Ok(())
    }

    /// Older rows of the same (form id, version) no longer describe what the
    /// server serves under that pair.
    async fn supersede_same_version(&self, saved: &Form) -> Result<(), FormDownloadError> {
        let siblings = self
            .forms_repository
            .get_all_by_form_id_and_version(&saved.form_id, saved.version.as_deref())
            .await?;
        let deleter = FormDeleter::new(
            self.forms_repository.clone(),
            self.instances_repository.clone(),
        );
        for sibling in siblings
            .into_iter()
            .filter(|x| x.db_id != saved.db_id && !x.is_deleted())
        {
            if let Some(id) = sibling.db_id {
                info!("Superseding {} at {}", sibling.form_id, sibling.form_file_path);
                deleter.delete(id).await?;
            }
        }
        Ok(())
    }

    async fn copy_last_saved(&self, form: &Form, previous_versions: &[Form]) {
        let dest = form.media_path().join(LAST_SAVED_FILENAME);
        if dest.exists() {
            return;
        }
        let mut previous: Vec<&Form> = previous_versions
            .iter()
            .filter(|x| x.form_file_path != form.form_file_path)
            .collect();
        previous.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

        let Some(source) = previous
            .into_iter()
            .map(|x| x.media_path().join(LAST_SAVED_FILENAME))
            .find(|x| x.is_file())
        else {
            return;
        };
        let copied = async {
            tokio::fs::create_dir_all(form.media_path()).await?;
            tokio::fs::copy(&source, &dest).await
        };
        if let Err(e) = copied.await {
            warn!("Could not carry {} forward: {}", source.display(), e);
        }
    }
}

fn find_local_copy(previous_versions: &[Form], filename: &str, hash: &str) -> Option<PathBuf> {
    previous_versions
        .iter()
        .map(|x| x.media_path().join(filename))
        .filter(|x| x.is_file())
        .find(|x| md5_file_opt(x).as_deref() == Some(hash))
}

/// Only the last path component of a server-provided name is used.
fn safe_filename(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|x| x.to_str())
        .filter(|x| !x.is_empty())
}

/// `<title>.xml`, or `<title>_N.xml` when that name or its media directory
/// is taken.
pub fn unique_form_path(forms_dir: &Path, title: &str) -> PathBuf {
    let base = sanitize_title(title);
    let mut candidate = forms_dir.join(format!("{}.xml", base));
    let mut n = 1;
    while candidate.exists() || media_path_for(&candidate).exists() {
        candidate = forms_dir.join(format!("{}_{}.xml", base, n));
        n += 1;
    }
    candidate
}

pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim().to_string();
    if cleaned.is_empty() {
        "form".to_string()
    } else {
        cleaned
    }
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

async fn install_media(scratch_media: &Path, media_dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(scratch_media).await?;
    let mut created = false;
    while let Some(entry) = entries.next_entry().await? {
        if !created {
            tokio::fs::create_dir_all(media_dir).await?;
            created = true;
        }
        let dest = media_dir.join(entry.file_name());
        if tokio::fs::try_exists(&dest).await? {
            tokio::fs::remove_file(&dest).await?;
        }
        move_file(&entry.path(), &dest).await?;
    }
    Ok(())
}

async fn uninstall(form: &Form) {
    if let Err(e) = tokio::fs::remove_file(form.file_path()).await {
        warn!("Could not remove {}: {}", form.form_file_path, e);
    }
    if form.media_path().exists() {
        if let Err(e) = tokio::fs::remove_dir_all(form.media_path()).await {
            warn!("Could not remove {}: {}", form.form_media_path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_become_safe_file_names() {
        assert_eq!(sanitize_title("Birds / Bees?"), "Birds _ Bees_");
        assert_eq!(sanitize_title("  ..hidden "), "hidden");
        assert_eq!(sanitize_title("///"), "___");
        assert_eq!(sanitize_title(""), "form");
    }

    #[test]
    fn unique_paths_avoid_existing_files_and_media() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_form_path(dir.path(), "Birds"), dir.path().join("Birds.xml"));

        std::fs::write(dir.path().join("Birds.xml"), "").unwrap();
        std::fs::create_dir(dir.path().join("Birds_1-media")).unwrap();
        assert_eq!(unique_form_path(dir.path(), "Birds"), dir.path().join("Birds_2.xml"));
    }

    #[test]
    fn media_names_cannot_escape_the_media_directory() {
        assert_eq!(safe_filename("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_filename("a.png"), Some("a.png"));
        assert_eq!(safe_filename(".."), None);
    }
}
