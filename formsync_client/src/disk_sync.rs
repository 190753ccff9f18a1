//! Reconciles the forms directory into the form catalog.

use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use formsync_core::{api::FormDbId, hash::md5_file_opt, models::forms::Form};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use walkdir::WalkDir;

use crate::{
    metadata::FormMetadataParser,
    repository::{FormsRepository, RepositoryResult},
};

/// Suffix given to definitions that failed to parse so they are never retried.
pub const QUARANTINE_SUFFIX: &str = ".bad";

pub struct DiskFormsSynchronizer {
    forms_dir: PathBuf,
    forms_repository: Arc<dyn FormsRepository>,
    parser: Arc<dyn FormMetadataParser>,
}

impl DiskFormsSynchronizer {
    pub fn new(
        forms_dir: PathBuf,
        forms_repository: Arc<dyn FormsRepository>,
        parser: Arc<dyn FormMetadataParser>,
    ) -> Self {
        DiskFormsSynchronizer {
            forms_dir,
            forms_repository,
            parser,
        }
    }

    /// Runs one scan. Parse failures do not stop the scan; their messages are
    /// returned joined by newlines, so an empty string means a clean run.
    pub async fn synchronize_and_return_error(&self) -> RepositoryResult<String> {
        let mut candidates: HashSet<PathBuf> = if self.forms_dir.is_dir() {
            candidate_files(&self.forms_dir).into_iter().collect()
        } else {
            warn!("Forms directory {} does not exist", self.forms_dir.display());
            HashSet::new()
        };
        let mut to_delete: Vec<FormDbId> = Vec::new();
        let mut to_update: Vec<(Form, String)> = Vec::new();

        // The database may be stale; the file contents are the truth.
        for form in self.forms_repository.get_all().await? {
            let path = form.file_path().to_path_buf();
            if !path.exists() {
                if let Some(id) = form.db_id {
                    to_delete.push(id);
                }
                continue;
            }
            candidates.remove(&path);
            let hash = hash_file(&path).await;
            match hash {
                Some(hash) if form.md5_hash.as_deref() == Some(hash.as_str()) => {}
                Some(hash) => to_update.push((form, hash)),
                None => to_update.push((form, String::new())),
            }
        }

        for id in to_delete {
            info!("Form {} no longer exists on disk, removing it", id);
            self.forms_repository.delete(id).await?;
        }

        let mut candidates: Vec<PathBuf> = candidates.into_iter().collect();
        {
            let mut rng = rand::thread_rng();
            to_update.shuffle(&mut rng);
            candidates.shuffle(&mut rng);
        }

        let mut errors: Vec<String> = Vec::new();

        for (form, hash) in to_update {
            let path = form.file_path().to_path_buf();
            match self.parser.parse(&path) {
                Ok(metadata) if !hash.is_empty() => {
                    debug!("Form {} changed on disk, updating", path.display());
                    let mut updated = Form::from_metadata(metadata, &path, hash);
                    updated.db_id = form.db_id;
                    updated.state = form.state;
                    self.forms_repository.save(&updated).await?;
                }
                Ok(_) => {
                    errors.push(format!("{}: could not be read", path.display()));
                }
                Err(e) => {
                    warn!("Could not parse {}: {}", path.display(), e);
                    errors.push(e.to_string());
                    quarantine(&path);
                    if let Some(id) = form.db_id {
                        self.forms_repository.delete(id).await?;
                    }
                }
            }
        }

        for path in candidates {
            let metadata = match self.parser.parse(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Could not parse {}: {}", path.display(), e);
                    errors.push(e.to_string());
                    quarantine(&path);
                    continue;
                }
            };
            let Some(hash) = hash_file(&path).await else {
                errors.push(format!("{}: could not be read", path.display()));
                continue;
            };

            let path_str = path.to_string_lossy().to_string();
            if self
                .forms_repository
                .get_one_by_path(&path_str)
                .await?
                .is_some()
            {
                debug!("{} was already added by another scan", path.display());
                continue;
            }
            match self
                .forms_repository
                .save(&Form::from_metadata(metadata, &path, hash))
                .await
            {
                Ok(_) => info!("New form found on disk: {}", path.display()),
                Err(e) if e.is_unique_violation() => {
                    debug!("{} was already added by another scan", path.display());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(errors.join("\n"))
    }
}

/// Top-level, non-hidden `.xml` and `.xhtml` files.
pub fn candidate_files(forms_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(forms_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|x| x.ok())
        .filter(|x| x.file_type().is_file())
        .filter(|x| is_form_definition(&x.file_name().to_string_lossy()))
        .map(|x| x.into_path())
        .collect()
}

pub fn is_form_definition(filename: &str) -> bool {
    !filename.starts_with('.') && (filename.ends_with(".xml") || filename.ends_with(".xhtml"))
}

/// Renames `path` to `path.bad`, replacing any earlier quarantined copy.
pub fn quarantine(path: &Path) -> Option<PathBuf> {
    let mut bad = OsString::from(path.as_os_str());
    bad.push(QUARANTINE_SUFFIX);
    let bad = PathBuf::from(bad);
    if bad.is_file() {
        if let Err(e) = std::fs::remove_file(&bad) {
            warn!("Could not remove {}: {}", bad.display(), e);
        }
    }
    match std::fs::rename(path, &bad) {
        Ok(()) => Some(bad),
        Err(e) => {
            warn!("Could not quarantine {}: {}", path.display(), e);
            None
        }
    }
}

async fn hash_file(path: &Path) -> Option<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || md5_file_opt(path))
        .await
        .ok()
        .flatten()
}
