//! Compares a server's form list against the local catalog without touching it.

use std::{collections::HashSet, path::Path, sync::Arc};

use formsync_core::{
    hash::md5_file_opt,
    models::{
        forms::Form,
        server::{MediaFile, ServerFormDetails, ServerFormListItem},
    },
    FormDetailsType,
};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::{error::FormsSyncError, form_source::FormSource, repository::FormsRepository};

pub struct ServerFormsDetailsFetcher {
    forms_repository: Arc<dyn FormsRepository>,
    form_source: Arc<dyn FormSource>,
}

impl ServerFormsDetailsFetcher {
    pub fn new(forms_repository: Arc<dyn FormsRepository>, form_source: Arc<dyn FormSource>) -> Self {
        ServerFormsDetailsFetcher {
            forms_repository,
            form_source,
        }
    }

    /// One entry per server form, in the server's order. Only a failure to
    /// fetch the list itself is an error; a broken manifest just means the
    /// form is compared on its definition alone.
    pub async fn fetch_form_details(&self) -> Result<Vec<ServerFormDetails>, FormsSyncError> {
        let form_list = self.form_source.fetch_form_list().await?;
        let mut details = Vec::with_capacity(form_list.len());
        for item in form_list {
            let manifest = match &item.manifest_url {
                Some(url) => match self.form_source.fetch_manifest(url).await {
                    Ok(manifest) => Some(manifest),
                    Err(e) => {
                        warn!("Could not fetch manifest for {}: {}", item.form_id, e);
                        None
                    }
                },
                None => None,
            };
            details.push(self.classify(item, manifest).await?);
        }
        Ok(details)
    }

    async fn classify(
        &self,
        item: ServerFormListItem,
        manifest: Option<Vec<MediaFile>>,
    ) -> Result<ServerFormDetails, FormsSyncError> {
        let local = self
            .forms_repository
            .get_all_not_deleted_by_form_id(&item.form_id)
            .await?;
        let already_downloaded = !local.is_empty();

        let existing = match &item.hash {
            Some(hash) => self.forms_repository.get_one_by_md5_hash(hash).await?,
            None => None,
        };

        let newer_version =
            already_downloaded && existing.as_ref().map_or(true, |form| form.is_deleted());

        let newer_media = match (&existing, &manifest) {
            (Some(form), Some(media_files)) => are_newer_media_files_available(form, media_files),
            _ => false,
        };

        let details_type = if !already_downloaded {
            FormDetailsType::New
        } else if newer_version {
            if local.iter().any(|form| form.version == item.version) {
                FormDetailsType::UpdatedHash
            } else {
                FormDetailsType::UpdatedVersion
            }
        } else if newer_media {
            FormDetailsType::UpdatedMedia
        } else {
            FormDetailsType::OnDevice
        };
        debug!("{} ({:?}) is {}", item.form_id, item.version, details_type);

        Ok(ServerFormDetails {
            form_name: item.name,
            download_url: item.download_url,
            form_id: item.form_id,
            form_version: item.version,
            hash: item.hash,
            manifest,
            details_type,
            is_not_on_device: !already_downloaded,
            is_updated: newer_version || newer_media,
        })
    }
}

/// True when the manifest lists a non-zip file whose hash is not among the
/// form's current media.
pub fn are_newer_media_files_available(form: &Form, media_files: &[MediaFile]) -> bool {
    if media_files.is_empty() {
        return false;
    }
    let local_hashes = media_hashes(form.media_path());
    media_files
        .iter()
        .filter(|x| !x.is_zip())
        .any(|x| !local_hashes.contains(&x.hash))
}

pub fn media_hashes(media_dir: &Path) -> HashSet<String> {
    if !media_dir.is_dir() {
        return HashSet::new();
    }
    WalkDir::new(media_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|x| x.ok())
        .filter(|x| x.file_type().is_file())
        .filter_map(|x| md5_file_opt(x.path()))
        .collect()
}
