//! "Match exactly": make the device hold exactly the server's forms.

use std::{collections::HashSet, sync::Arc};

use formsync_core::models::server::ServerFormDetails;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    deletion::FormDeleter,
    details_fetcher::ServerFormsDetailsFetcher,
    downloader::{FormDownloaderListener, ServerFormDownloader},
    error::FormsSyncError,
    repository::FormsRepository,
};

pub struct ServerFormsSynchronizer {
    fetcher: ServerFormsDetailsFetcher,
    downloader: ServerFormDownloader,
    deleter: FormDeleter,
    forms_repository: Arc<dyn FormsRepository>,
}

impl ServerFormsSynchronizer {
    pub fn new(
        fetcher: ServerFormsDetailsFetcher,
        downloader: ServerFormDownloader,
        deleter: FormDeleter,
        forms_repository: Arc<dyn FormsRepository>,
    ) -> Self {
        ServerFormsSynchronizer {
            fetcher,
            downloader,
            deleter,
            forms_repository,
        }
    }

    /// Callers are expected to hold the project's forms lock.
    pub async fn synchronize(
        &self,
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> Result<(), FormsSyncError> {
        let details = self.fetcher.fetch_form_details().await?;

        let to_download: Vec<ServerFormDetails> = details
            .iter()
            .filter(|x| x.needs_download())
            .cloned()
            .collect();
        info!(
            "{} of {} server form(s) need downloading",
            to_download.len(),
            details.len()
        );

        let outcome = self
            .downloader
            .download_all(&to_download, listener, cancel)
            .await;
        if outcome.interrupted {
            return Err(FormsSyncError::Interrupted);
        }

        let server_form_ids: HashSet<&str> = details.iter().map(|x| x.form_id.as_str()).collect();
        for form in self.forms_repository.get_all_not_deleted().await? {
            if server_form_ids.contains(form.form_id.as_str()) {
                continue;
            }
            if let Some(id) = form.db_id {
                info!("{} is no longer on the server, deleting", form.form_id);
                self.deleter.delete(id).await?;
            }
        }

        let failures = outcome.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FormsSyncError::DownloadFailures(failures))
        }
    }
}
