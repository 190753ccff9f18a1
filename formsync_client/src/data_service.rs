//! The entry point everything else calls.
//!
//! Every mutation runs under the project's forms lock. Results are published
//! as observable per-project state; nothing here returns an error.

use std::{collections::HashMap, sync::Arc};

use formsync_core::{
    api::{FormDbId, ProjectId},
    models::{forms::Form, server::ServerFormDetails},
};
use log::{error, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    change_lock::ChangeLocks,
    deletion::DeletionOutcome,
    downloader::{FormDownloadResult, FormDownloaderListener},
    error::{FormSourceError, FormsSyncError},
    project::{Project, ProjectRegistry},
};

struct ProjectState {
    syncing: watch::Sender<bool>,
    sync_error: watch::Sender<Option<FormSourceError>>,
    disk_error: watch::Sender<Option<String>>,
    forms: watch::Sender<Vec<Form>>,
}

impl Default for ProjectState {
    fn default() -> Self {
        ProjectState {
            syncing: watch::channel(false).0,
            sync_error: watch::channel(None).0,
            disk_error: watch::channel(None).0,
            forms: watch::channel(Vec::new()).0,
        }
    }
}

/// Publishes `syncing = true` for as long as it lives, so a pass that is
/// dropped midway still ends as not syncing.
struct SyncingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> SyncingGuard<'a> {
    fn start(syncing: &'a watch::Sender<bool>) -> Self {
        syncing.send_replace(true);
        SyncingGuard(syncing)
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

pub struct FormsDataService {
    projects: Arc<ProjectRegistry>,
    locks: Arc<ChangeLocks>,
    states: Mutex<HashMap<ProjectId, Arc<ProjectState>>>,
}

impl FormsDataService {
    pub fn new(projects: Arc<ProjectRegistry>, locks: Arc<ChangeLocks>) -> Self {
        FormsDataService {
            projects,
            locks,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn state(&self, project_id: &ProjectId) -> Arc<ProjectState> {
        self.states
            .lock()
            .entry(project_id.clone())
            .or_default()
            .clone()
    }

    fn project(&self, project_id: &ProjectId) -> Option<Arc<Project>> {
        let project = self.projects.get(project_id);
        if project.is_none() {
            warn!("Unknown project {}", project_id);
        }
        project
    }

    /// Non-deleted forms, as of the last refresh.
    pub fn get_forms(&self, project_id: &ProjectId) -> watch::Receiver<Vec<Form>> {
        self.state(project_id).forms.subscribe()
    }

    pub fn is_syncing(&self, project_id: &ProjectId) -> watch::Receiver<bool> {
        self.state(project_id).syncing.subscribe()
    }

    pub fn get_sync_error(&self, project_id: &ProjectId) -> watch::Receiver<Option<FormSourceError>> {
        self.state(project_id).sync_error.subscribe()
    }

    pub fn get_disk_error(&self, project_id: &ProjectId) -> watch::Receiver<Option<String>> {
        self.state(project_id).disk_error.subscribe()
    }

    pub fn clear(&self, project_id: &ProjectId) {
        self.state(project_id).sync_error.send_replace(None);
    }

    /// Re-publishes the form list from the catalog.
    pub async fn refresh(&self, project_id: &ProjectId) {
        let Some(project) = self.project(project_id) else {
            return;
        };
        match project.forms_repository.get_all_not_deleted().await {
            Ok(forms) => {
                self.state(project_id).forms.send_replace(forms);
            }
            Err(e) => error!("Could not load forms for {}: {}", project_id, e),
        }
    }

    /// Reconciles the catalog with the forms directory.
    pub async fn update(&self, project_id: &ProjectId) {
        let Some(project) = self.project(project_id) else {
            return;
        };
        let state = self.state(project_id);
        self.locks
            .forms_lock(project_id)
            .with_lock(|acquired| async move {
                if acquired {
                    sync_with_disk(&project, &state).await;
                }
            })
            .await;
        self.refresh(project_id).await;
    }

    /// Read-only diff against the server. Runs without the lock; a failure is
    /// published as the project's sync error.
    pub async fn fetch_form_details(&self, project_id: &ProjectId) -> Option<Vec<ServerFormDetails>> {
        let project = self.project(project_id)?;
        match project.details_fetcher().fetch_form_details().await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!("Could not fetch form details for {}: {}", project_id, e);
                self.state(project_id)
                    .sync_error
                    .send_replace(Some(e.to_source_error()));
                None
            }
        }
    }

    /// Makes the project's forms exactly match the server's. Returns `false`
    /// when another pass holds the lock or the pass failed.
    pub async fn match_forms_with_server(
        &self,
        project_id: &ProjectId,
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(project) = self.project(project_id) else {
            return false;
        };
        let state = self.state(project_id);
        let synchronized = self
            .locks
            .forms_lock(project_id)
            .with_lock(|acquired| async move {
                if !acquired {
                    info!("Forms of {} are already being changed, skipping", project_id);
                    return false;
                }
                let _syncing = SyncingGuard::start(&state.syncing);
                sync_with_disk(&project, &state).await;
                let result = project
                    .server_synchronizer()
                    .synchronize(listener, cancel)
                    .await;
                publish_sync_result(&state, result)
            })
            .await;
        self.refresh(project_id).await;
        synchronized
    }

    /// Downloads newer versions of forms that are already on the device.
    /// Does nothing unless the project allows automatic updates.
    pub async fn download_updates(&self, project_id: &ProjectId, cancel: &CancellationToken) -> bool {
        let Some(project) = self.project(project_id) else {
            return false;
        };
        if !project.settings.automatic_update {
            info!("Automatic updates are off for {}", project_id);
            return false;
        }
        let state = self.state(project_id);
        let updated = self
            .locks
            .forms_lock(project_id)
            .with_lock(|acquired| async move {
                if !acquired {
                    return false;
                }
                let _syncing = SyncingGuard::start(&state.syncing);
                sync_with_disk(&project, &state).await;
                let result = download_available_updates(&project, cancel).await;
                publish_sync_result(&state, result)
            })
            .await;
        self.refresh(project_id).await;
        updated
    }

    /// Downloads the chosen forms. `None` when the lock was not acquired.
    /// An interrupted batch returns only the results of the forms before it.
    pub async fn download_forms(
        &self,
        project_id: &ProjectId,
        forms: &[ServerFormDetails],
        listener: Option<&dyn FormDownloaderListener>,
        cancel: &CancellationToken,
    ) -> Option<Vec<FormDownloadResult>> {
        let project = self.project(project_id)?;
        let state = self.state(project_id);
        let results = self
            .locks
            .forms_lock(project_id)
            .with_lock(|acquired| async move {
                if !acquired {
                    return None;
                }
                let _syncing = SyncingGuard::start(&state.syncing);
                let outcome = project.downloader().download_all(forms, listener, cancel).await;
                Some(outcome.results)
            })
            .await;
        self.refresh(project_id).await;
        results
    }

    /// Deletes one form following the soft/hard deletion policy.
    pub async fn delete_form(&self, project_id: &ProjectId, id: FormDbId) -> Option<DeletionOutcome> {
        let project = self.project(project_id)?;
        let outcome = self
            .locks
            .forms_lock(project_id)
            .with_lock(|acquired| async move {
                if !acquired {
                    return None;
                }
                match project.deleter().delete(id).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Could not delete form {}: {}", id, e);
                        None
                    }
                }
            })
            .await;
        self.refresh(project_id).await;
        outcome
    }
}

async fn sync_with_disk(project: &Project, state: &ProjectState) {
    let disk_error = match project.disk_synchronizer().synchronize_and_return_error().await {
        Ok(errors) if errors.is_empty() => None,
        Ok(errors) => Some(errors),
        Err(e) => {
            error!("Disk sync of {} failed: {}", project.id, e);
            Some(e.to_string())
        }
    };
    state.disk_error.send_replace(disk_error);
}

async fn download_available_updates(
    project: &Project,
    cancel: &CancellationToken,
) -> Result<(), FormsSyncError> {
    let details = project.details_fetcher().fetch_form_details().await?;
    let updates: Vec<ServerFormDetails> = details
        .into_iter()
        .filter(|x| x.is_updated && !x.is_not_on_device)
        .collect();
    info!("{} update(s) available for {}", updates.len(), project.id);

    let outcome = project.downloader().download_all(&updates, None, cancel).await;
    if outcome.interrupted {
        return Err(FormsSyncError::Interrupted);
    }
    let failures = outcome.failures();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(FormsSyncError::DownloadFailures(failures))
    }
}

fn publish_sync_result(state: &ProjectState, result: Result<(), FormsSyncError>) -> bool {
    match result {
        Ok(()) => {
            state.sync_error.send_replace(None);
            true
        }
        Err(FormsSyncError::Interrupted) => {
            info!("Synchronization was interrupted");
            false
        }
        Err(e) => {
            warn!("Synchronization failed: {}", e);
            state.sync_error.send_replace(Some(e.to_source_error()));
            false
        }
    }
}
