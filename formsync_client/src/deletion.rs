//! The policy shared by manual deletion and "match exactly" sync.
//!
//! Instances find their form by `(form_id, version)`. A version that live
//! instances still point to is only flagged, unless another row with the same
//! pair can stand in for it.

use std::sync::Arc;

use formsync_core::{api::FormDbId, FormState};
use log::info;

use crate::repository::{FormsRepository, InstancesRepository, RepositoryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    HardDeleted,
    SoftDeleted,
}

/// State a form row moves to when deleted; `None` means the row goes away.
pub fn deletion_target(live_instances: usize, rows_sharing_version: usize) -> Option<FormState> {
    if live_instances == 0 || rows_sharing_version > 1 {
        None
    } else {
        Some(FormState::SoftDeleted)
    }
}

pub struct FormDeleter {
    forms_repository: Arc<dyn FormsRepository>,
    instances_repository: Arc<dyn InstancesRepository>,
}

impl FormDeleter {
    pub fn new(
        forms_repository: Arc<dyn FormsRepository>,
        instances_repository: Arc<dyn InstancesRepository>,
    ) -> Self {
        FormDeleter {
            forms_repository,
            instances_repository,
        }
    }

    /// `Ok(None)` when there is no such form.
    pub async fn delete(&self, id: FormDbId) -> RepositoryResult<Option<DeletionOutcome>> {
        let Some(form) = self.forms_repository.get(id).await? else {
            return Ok(None);
        };
        let version = form.version.as_deref();
        let live_instances = self
            .instances_repository
            .get_all_not_deleted_by_form_id_and_version(&form.form_id, version)
            .await?;
        let rows = self
            .forms_repository
            .get_all_by_form_id_and_version(&form.form_id, version)
            .await?;

        match deletion_target(live_instances.len(), rows.len()) {
            None => {
                info!("Deleting form {} ({:?})", form.form_id, form.version);
                self.forms_repository.delete(id).await?;
                Ok(Some(DeletionOutcome::HardDeleted))
            }
            Some(_) => {
                info!(
                    "Form {} ({:?}) still has {} instance(s), soft-deleting",
                    form.form_id,
                    form.version,
                    live_instances.len()
                );
                self.forms_repository.soft_delete(id).await?;
                Ok(Some(DeletionOutcome::SoftDeleted))
            }
        }
    }
}
