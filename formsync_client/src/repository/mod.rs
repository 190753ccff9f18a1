//! Persistent catalogs of forms and instances.

use async_trait::async_trait;
use formsync_core::{
    api::{FormDbId, InstanceDbId},
    models::{forms::Form, instances::Instance},
};
use thiserror::Error;

mod sqlite;

pub use sqlite::{Database, SqliteFormsRepository, SqliteInstancesRepository};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    /// A row with the same unique key (the form's file path) already exists.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepositoryError::Database(sqlx::Error::Database(e)) if e.is_unique_violation())
    }
}

/// The form catalog. `form_file_path` is unique and is what ties a row to
/// the file on disk; `(form_id, version)` is not.
#[async_trait]
pub trait FormsRepository: Send + Sync {
    async fn get(&self, id: FormDbId) -> RepositoryResult<Option<Form>>;

    async fn get_one_by_path(&self, path: &str) -> RepositoryResult<Option<Form>>;

    async fn get_one_by_md5_hash(&self, hash: &str) -> RepositoryResult<Option<Form>>;

    /// Most recently modified row for the pair, deleted or not.
    async fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Option<Form>>;

    /// Every row, soft-deleted ones included.
    async fn get_all(&self) -> RepositoryResult<Vec<Form>>;

    async fn get_all_not_deleted(&self) -> RepositoryResult<Vec<Form>>;

    async fn get_all_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>>;

    async fn get_all_not_deleted_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>>;

    async fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Vec<Form>>;

    /// Inserts when `db_id` is `None`, updates otherwise. Returns the saved row.
    async fn save(&self, form: &Form) -> RepositoryResult<Form>;

    /// Removes the row together with its definition file and media directory.
    async fn delete(&self, id: FormDbId) -> RepositoryResult<()>;

    async fn soft_delete(&self, id: FormDbId) -> RepositoryResult<()>;

    async fn restore(&self, id: FormDbId) -> RepositoryResult<()>;
}

#[async_trait]
pub trait InstancesRepository: Send + Sync {
    async fn save(&self, instance: &Instance) -> RepositoryResult<Instance>;

    async fn get_all(&self) -> RepositoryResult<Vec<Instance>>;

    async fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Vec<Instance>>;

    async fn soft_delete(&self, id: InstanceDbId) -> RepositoryResult<()>;
}
