use std::{path::Path, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formsync_core::{
    api::{FormDbId, InstanceDbId},
    models::{forms::Form, instances::Instance},
    FormState, InstanceStatus, StrConversion,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    FromRow, SqlitePool,
};

use super::{FormsRepository, InstancesRepository, RepositoryResult};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS forms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        form_id TEXT NOT NULL,
        version TEXT,
        display_name TEXT NOT NULL,
        md5_hash TEXT,
        form_file_path TEXT NOT NULL UNIQUE,
        form_media_path TEXT NOT NULL,
        submission_uri TEXT,
        base64_rsa_public_key TEXT,
        auto_delete TEXT,
        auto_send TEXT,
        geometry_xpath TEXT,
        state TEXT NOT NULL,
        last_modified TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS forms_form_id_version ON forms (form_id, version)",
    "CREATE INDEX IF NOT EXISTS forms_md5_hash ON forms (md5_hash)",
    "CREATE TABLE IF NOT EXISTS instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        form_id TEXT NOT NULL,
        form_version TEXT,
        instance_file_path TEXT NOT NULL,
        status TEXT NOT NULL,
        last_status_change TEXT NOT NULL,
        deleted_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS instances_form_id_version ON instances (form_id, form_version)",
];

const FORM_COLUMNS: &str = "id, form_id, version, display_name, md5_hash, form_file_path,
    form_media_path, submission_uri, base64_rsa_public_key, auto_delete, auto_send,
    geometry_xpath, state, last_modified";

const INSTANCE_COLUMNS: &str =
    "id, form_id, form_version, instance_file_path, status, last_status_change, deleted_at";

/// A project's sqlite database. Both catalogs share its pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open<P>(path: P) -> RepositoryResult<Self>
    where
        P: AsRef<Path>,
    {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private database that lives as long as its single connection.
    pub async fn open_in_memory() -> RepositoryResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> RepositoryResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Database { pool })
    }

    pub fn forms(&self) -> SqliteFormsRepository {
        SqliteFormsRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn instances(&self) -> SqliteInstancesRepository {
        SqliteInstancesRepository {
            pool: self.pool.clone(),
        }
    }
}

#[derive(FromRow)]
struct FormRow {
    id: i64,
    form_id: String,
    version: Option<String>,
    display_name: String,
    md5_hash: Option<String>,
    form_file_path: String,
    form_media_path: String,
    submission_uri: Option<String>,
    base64_rsa_public_key: Option<String>,
    auto_delete: Option<String>,
    auto_send: Option<String>,
    geometry_xpath: Option<String>,
    state: String,
    last_modified: DateTime<Utc>,
}

impl From<FormRow> for Form {
    fn from(x: FormRow) -> Self {
        Form {
            db_id: Some(FormDbId(x.id)),
            form_id: x.form_id,
            version: x.version,
            display_name: x.display_name,
            md5_hash: x.md5_hash,
            form_file_path: x.form_file_path,
            form_media_path: x.form_media_path,
            submission_uri: x.submission_uri,
            base64_rsa_public_key: x.base64_rsa_public_key,
            auto_delete: x.auto_delete,
            auto_send: x.auto_send,
            geometry_xpath: x.geometry_xpath,
            state: FormState::from_str(&x.state),
            last_modified: x.last_modified,
        }
    }
}

#[derive(Clone)]
pub struct SqliteFormsRepository {
    pool: SqlitePool,
}

impl SqliteFormsRepository {
    async fn fetch_all(&self, sql: &str, binds: &[Option<&str>]) -> RepositoryResult<Vec<Form>> {
        let mut query = sqlx::query_as::<_, FormRow>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        Ok(query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|x| x.into())
            .collect())
    }

    async fn set_state(&self, id: FormDbId, state: FormState) -> RepositoryResult<()> {
        sqlx::query("UPDATE forms SET state = ?, last_modified = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(Utc::now())
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FormsRepository for SqliteFormsRepository {
    async fn get(&self, id: FormDbId) -> RepositoryResult<Option<Form>> {
        let form = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {} FROM forms WHERE id = ?",
            FORM_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(|x| x.into());
        Ok(form)
    }

    async fn get_one_by_path(&self, path: &str) -> RepositoryResult<Option<Form>> {
        let form = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {} FROM forms WHERE form_file_path = ? LIMIT 1",
            FORM_COLUMNS
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?
        .map(|x| x.into());
        Ok(form)
    }

    async fn get_one_by_md5_hash(&self, hash: &str) -> RepositoryResult<Option<Form>> {
        let form = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {} FROM forms WHERE md5_hash = ? ORDER BY id LIMIT 1",
            FORM_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?
        .map(|x| x.into());
        Ok(form)
    }

    async fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Option<Form>> {
        let form = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {} FROM forms WHERE form_id = ? AND version IS ?
            ORDER BY last_modified DESC, id DESC LIMIT 1",
            FORM_COLUMNS
        ))
        .bind(form_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .map(|x| x.into());
        Ok(form)
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Form>> {
        self.fetch_all(&format!("SELECT {} FROM forms ORDER BY id", FORM_COLUMNS), &[])
            .await
    }

    async fn get_all_not_deleted(&self) -> RepositoryResult<Vec<Form>> {
        self.fetch_all(
            &format!(
                "SELECT {} FROM forms WHERE state = ? ORDER BY display_name, id",
                FORM_COLUMNS
            ),
            &[Some(FormState::Active.as_str())],
        )
        .await
    }

    async fn get_all_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>> {
        self.fetch_all(
            &format!("SELECT {} FROM forms WHERE form_id = ? ORDER BY id", FORM_COLUMNS),
            &[Some(form_id)],
        )
        .await
    }

    async fn get_all_not_deleted_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>> {
        self.fetch_all(
            &format!(
                "SELECT {} FROM forms WHERE form_id = ? AND state = ? ORDER BY id",
                FORM_COLUMNS
            ),
            &[Some(form_id), Some(FormState::Active.as_str())],
        )
        .await
    }

    async fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Vec<Form>> {
        self.fetch_all(
            &format!(
                "SELECT {} FROM forms WHERE form_id = ? AND version IS ? ORDER BY id",
                FORM_COLUMNS
            ),
            &[Some(form_id), version],
        )
        .await
    }

    async fn save(&self, form: &Form) -> RepositoryResult<Form> {
        let mut saved = form.clone();
        match form.db_id {
            None => {
                let result = sqlx::query(
                    "INSERT INTO forms (form_id, version, display_name, md5_hash, form_file_path,
                    form_media_path, submission_uri, base64_rsa_public_key, auto_delete, auto_send,
                    geometry_xpath, state, last_modified)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&form.form_id)
                .bind(&form.version)
                .bind(&form.display_name)
                .bind(&form.md5_hash)
                .bind(&form.form_file_path)
                .bind(&form.form_media_path)
                .bind(&form.submission_uri)
                .bind(&form.base64_rsa_public_key)
                .bind(&form.auto_delete)
                .bind(&form.auto_send)
                .bind(&form.geometry_xpath)
                .bind(form.state.as_str())
                .bind(form.last_modified)
                .execute(&self.pool)
                .await?;
                saved.db_id = Some(FormDbId(result.last_insert_rowid()));
            }
            Some(id) => {
                sqlx::query(
                    "UPDATE forms SET form_id = ?, version = ?, display_name = ?, md5_hash = ?,
                    form_file_path = ?, form_media_path = ?, submission_uri = ?,
                    base64_rsa_public_key = ?, auto_delete = ?, auto_send = ?, geometry_xpath = ?,
                    state = ?, last_modified = ?
                    WHERE id = ?",
                )
                .bind(&form.form_id)
                .bind(&form.version)
                .bind(&form.display_name)
                .bind(&form.md5_hash)
                .bind(&form.form_file_path)
                .bind(&form.form_media_path)
                .bind(&form.submission_uri)
                .bind(&form.base64_rsa_public_key)
                .bind(&form.auto_delete)
                .bind(&form.auto_send)
                .bind(&form.geometry_xpath)
                .bind(form.state.as_str())
                .bind(form.last_modified)
                .bind(id.0)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(saved)
    }

    async fn delete(&self, id: FormDbId) -> RepositoryResult<()> {
        let Some(form) = self.get(id).await? else {
            return Ok(());
        };
        sqlx::query("DELETE FROM forms WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if tokio::fs::try_exists(form.file_path()).await? {
            tokio::fs::remove_file(form.file_path()).await?;
        }
        if tokio::fs::try_exists(form.media_path()).await? {
            tokio::fs::remove_dir_all(form.media_path()).await?;
        }
        Ok(())
    }

    async fn soft_delete(&self, id: FormDbId) -> RepositoryResult<()> {
        self.set_state(id, FormState::SoftDeleted).await
    }

    async fn restore(&self, id: FormDbId) -> RepositoryResult<()> {
        self.set_state(id, FormState::Active).await
    }
}

#[derive(FromRow)]
struct InstanceRow {
    id: i64,
    form_id: String,
    form_version: Option<String>,
    instance_file_path: String,
    status: String,
    last_status_change: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<InstanceRow> for Instance {
    fn from(x: InstanceRow) -> Self {
        Instance {
            db_id: Some(InstanceDbId(x.id)),
            form_id: x.form_id,
            form_version: x.form_version,
            instance_file_path: x.instance_file_path,
            status: InstanceStatus::from_str(&x.status),
            last_status_change: x.last_status_change,
            deleted_at: x.deleted_at,
        }
    }
}

#[derive(Clone)]
pub struct SqliteInstancesRepository {
    pool: SqlitePool,
}

#[async_trait]
impl InstancesRepository for SqliteInstancesRepository {
    async fn save(&self, instance: &Instance) -> RepositoryResult<Instance> {
        let mut saved = instance.clone();
        match instance.db_id {
            None => {
                let result = sqlx::query(
                    "INSERT INTO instances (form_id, form_version, instance_file_path, status,
                    last_status_change, deleted_at)
                    VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&instance.form_id)
                .bind(&instance.form_version)
                .bind(&instance.instance_file_path)
                .bind(instance.status.as_str())
                .bind(instance.last_status_change)
                .bind(instance.deleted_at)
                .execute(&self.pool)
                .await?;
                saved.db_id = Some(InstanceDbId(result.last_insert_rowid()));
            }
            Some(id) => {
                sqlx::query(
                    "UPDATE instances SET form_id = ?, form_version = ?, instance_file_path = ?,
                    status = ?, last_status_change = ?, deleted_at = ?
                    WHERE id = ?",
                )
                .bind(&instance.form_id)
                .bind(&instance.form_version)
                .bind(&instance.instance_file_path)
                .bind(instance.status.as_str())
                .bind(instance.last_status_change)
                .bind(instance.deleted_at)
                .bind(id.0)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(saved)
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Instance>> {
        let instances = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {} FROM instances ORDER BY id",
            INSTANCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|x| x.into())
        .collect();
        Ok(instances)
    }

    async fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Vec<Instance>> {
        let instances = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {} FROM instances
            WHERE form_id = ? AND form_version IS ? AND deleted_at IS NULL
            ORDER BY id",
            INSTANCE_COLUMNS
        ))
        .bind(form_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|x| x.into())
        .collect();
        Ok(instances)
    }

    async fn soft_delete(&self, id: InstanceDbId) -> RepositoryResult<()> {
        sqlx::query("UPDATE instances SET deleted_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
