//! Reconciling the forms directory into the catalog.

mod common;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use common::{xform, TestProject};
use formsync_client::{
    disk_sync::DiskFormsSynchronizer,
    metadata::XFormMetadataParser,
    repository::{FormsRepository, RepositoryResult},
};
use formsync_core::{
    api::FormDbId, hash::md5_file, models::forms::Form, xform::parse_xform_file, FormState,
};
use pretty_assertions::assert_eq;

/// Inserts the looked-up file itself on the first path lookup, as a second
/// scanner running alongside would, and still answers that it is absent.
struct RacingFormsRepository {
    inner: Arc<dyn FormsRepository>,
    raced: AtomicBool,
}

#[async_trait]
impl FormsRepository for RacingFormsRepository {
    async fn get(&self, id: FormDbId) -> RepositoryResult<Option<Form>> {
        self.inner.get(id).await
    }

    async fn get_one_by_path(&self, path: &str) -> RepositoryResult<Option<Form>> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let metadata = parse_xform_file(path).unwrap();
            let hash = md5_file(path).unwrap();
            self.inner
                .save(&Form::from_metadata(metadata, Path::new(path), hash))
                .await?;
            return Ok(None);
        }
        self.inner.get_one_by_path(path).await
    }

    async fn get_one_by_md5_hash(&self, hash: &str) -> RepositoryResult<Option<Form>> {
        self.inner.get_one_by_md5_hash(hash).await
    }

    async fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Option<Form>> {
        self.inner.get_latest_by_form_id_and_version(form_id, version).await
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Form>> {
        self.inner.get_all().await
    }

    async fn get_all_not_deleted(&self) -> RepositoryResult<Vec<Form>> {
        self.inner.get_all_not_deleted().await
    }

    async fn get_all_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>> {
        self.inner.get_all_by_form_id(form_id).await
    }

    async fn get_all_not_deleted_by_form_id(&self, form_id: &str) -> RepositoryResult<Vec<Form>> {
        self.inner.get_all_not_deleted_by_form_id(form_id).await
    }

    async fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> RepositoryResult<Vec<Form>> {
        self.inner.get_all_by_form_id_and_version(form_id, version).await
    }

    async fn save(&self, form: &Form) -> RepositoryResult<Form> {
        self.inner.save(form).await
    }

    async fn delete(&self, id: FormDbId) -> RepositoryResult<()> {
        self.inner.delete(id).await
    }

    async fn soft_delete(&self, id: FormDbId) -> RepositoryResult<()> {
        self.inner.soft_delete(id).await
    }

    async fn restore(&self, id: FormDbId) -> RepositoryResult<()> {
        self.inner.restore(id).await
    }
}

#[tokio::test]
async fn test_new_files_are_added_once() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", Some("1"), "Birds", "a"));
    project.write_form("trees.xhtml", &xform("trees", None, "Trees", "a"));
    project.write_form(".hidden.xml", &xform("hidden", None, "Hidden", "a"));
    project.write_form("notes.txt", "not a form");

    assert_eq!(project.scan().await, "");
    let before = project.forms.get_all().await.unwrap();
    assert_eq!(project.scan().await, "");

    // The second scan changes nothing, timestamps included.
    let mut forms = project.forms.get_all().await.unwrap();
    assert_eq!(forms, before);
    forms.sort_by(|a, b| a.form_id.cmp(&b.form_id));
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0].form_id, "birds");
    assert_eq!(forms[0].version.as_deref(), Some("1"));
    assert_eq!(forms[0].display_name, "Birds");
    assert_eq!(forms[1].form_id, "trees");
    assert_eq!(forms[1].version, None);
    assert!(forms[1].form_media_path.ends_with("trees-media"));
}

#[tokio::test]
async fn test_edited_file_keeps_its_row() {
    let project = TestProject::new("p1").await;
    let path = project.write_form("birds.xml", &xform("birds", Some("1"), "Birds", "a"));
    project.scan().await;
    let before = project.forms.get_all().await.unwrap().remove(0);

    project.write_form("birds.xml", &xform("birds", Some("2"), "Birds", "b"));
    assert_eq!(project.scan().await, "");

    let forms = project.forms.get_all().await.unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].db_id, before.db_id);
    assert_eq!(forms[0].version.as_deref(), Some("2"));
    assert_eq!(forms[0].md5_hash, Some(md5_file(&path).unwrap()));
    assert_ne!(forms[0].md5_hash, before.md5_hash);
}

#[tokio::test]
async fn test_soft_deleted_rows_stay_soft_deleted_after_edit() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", Some("1"), "Birds", "a"));
    project.scan().await;
    let id = project.forms.get_all().await.unwrap()[0].db_id.unwrap();
    project.forms.soft_delete(id).await.unwrap();

    project.write_form("birds.xml", &xform("birds", Some("1"), "Birds", "b"));
    project.scan().await;

    let form = project.forms.get(id).await.unwrap().unwrap();
    assert_eq!(form.state, FormState::SoftDeleted);
}

#[tokio::test]
async fn test_missing_files_lose_their_rows() {
    let project = TestProject::new("p1").await;
    let path = project.write_form("birds.xml", &xform("birds", None, "Birds", "a"));
    project.scan().await;
    std::fs::remove_file(path).unwrap();

    assert_eq!(project.scan().await, "");
    assert!(project.forms.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_files_are_quarantined_and_reported() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", None, "Birds", "a"));
    project.write_form("broken.xml", "<h:html");

    let errors = project.scan().await;
    assert!(errors.contains("broken.xml"));
    assert_eq!(
        project.forms_dir_entries(),
        vec!["birds.xml".to_string(), "broken.xml.bad".to_string()]
    );
    assert_eq!(project.forms.get_all().await.unwrap().len(), 1);

    // Quarantined files are not retried.
    assert_eq!(project.scan().await, "");
}

#[tokio::test]
async fn test_file_that_breaks_after_import_is_dropped() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", None, "Birds", "a"));
    project.scan().await;

    project.write_form("birds.xml", "<h:html><h:head/></h:html>");
    let errors = project.scan().await;

    assert!(errors.contains("birds.xml"));
    assert!(project.forms.get_all().await.unwrap().is_empty());
    assert_eq!(project.forms_dir_entries(), vec!["birds.xml.bad".to_string()]);
}

#[tokio::test]
async fn test_missing_forms_directory_clears_the_catalog() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", None, "Birds", "a"));
    project.scan().await;
    assert_eq!(project.forms.get_all().await.unwrap().len(), 1);

    std::fs::remove_dir_all(project.forms_dir()).unwrap();
    assert_eq!(project.scan().await, "");
    assert!(project.forms.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_added_by_a_concurrent_scan_is_skipped() {
    let project = TestProject::new("p1").await;
    for name in ["a", "b", "c", "d", "e"] {
        project.write_form(&format!("{}.xml", name), &xform(name, None, name, "a"));
    }
    let racing: Arc<dyn FormsRepository> = Arc::new(RacingFormsRepository {
        inner: project.forms.clone(),
        raced: AtomicBool::new(false),
    });
    let synchronizer = DiskFormsSynchronizer::new(
        project.forms_dir().to_path_buf(),
        racing,
        Arc::new(XFormMetadataParser),
    );

    assert_eq!(synchronizer.synchronize_and_return_error().await.unwrap(), "");

    let mut form_ids: Vec<String> = project
        .forms
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|x| x.form_id)
        .collect();
    form_ids.sort();
    assert_eq!(form_ids, vec!["a", "b", "c", "d", "e"]);
}
