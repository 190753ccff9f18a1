//! Matching a project exactly against its server, directly and through the
//! data service.

mod common;

use std::sync::Arc;

use common::{xform, TestProject};
use formsync_client::{
    change_lock::ChangeLocks,
    config::ProjectSettings,
    data_service::FormsDataService,
    deletion::DeletionOutcome,
    error::{FormSourceError, FormsSyncError},
    project::{Project, ProjectRegistry},
};
use formsync_core::{api::ProjectId, models::instances::Instance, FormState};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn service_for(project: &TestProject) -> (FormsDataService, Arc<ChangeLocks>) {
    let mut registry = ProjectRegistry::new();
    registry.insert(copy_of(&project.project, project.project.settings.clone()));
    let locks = Arc::new(ChangeLocks::new());
    (FormsDataService::new(Arc::new(registry), locks.clone()), locks)
}

fn copy_of(project: &Project, settings: ProjectSettings) -> Project {
    let mut copy = Project::new(
        project.id.clone(),
        project.forms_dir.parent().unwrap(),
        project.forms_repository.clone(),
        project.instances_repository.clone(),
        project.form_source.clone(),
    );
    copy.settings = settings;
    copy
}

// =============================================================================
// ServerFormsSynchronizer
// =============================================================================

#[tokio::test]
async fn test_forms_missing_from_server_are_deleted() {
    let project = TestProject::new("p1").await;
    project.write_form("old.xml", &xform("old", None, "Old", "a"));
    project.write_form("kept.xml", &xform("kept", None, "Kept", "a"));
    project.write_form("used.xml", &xform("used", None, "Used", "a"));
    project.scan().await;
    project
        .instances
        .save(&Instance::new("used", None, "/instances/used.xml"))
        .await
        .unwrap();

    project
        .source
        .add_form("kept", None, &xform("kept", None, "Kept", "a"), &[]);
    project
        .source
        .add_form("fresh", None, &xform("fresh", None, "Fresh", "a"), &[]);

    project
        .project
        .server_synchronizer()
        .synchronize(None, &CancellationToken::new())
        .await
        .unwrap();

    let mut active: Vec<String> = project
        .forms
        .get_all_not_deleted()
        .await
        .unwrap()
        .into_iter()
        .map(|x| x.form_id)
        .collect();
    active.sort();
    assert_eq!(active, vec!["fresh".to_string(), "kept".to_string()]);

    // Forms with live instances are only flagged.
    let used = project.forms.get_all_by_form_id("used").await.unwrap();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].state, FormState::SoftDeleted);
    assert!(project.forms.get_all_by_form_id("old").await.unwrap().is_empty());
    assert!(!project.forms_dir().join("old.xml").exists());
}

#[tokio::test]
async fn test_download_failures_are_reported_after_deletions() {
    let project = TestProject::new("p1").await;
    project.write_form("old.xml", &xform("old", None, "Old", "a"));
    project.scan().await;
    let broken = project
        .source
        .add_form("birds", None, &xform("birds", None, "Birds", "a"), &[]);
    project.source.remove_file(&broken.download_url);

    let err = project
        .project
        .server_synchronizer()
        .synchronize(None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FormsSyncError::DownloadFailures(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].form_id, "birds");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(project.forms.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_changes_nothing() {
    let project = TestProject::new("p1").await;
    project.write_form("old.xml", &xform("old", None, "Old", "a"));
    project.scan().await;
    project
        .source
        .fail_form_list(FormSourceError::Unreachable("http://fake".to_string()));

    let err = project
        .project
        .server_synchronizer()
        .synchronize(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_source_error(),
        FormSourceError::Unreachable("http://fake".to_string())
    );
    assert_eq!(project.forms.get_all_not_deleted().await.unwrap().len(), 1);
}

// =============================================================================
// FormsDataService
// =============================================================================

#[tokio::test]
async fn test_match_publishes_forms_and_clears_errors() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("p1");
    project
        .source
        .add_form("birds", None, &xform("birds", None, "Birds", "a"), &[]);

    let forms = service.get_forms(&id);
    let syncing = service.is_syncing(&id);
    assert!(
        service
            .match_forms_with_server(&id, None, &CancellationToken::new())
            .await
    );

    assert_eq!(forms.borrow().len(), 1);
    assert_eq!(forms.borrow()[0].form_id, "birds");
    assert!(!*syncing.borrow());
    assert_eq!(*service.get_sync_error(&id).borrow(), None);
    assert_eq!(*service.get_disk_error(&id).borrow(), None);
}

#[tokio::test]
async fn test_sync_errors_are_published_until_cleared() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("p1");
    project
        .source
        .fail_form_list(FormSourceError::Security("http://fake".to_string()));

    assert!(
        !service
            .match_forms_with_server(&id, None, &CancellationToken::new())
            .await
    );
    assert_eq!(
        *service.get_sync_error(&id).borrow(),
        Some(FormSourceError::Security("http://fake".to_string()))
    );

    service.clear(&id);
    assert_eq!(*service.get_sync_error(&id).borrow(), None);

    assert_eq!(service.fetch_form_details(&id).await, None);
    assert!(service.get_sync_error(&id).borrow().is_some());
}

#[tokio::test]
async fn test_disk_errors_are_published() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("p1");
    project.write_form("broken.xml", "<h:html");

    service.update(&id).await;

    let disk_error = service.get_disk_error(&id).borrow().clone();
    assert!(disk_error.unwrap().contains("broken.xml"));
}

#[tokio::test]
async fn test_held_lock_skips_the_pass() {
    let project = TestProject::new("p1").await;
    let (service, locks) = service_for(&project);
    let id = ProjectId::from("p1");
    project
        .source
        .add_form("birds", None, &xform("birds", None, "Birds", "a"), &[]);

    let (service, project_id) = (&service, &id);
    let matched = locks
        .forms_lock(&id)
        .with_lock(|acquired| async move {
            assert!(acquired);
            service
                .match_forms_with_server(project_id, None, &CancellationToken::new())
                .await
        })
        .await;

    assert!(!matched);
    assert!(project.forms.get_all().await.unwrap().is_empty());
    assert!(!locks.forms_lock(&id).is_locked());
}

#[tokio::test]
async fn test_dropped_pass_stops_syncing() {
    let project = TestProject::new("p1").await;
    let (service, locks) = service_for(&project);
    let id = ProjectId::from("p1");
    project.source.hang_form_list();

    let mut syncing = service.is_syncing(&id);
    let cancel = CancellationToken::new();
    tokio::select! {
        _ = service.match_forms_with_server(&id, None, &cancel) => {
            panic!("the form list never arrives");
        }
        changed = syncing.changed() => {
            changed.unwrap();
        }
    }

    assert!(!*syncing.borrow());
    assert!(!locks.forms_lock(&id).is_locked());
}

#[tokio::test]
async fn test_updates_need_automatic_update() {
    let project = TestProject::new("p1").await;
    project.write_form("birds.xml", &xform("birds", Some("1"), "Birds", "a"));
    project.scan().await;
    project
        .source
        .add_form("birds", Some("2"), &xform("birds", Some("2"), "Birds", "a"), &[]);
    project
        .source
        .add_form("trees", None, &xform("trees", None, "Trees", "a"), &[]);
    let id = ProjectId::from("p1");

    let (manual, _) = service_for(&project);
    assert!(!manual.download_updates(&id, &CancellationToken::new()).await);
    assert_eq!(project.forms.get_all().await.unwrap().len(), 1);

    let mut registry = ProjectRegistry::new();
    registry.insert(copy_of(
        &project.project,
        ProjectSettings {
            automatic_update: true,
            ..Default::default()
        },
    ));
    let automatic = FormsDataService::new(Arc::new(registry), Arc::new(ChangeLocks::new()));
    assert!(automatic.download_updates(&id, &CancellationToken::new()).await);

    // The new version arrives; forms never downloaded stay on the server.
    let birds = project.forms.get_all_by_form_id("birds").await.unwrap();
    assert_eq!(birds.len(), 2);
    assert!(project.forms.get_all_by_form_id("trees").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_forms_reports_each_form() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("p1");
    project
        .source
        .add_form("birds", None, &xform("birds", None, "Birds", "a"), &[]);

    let details = service.fetch_form_details(&id).await.unwrap();
    let results = service
        .download_forms(&id, &details, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(service.get_forms(&id).borrow().len(), 1);
}

#[tokio::test]
async fn test_delete_form_follows_the_policy() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("p1");
    project.write_form("birds.xml", &xform("birds", None, "Birds", "a"));
    project.write_form("trees.xml", &xform("trees", None, "Trees", "a"));
    service.update(&id).await;
    project
        .instances
        .save(&Instance::new("trees", None, "/instances/trees.xml"))
        .await
        .unwrap();

    let birds = project.forms.get_all_by_form_id("birds").await.unwrap()[0].db_id.unwrap();
    let trees = project.forms.get_all_by_form_id("trees").await.unwrap()[0].db_id.unwrap();

    assert_eq!(
        service.delete_form(&id, birds).await,
        Some(DeletionOutcome::HardDeleted)
    );
    assert_eq!(
        service.delete_form(&id, trees).await,
        Some(DeletionOutcome::SoftDeleted)
    );
    assert_eq!(service.delete_form(&id, birds).await, None);
    assert!(service.get_forms(&id).borrow().is_empty());
}

#[tokio::test]
async fn test_unknown_project_is_a_no_op() {
    let project = TestProject::new("p1").await;
    let (service, _) = service_for(&project);
    let id = ProjectId::from("nope");

    assert!(
        !service
            .match_forms_with_server(&id, None, &CancellationToken::new())
            .await
    );
    assert_eq!(service.fetch_form_details(&id).await, None);
    assert!(service.get_forms(&id).borrow().is_empty());
}
