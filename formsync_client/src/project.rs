//! Projects and the registry that hands them out.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use formsync_core::api::ProjectId;
use log::info;

use crate::{
    config::{ClientConfig, ProjectConfig, ProjectSettings},
    deletion::FormDeleter,
    details_fetcher::ServerFormsDetailsFetcher,
    disk_sync::DiskFormsSynchronizer,
    downloader::ServerFormDownloader,
    form_source::{Credentials, FormSource, OpenRosaFormSource},
    metadata::{FormMetadataParser, XFormMetadataParser},
    repository::{Database, FormsRepository, InstancesRepository},
    server_sync::ServerFormsSynchronizer,
};

/// Everything the engine needs to work on one project.
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub settings: ProjectSettings,
    pub forms_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub forms_repository: Arc<dyn FormsRepository>,
    pub instances_repository: Arc<dyn InstancesRepository>,
    pub form_source: Arc<dyn FormSource>,
    pub metadata_parser: Arc<dyn FormMetadataParser>,
}

impl Project {
    /// A project rooted at `directory` with default settings.
    pub fn new(
        id: ProjectId,
        directory: &Path,
        forms_repository: Arc<dyn FormsRepository>,
        instances_repository: Arc<dyn InstancesRepository>,
        form_source: Arc<dyn FormSource>,
    ) -> Self {
        Project {
            name: id.0.clone(),
            id,
            settings: ProjectSettings::default(),
            forms_dir: directory.join("forms"),
            cache_dir: directory.join(".cache"),
            forms_repository,
            instances_repository,
            form_source,
            metadata_parser: Arc::new(XFormMetadataParser),
        }
    }

    /// Opens (creating if needed) the project's directories and database.
    pub async fn open(config: &ProjectConfig) -> anyhow::Result<Self> {
        let directory = PathBuf::from(&config.directory);
        tokio::fs::create_dir_all(directory.join("forms")).await?;
        tokio::fs::create_dir_all(directory.join(".cache")).await?;

        let database = Database::open(directory.join("formsync.db")).await?;
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let form_source = OpenRosaFormSource::new(&config.server_url, credentials)?;

        let mut project = Project::new(
            ProjectId(config.id.clone()),
            &directory,
            Arc::new(database.forms()),
            Arc::new(database.instances()),
            Arc::new(form_source),
        );
        project.name = config.name.clone();
        project.settings = config.settings.clone();
        Ok(project)
    }

    pub fn disk_synchronizer(&self) -> DiskFormsSynchronizer {
        DiskFormsSynchronizer::new(
            self.forms_dir.clone(),
            self.forms_repository.clone(),
            self.metadata_parser.clone(),
        )
    }

    pub fn details_fetcher(&self) -> ServerFormsDetailsFetcher {
        ServerFormsDetailsFetcher::new(self.forms_repository.clone(), self.form_source.clone())
    }

    pub fn downloader(&self) -> ServerFormDownloader {
        ServerFormDownloader::new(
            self.form_source.clone(),
            self.forms_repository.clone(),
            self.instances_repository.clone(),
            self.metadata_parser.clone(),
            self.forms_dir.clone(),
            self.cache_dir.clone(),
        )
    }

    pub fn deleter(&self) -> FormDeleter {
        FormDeleter::new(
            self.forms_repository.clone(),
            self.instances_repository.clone(),
        )
    }

    pub fn server_synchronizer(&self) -> ServerFormsSynchronizer {
        ServerFormsSynchronizer::new(
            self.details_fetcher(),
            self.downloader(),
            self.deleter(),
            self.forms_repository.clone(),
        )
    }
}

/// Built once at startup and shared by handle.
#[derive(Default)]
pub struct ProjectRegistry {
    projects: HashMap<ProjectId, Arc<Project>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut registry = ProjectRegistry::new();
        for project_config in &config.projects {
            let project = Project::open(project_config).await?;
            info!("Opened project {} ({})", project.name, project.id);
            registry.insert(project);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, project: Project) -> Arc<Project> {
        let project = Arc::new(project);
        self.projects.insert(project.id.clone(), project.clone());
        project
    }

    pub fn get(&self, id: &ProjectId) -> Option<Arc<Project>> {
        self.projects.get(id).cloned()
    }

    /// Projects in id order.
    pub fn projects(&self) -> Vec<Arc<Project>> {
        let mut projects: Vec<Arc<Project>> = self.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        projects
    }
}
