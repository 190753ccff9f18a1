//! Shared fixtures: an in-memory form server and throwaway projects.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use formsync_client::{
    error::FormSourceError,
    form_source::FormSource,
    project::Project,
    repository::{Database, FormsRepository, InstancesRepository},
};
use formsync_core::{
    api::ProjectId,
    hash::md5_bytes,
    models::server::{MediaFile, ServerFormListItem},
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A form definition the XForm parser accepts. `marker` only changes the
/// bytes, and so the hash.
pub fn xform(form_id: &str, version: Option<&str>, title: &str, marker: &str) -> String {
    let version = version
        .map(|x| format!(r#" orx:version="{}""#, x))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0"?>
<h:html xmlns="http://www.w3.org/2002/xforms" xmlns:h="http://www.w3.org/1999/xhtml" xmlns:orx="http://openrosa.org/xforms">
  <h:head>
    <h:title>{title}</h:title>
    <model>
      <instance>
        <data id="{form_id}"{version}>
          <answer/>
        </data>
      </instance>
      <bind nodeset="/data/answer" type="string"/>
    </model>
  </h:head>
  <h:body><!-- {marker} --></h:body>
</h:html>"#
    )
}

#[derive(Default)]
struct FakeServer {
    form_list: Vec<ServerFormListItem>,
    list_error: Option<FormSourceError>,
    manifests: HashMap<String, Vec<MediaFile>>,
    files: HashMap<String, Vec<u8>>,
    cancel_on_fetch: Option<(String, CancellationToken)>,
    hang_form_list: bool,
    fetched: Vec<String>,
}

/// A form server living in memory. Unknown URLs answer with a 404.
#[derive(Default)]
pub struct FakeFormSource {
    server: Mutex<FakeServer>,
}

impl FakeFormSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a form and its media, returning the list entry.
    pub fn add_form(
        &self,
        form_id: &str,
        version: Option<&str>,
        definition: &str,
        media: &[(&str, &[u8])],
    ) -> ServerFormListItem {
        let mut server = self.server.lock();
        let hash = md5_bytes(definition.as_bytes());
        let download_url = format!("http://fake/forms/{}/{}", form_id, hash);
        server
            .files
            .insert(download_url.clone(), definition.as_bytes().to_vec());

        let manifest_url = if media.is_empty() {
            None
        } else {
            let url = format!("http://fake/manifest/{}/{}", form_id, hash);
            let files = media
                .iter()
                .map(|(name, data)| {
                    let media_url = format!("http://fake/media/{}/{}/{}", form_id, hash, name);
                    server.files.insert(media_url.clone(), data.to_vec());
                    MediaFile {
                        filename: name.to_string(),
                        hash: md5_bytes(data),
                        download_url: media_url,
                    }
                })
                .collect();
            server.manifests.insert(url.clone(), files);
            Some(url)
        };

        let item = ServerFormListItem {
            form_id: form_id.to_string(),
            name: form_id.to_string(),
            version: version.map(|x| x.to_string()),
            hash: Some(hash),
            download_url,
            manifest_url,
        };
        server.form_list.retain(|x| x.form_id != form_id);
        server.form_list.push(item.clone());
        item
    }

    pub fn remove_form(&self, form_id: &str) {
        self.server.lock().form_list.retain(|x| x.form_id != form_id);
    }

    pub fn remove_file(&self, url: &str) {
        self.server.lock().files.remove(url);
    }

    pub fn fail_form_list(&self, error: FormSourceError) {
        self.server.lock().list_error = Some(error);
    }

    /// Form list requests never complete from now on.
    pub fn hang_form_list(&self) {
        self.server.lock().hang_form_list = true;
    }

    /// Cancels `token` the moment `url` is requested.
    pub fn cancel_when_fetching(&self, url: &str, token: CancellationToken) {
        self.server.lock().cancel_on_fetch = Some((url.to_string(), token));
    }

    /// Every form or media URL requested so far.
    pub fn fetched(&self) -> Vec<String> {
        self.server.lock().fetched.clone()
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, FormSourceError> {
        let mut server = self.server.lock();
        server.fetched.push(url.to_string());
        if let Some((cancel_url, token)) = &server.cancel_on_fetch {
            if cancel_url == url {
                token.cancel();
            }
        }
        server.files.get(url).cloned().ok_or(FormSourceError::Server {
            status: 404,
            server_url: "http://fake".to_string(),
        })
    }
}

#[async_trait]
impl FormSource for FakeFormSource {
    async fn fetch_form_list(&self) -> Result<Vec<ServerFormListItem>, FormSourceError> {
        let hang = self.server.lock().hang_form_list;
        if hang {
            std::future::pending::<()>().await;
        }
        let server = self.server.lock();
        match &server.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(server.form_list.clone()),
        }
    }

    async fn fetch_manifest(&self, manifest_url: &str) -> Result<Vec<MediaFile>, FormSourceError> {
        self.server
            .lock()
            .manifests
            .get(manifest_url)
            .cloned()
            .ok_or(FormSourceError::Parse("http://fake".to_string()))
    }

    async fn fetch_form(&self, form_url: &str) -> Result<Vec<u8>, FormSourceError> {
        self.fetch(form_url)
    }

    async fn fetch_media_file(&self, media_url: &str) -> Result<Vec<u8>, FormSourceError> {
        self.fetch(media_url)
    }
}

/// A project in a temporary directory, backed by an in-memory database.
pub struct TestProject {
    pub dir: TempDir,
    pub project: Arc<Project>,
    pub source: Arc<FakeFormSource>,
    pub forms: Arc<dyn FormsRepository>,
    pub instances: Arc<dyn InstancesRepository>,
}

impl TestProject {
    pub async fn new(id: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let database = Database::open_in_memory().await.unwrap();
        let forms: Arc<dyn FormsRepository> = Arc::new(database.forms());
        let instances: Arc<dyn InstancesRepository> = Arc::new(database.instances());
        let source = Arc::new(FakeFormSource::new());

        let project = Project::new(
            ProjectId::from(id),
            dir.path(),
            forms.clone(),
            instances.clone(),
            source.clone(),
        );
        std::fs::create_dir_all(&project.forms_dir).unwrap();

        TestProject {
            dir,
            project: Arc::new(project),
            source,
            forms,
            instances,
        }
    }

    pub fn forms_dir(&self) -> &Path {
        &self.project.forms_dir
    }

    /// Drops a definition into the forms directory, as a user would.
    pub fn write_form(&self, filename: &str, contents: &str) -> PathBuf {
        let path = self.forms_dir().join(filename);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub async fn scan(&self) -> String {
        self.project
            .disk_synchronizer()
            .synchronize_and_return_error()
            .await
            .unwrap()
    }

    /// Files and directories directly under the forms directory, sorted.
    pub fn forms_dir_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = std::fs::read_dir(self.forms_dir())
            .unwrap()
            .map(|x| x.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();
        entries
    }

    pub fn cache_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.project.cache_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}
