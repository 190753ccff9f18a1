use std::time::Duration;

use async_trait::async_trait;
use formsync_core::{
    api::{OPEN_ROSA_VERSION, OPEN_ROSA_VERSION_HEADER},
    models::server::{MediaFile, ServerFormListItem},
    openrosa::{parse_form_list, parse_manifest},
};
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client, Response, StatusCode,
};

use super::{Credentials, FormSource};
use crate::error::FormSourceError;

/// Talks to an OpenRosa form server over HTTP.
pub struct OpenRosaFormSource {
    client: Client,
    server_url: String,
    credentials: Option<Credentials>,
}

impl OpenRosaFormSource {
    pub fn new(server_url: &str, credentials: Option<Credentials>) -> reqwest::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.append(
            OPEN_ROSA_VERSION_HEADER,
            HeaderValue::from_static(OPEN_ROSA_VERSION),
        );
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(OpenRosaFormSource {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn form_list_url(&self) -> String {
        format!("{}/formList", self.server_url)
    }

    async fn get(&self, url: &str) -> Result<Response, FormSourceError> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        request
            .send()
            .await
            .map_err(|x| {
                warn!("Request to {} failed: {}", url, x);
                FormSourceError::Unreachable(self.server_url.clone())
            })?
            .error_for_status()
            .map_err(|x| match x.status() {
                Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
                    FormSourceError::Security(self.server_url.clone())
                }
                Some(status) => FormSourceError::Server {
                    status: status.as_u16(),
                    server_url: self.server_url.clone(),
                },
                None => FormSourceError::Unreachable(self.server_url.clone()),
            })
    }

    /// Documents must come from a server that speaks OpenRosa.
    async fn get_open_rosa_document(&self, url: &str) -> Result<String, FormSourceError> {
        let response = self.get(url).await?;
        if !response.headers().contains_key(OPEN_ROSA_VERSION_HEADER) {
            return Err(FormSourceError::NotOpenRosaCompliant(self.server_url.clone()));
        }
        response
            .text()
            .await
            .map_err(|_| FormSourceError::Unreachable(self.server_url.clone()))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FormSourceError> {
        let response = self.get(url).await?;
        let mut data = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|x| {
                warn!("Transfer from {} failed: {}", url, x);
                FormSourceError::Unreachable(self.server_url.clone())
            })?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

#[async_trait]
impl FormSource for OpenRosaFormSource {
    async fn fetch_form_list(&self) -> Result<Vec<ServerFormListItem>, FormSourceError> {
        let text = self.get_open_rosa_document(&self.form_list_url()).await?;
        parse_form_list(&text).map_err(|x| {
            warn!("Malformed form list from {}: {}", self.server_url, x);
            FormSourceError::Parse(self.server_url.clone())
        })
    }

    async fn fetch_manifest(&self, manifest_url: &str) -> Result<Vec<MediaFile>, FormSourceError> {
        let text = self.get_open_rosa_document(manifest_url).await?;
        parse_manifest(&text).map_err(|x| {
            warn!("Malformed manifest {}: {}", manifest_url, x);
            FormSourceError::Parse(self.server_url.clone())
        })
    }

    async fn fetch_form(&self, form_url: &str) -> Result<Vec<u8>, FormSourceError> {
        self.get_bytes(form_url).await
    }

    async fn fetch_media_file(&self, media_url: &str) -> Result<Vec<u8>, FormSourceError> {
        self.get_bytes(media_url).await
    }
}
