use std::{env::var, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Path, Request, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderName, HeaderValue},
    response::IntoResponse,
    routing::get,
    RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization, Host},
    TypedHeader,
};
use clap::Parser;
use error::ApiError;
use formsync_core::{
    api::{OPEN_ROSA_VERSION, OPEN_ROSA_VERSION_HEADER},
    openrosa::{render_form_list, render_manifest},
};
use models::forms::{is_plain_file_name, scan_forms, ServedForm};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::{
    compression::CompressionLayer, services::ServeFile, set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

mod error;
mod models;

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Formsync test server
#[derive(Parser, Debug)]
pub struct ServeCommand {}

#[derive(Serialize, Deserialize, Default)]
pub struct ServerConfigFile {
    pub port: Option<String>,
    pub forms_directory: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub forms_directory: PathBuf,
    pub credentials: Option<(String, String)>,
}

impl ServerConfig {
    /// Environment first, then `formsync.server.toml`, then defaults.
    pub fn load() -> anyhow::Result<Self> {
        let server_config_text = std::fs::read_to_string(
            var("FORMSYNC_CONFIG_PATH").unwrap_or("formsync.server.toml".to_string()),
        );
        let file = if let Ok(text) = server_config_text {
            toml::from_str::<ServerConfigFile>(&text)?
        } else {
            ServerConfigFile::default()
        };

        let username = var("FORMSYNC_USERNAME").ok().or(file.username);
        let password = var("FORMSYNC_PASSWORD").ok().or(file.password);
        Ok(ServerConfig {
            port: var("FORMSYNC_PORT")
                .ok()
                .or(file.port)
                .unwrap_or("7040".to_string())
                .parse()?,
            forms_directory: PathBuf::from(
                var("FORMSYNC_FORMS_DIRECTORY")
                    .ok()
                    .or(file.forms_directory)
                    .unwrap_or("forms".to_string()),
            ),
            credentials: username.zip(password),
        })
    }
}

pub struct AppState {
    pub config: ServerConfig,
}

impl ServeCommand {
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Formsync Server v{}", env!("CARGO_PKG_VERSION"));

        let config = ServerConfig::load()?;
        if !config.forms_directory.is_dir() {
            anyhow::bail!(
                "Forms directory {} does not exist",
                config.forms_directory.to_string_lossy()
            );
        }
        if config.credentials.is_none() {
            info!("No credentials set, serving forms to anyone");
        }

        let port = config.port;
        let app = router(Arc::new(AppState { config }));

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Serving on 0.0.0.0:{}", port);
        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { "Formsync server - OpenRosa forms at /formList" }),
        )
        .route("/formList", get(form_list))
        .route(
            "/forms/:file",
            get(form_file).layer(CompressionLayer::new()),
        )
        .route("/manifest/:form_id", get(manifest))
        .route("/media/:form_id/:file", get(media_file))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(OPEN_ROSA_VERSION_HEADER),
            HeaderValue::from_static(OPEN_ROSA_VERSION),
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(15)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn base_url(host: &Host) -> String {
    match host.port() {
        Some(port) => format!("http://{}:{}", host.hostname(), port),
        None => format!("http://{}", host.hostname()),
    }
}

fn find_form(state: &AppState, form_id: &str) -> Result<ServedForm, ApiError> {
    scan_forms(&state.config.forms_directory)?
        .into_iter()
        .find(|x| x.metadata.form_id == form_id)
        .ok_or(ApiError::NotFound)
}

async fn form_list(
    State(state): State<Arc<AppState>>,
    _: Authenticated,
    TypedHeader(host): TypedHeader<Host>,
) -> Result<impl IntoResponse, ApiError> {
    let base_url = base_url(&host);
    let items = scan_forms(&state.config.forms_directory)?
        .iter()
        .map(|x| x.list_item(&base_url))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(([(CONTENT_TYPE, XML_CONTENT_TYPE)], render_form_list(&items)))
}

async fn manifest(
    State(state): State<Arc<AppState>>,
    _: Authenticated,
    TypedHeader(host): TypedHeader<Host>,
    Path(form_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let form = find_form(&state, &form_id)?;
    let files = form.manifest(&base_url(&host))?;
    Ok(([(CONTENT_TYPE, XML_CONTENT_TYPE)], render_manifest(&files)))
}

async fn form_file(
    State(state): State<Arc<AppState>>,
    _: Authenticated,
    Path(file): Path<String>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    if !is_plain_file_name(&file) {
        return Err(ApiError::NotFound);
    }
    let form = scan_forms(&state.config.forms_directory)?
        .into_iter()
        .find(|x| x.file_name == file)
        .ok_or(ApiError::NotFound)?;
    Ok(ServeFile::new(form.path).oneshot(req).await)
}

async fn media_file(
    State(state): State<Arc<AppState>>,
    _: Authenticated,
    Path((form_id, file)): Path<(String, String)>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let path = find_form(&state, &form_id)?
        .media_file(&file)
        .ok_or(ApiError::NotFound)?;
    Ok(ServeFile::new(path).oneshot(req).await)
}

/// Passes when the server has no credentials or the request's Basic
/// credentials match them.
pub struct Authenticated;

type AxumAppState = Arc<AppState>;
#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    AxumAppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AxumAppState::from_ref(state);
        let Some((username, password)) = &state.config.credentials else {
            return Ok(Authenticated);
        };
        let TypedHeader(Authorization(basic)) = parts
            .extract::<TypedHeader<Authorization<Basic>>>()
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        if basic.username() != username || basic.password() != password {
            return Err(ApiError::Unauthorized);
        }
        Ok(Authenticated)
    }
}
