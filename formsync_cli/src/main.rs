use std::sync::Arc;

use clap::{Parser, Subcommand};
use formsync_client::{
    change_lock::ChangeLocks, config::ClientConfig, data_service::FormsDataService,
    project::ProjectRegistry,
};
use formsync_core::api::ProjectId;
use forms::{DeleteCommand, ListCommand, ScanCommand};
use server::{DetailsCommand, DownloadCommand, SyncCommand};

mod forms;
mod server;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan(ScanCommand),
    List(ListCommand),
    Details(DetailsCommand),
    Download(DownloadCommand),
    Delete(DeleteCommand),
    Sync(SyncCommand),
}

/// The configured projects behind one data service.
pub struct Context {
    pub registry: Arc<ProjectRegistry>,
    pub service: FormsDataService,
}

impl Context {
    pub async fn load() -> anyhow::Result<Self> {
        let config = ClientConfig::load(ClientConfig::path())?;
        let registry = Arc::new(ProjectRegistry::from_config(&config).await?);
        let service = FormsDataService::new(registry.clone(), Arc::new(ChangeLocks::new()));
        Ok(Context { registry, service })
    }

    pub fn project_id(&self, id: &str) -> anyhow::Result<ProjectId> {
        let id = ProjectId::from(id);
        if self.registry.get(&id).is_none() {
            anyhow::bail!("No project {} in {}", id, ClientConfig::path().to_string_lossy());
        }
        Ok(id)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    pretty_env_logger::init();

    let args = Args::parse();
    let context = Context::load().await?;

    match args.commands {
        Commands::Scan(scan) => scan.run(&context).await,
        Commands::List(list) => list.run(&context).await,
        Commands::Details(details) => details.run(&context).await,
        Commands::Download(download) => download.run(&context).await,
        Commands::Delete(delete) => delete.run(&context).await,
        Commands::Sync(sync) => sync.run(&context).await,
    }
}
