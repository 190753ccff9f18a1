use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use formsync_client::{
    change_lock::ChangeLocks,
    config::{ClientConfig, FormUpdateMode},
    data_service::FormsDataService,
    downloader::FormDownloaderListener,
    project::ProjectRegistry,
};
use formsync_core::api::ProjectId;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

/// Keep your device's forms in step with the server!
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Only update this project
    #[arg(short = 'p', long)]
    project: Option<String>,

    /// Match the server exactly, whatever the project's update mode says
    #[arg(short = 'm', long)]
    match_exactly: bool,
}

struct MediaProgress {
    bar: ProgressBar,
}

impl MediaProgress {
    fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:.cyan/blue}] {pos}/{len} media")?
                .progress_chars("#>-"),
        );
        Ok(MediaProgress { bar })
    }
}

impl FormDownloaderListener for MediaProgress {
    fn on_downloading_media_file(&self, count: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(count as u64);
        self.bar.tick();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = run().await {
        error!("{} {}", "Error:".bright_red(), err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    pretty_env_logger::init();
    let args = Args::parse();

    info!(
        "{}",
        format!("Formsync Client v{}", env!("CARGO_PKG_VERSION")).red()
    );

    let config = ClientConfig::load(ClientConfig::path())?;
    let registry = Arc::new(ProjectRegistry::from_config(&config).await?);
    let service = FormsDataService::new(registry.clone(), Arc::new(ChangeLocks::new()));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current file...");
                cancel.cancel();
            }
        });
    }

    for project in registry.projects() {
        if args.project.as_ref().is_some_and(|x| *x != project.id.0) {
            continue;
        }
        info!("{}", format!("Project {} ({})", project.name, project.id).italic());

        let progress = MediaProgress::new()?;
        let listener: &dyn FormDownloaderListener = &progress;
        let mode = if args.match_exactly {
            FormUpdateMode::MatchExactly
        } else {
            project.settings.form_update_mode
        };
        let ok = match mode {
            FormUpdateMode::MatchExactly => {
                service
                    .match_forms_with_server(&project.id, Some(listener), &cancel)
                    .await
            }
            FormUpdateMode::PreviouslyDownloadedOnly => {
                service.download_updates(&project.id, &cancel).await
            }
            FormUpdateMode::Manual => {
                service.update(&project.id).await;
                true
            }
        };
        progress.bar.finish_and_clear();

        report(&service, &project.id, ok);
        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(())
}

fn report(service: &FormsDataService, project_id: &ProjectId, ok: bool) {
    if let Some(disk_error) = service.get_disk_error(project_id).borrow().as_ref() {
        for line in disk_error.lines() {
            warn!("[{}] {}", "!".yellow(), line.yellow());
        }
    }
    if let Some(sync_error) = service.get_sync_error(project_id).borrow().as_ref() {
        error!("[{}] {}", "x".red(), sync_error.to_string().red());
    }
    let forms = service.get_forms(project_id).borrow().len();
    if ok {
        info!("{}", format!("{} form(s) on device. Done!", forms).green());
    } else {
        info!("{} form(s) on device.", forms);
    }
}
