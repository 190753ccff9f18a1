use clap::Args;
use colored::Colorize;
use formsync_client::data_service::FormsDataService;
use formsync_core::{api::ProjectId, FormDetailsType};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::Context;

/// Show how the server's forms compare with the device's
#[derive(Args, Debug)]
pub struct DetailsCommand {
    /// Project id
    project: String,
}

impl DetailsCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        let Some(details) = context.service.fetch_form_details(&id).await else {
            return Err(sync_error(&context.service, &id));
        };

        for form in details {
            let status = match form.details_type {
                FormDetailsType::OnDevice => "on device".normal(),
                FormDetailsType::New => "new".green(),
                FormDetailsType::UpdatedVersion
                | FormDetailsType::UpdatedHash
                | FormDetailsType::UpdatedMedia => form.details_type.to_string().yellow(),
            };
            println!(
                "{} {} [{}] {}",
                form.form_id,
                form.form_version.as_deref().unwrap_or("-"),
                form.form_name,
                status
            );
        }
        Ok(())
    }
}

/// Download forms from the server
#[derive(Args, Debug)]
pub struct DownloadCommand {
    /// Project id
    project: String,

    /// Form ids to download; defaults to every new or updated form
    forms: Vec<String>,
}

impl DownloadCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        let Some(details) = context.service.fetch_form_details(&id).await else {
            return Err(sync_error(&context.service, &id));
        };
        let chosen: Vec<_> = details
            .into_iter()
            .filter(|x| {
                if self.forms.is_empty() {
                    x.needs_download()
                } else {
                    self.forms.contains(&x.form_id)
                }
            })
            .collect();
        if chosen.is_empty() {
            info!("Nothing to download");
            return Ok(());
        }

        let cancel = cancel_on_ctrl_c();
        let Some(results) = context
            .service
            .download_forms(&id, &chosen, None, &cancel)
            .await
        else {
            anyhow::bail!("Forms of {} are being changed by someone else", id);
        };

        for result in &results {
            match &result.error {
                None => info!("[{}] {} downloaded", "+".green(), result.form_id.green()),
                Some(e) => error!("[{}] {}: {}", "x".red(), result.form_id.red(), e),
            }
        }
        if results.len() < chosen.len() {
            warn!("Interrupted after {} of {} form(s)", results.len(), chosen.len());
        }
        Ok(())
    }
}

/// Make the device's forms exactly match the server's
#[derive(Args, Debug)]
pub struct SyncCommand {
    /// Project id
    project: String,
}

impl SyncCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        let cancel = cancel_on_ctrl_c();
        if context
            .service
            .match_forms_with_server(&id, None, &cancel)
            .await
        {
            let count = context.service.get_forms(&id).borrow().len();
            info!("{}", format!("Sync complete! {} form(s) on device.", count).green());
            Ok(())
        } else if cancel.is_cancelled() {
            anyhow::bail!("Sync was interrupted")
        } else if context.service.get_sync_error(&id).borrow().is_some() {
            Err(sync_error(&context.service, &id))
        } else {
            anyhow::bail!("Forms of {} are being changed by someone else", id)
        }
    }
}

fn sync_error(service: &FormsDataService, id: &ProjectId) -> anyhow::Error {
    match service.get_sync_error(id).borrow().as_ref() {
        Some(e) => anyhow::anyhow!("{}", e),
        None => anyhow::anyhow!("Could not reach the server of {}", id),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current file...");
            token.cancel();
        }
    });
    cancel
}
