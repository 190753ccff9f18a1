use clap::Args;
use colored::Colorize;
use formsync_core::api::FormDbId;
use formsync_client::deletion::DeletionOutcome;
use log::{info, warn};

use crate::Context;

/// Reconcile a project's forms directory with its catalog
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// Project id
    project: String,
}

impl ScanCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        context.service.update(&id).await;

        if let Some(disk_error) = context.service.get_disk_error(&id).borrow().as_ref() {
            for line in disk_error.lines() {
                warn!("[{}] {}", "!".yellow(), line.yellow());
            }
        }
        let count = context.service.get_forms(&id).borrow().len();
        info!("{}", format!("{} form(s) in {}", count, id).green());
        Ok(())
    }
}

/// List the forms a project has on the device
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Project id
    project: String,

    /// Include soft-deleted forms
    #[arg(short = 'a', long)]
    all: bool,
}

impl ListCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        let Some(project) = context.registry.get(&id) else {
            return Ok(());
        };
        let mut forms = if self.all {
            project.forms_repository.get_all().await?
        } else {
            project.forms_repository.get_all_not_deleted().await?
        };
        forms.sort_by(|a, b| (&a.form_id, &a.version).cmp(&(&b.form_id, &b.version)));

        for form in forms {
            let id = form.db_id.map(|x| x.to_string()).unwrap_or_default();
            let line = format!(
                "{:>4} {} {} [{}] {} ({})",
                id,
                form.form_id,
                form.version.as_deref().unwrap_or("-"),
                form.display_name,
                form.form_file_path,
                form.last_modified.format("%Y-%m-%d %H:%M"),
            );
            if form.is_deleted() {
                println!("{} {}", line.dimmed(), "deleted".red());
            } else {
                println!("{}", line);
            }
        }
        Ok(())
    }
}

/// Delete a form, keeping it hidden while instances still need it
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Project id
    project: String,

    /// Database id of the form, as shown by `list`
    form: i64,
}

impl DeleteCommand {
    pub async fn run(&self, context: &Context) -> anyhow::Result<()> {
        let id = context.project_id(&self.project)?;
        match context.service.delete_form(&id, FormDbId(self.form)).await {
            Some(DeletionOutcome::HardDeleted) => {
                info!("[{}] Form {} deleted", "-".red(), self.form)
            }
            Some(DeletionOutcome::SoftDeleted) => info!(
                "[{}] Form {} hidden; its instances still refer to it",
                "~".yellow(),
                self.form
            ),
            None => anyhow::bail!("Form {} was not deleted", self.form),
        }
        Ok(())
    }
}
