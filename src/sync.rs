//! Live-instance to local-Terraform reconciliation.
//!
//! The pipeline is strictly sequential and fails fast: inventory, selection,
//! terraformer import, provider rewrite, init, validate, line repair. Every
//! external tool gates the next step; nothing is retried.

use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::ec2::{InstanceRecord, Scanner};
use crate::error::{Result, TfmError};
use crate::repair;
use crate::store;
use crate::terraform;
use crate::ui::{Chooser, Selector};

/// Sort, prompt, and resolve the operator's choice. `Ok(None)` when nothing
/// was selected. A selected instance without a name is fatal here, before
/// any external tool runs.
fn choose_target(
    records: Vec<InstanceRecord>,
    chooser: &dyn Chooser,
) -> Result<Option<InstanceRecord>> {
    let selector = Selector::new(records);
    let Some(record) = selector.select(chooser)?.cloned() else {
        return Ok(None);
    };
    if !record.has_name() {
        return Err(TfmError::MissingName);
    }
    Ok(Some(record))
}

/// Import one running instance into `<root>/ec2-<name>` and strip the lines
/// the validator rejects from the generated definitions.
pub async fn run(config: &Config, chooser: &dyn Chooser) -> Result<()> {
    let scanner = Scanner::from_config(config.profile.as_deref(), config.region.as_deref()).await;
    let records = scanner.fetch_running().await?;

    if records.is_empty() {
        println!("{}", "No running instances found.".yellow());
        return Ok(());
    }

    println!(
        "{} {} running instance(s) (profile: {})",
        "Found".bright_blue().bold(),
        records.len().to_string().bright_yellow().bold(),
        config.profile_display().bright_cyan()
    );

    let Some(record) = choose_target(records, chooser)? else {
        println!("{}", "No instance selected. Exiting.".yellow());
        return Ok(());
    };
    let profile = config.require_profile()?;

    println!(
        "{} {} ({})",
        "Selected:".bright_blue(),
        record.name.bright_cyan().bold(),
        record.instance_id.bright_blue()
    );

    let root = store::ensure_root(&config.root)?;
    let instance_path = store::instance_dir(&root, &record.name);

    info!(
        instance_id = %record.instance_id,
        path = %instance_path.display(),
        "importing instance definition"
    );
    terraform::import_instance(&record.instance_id, profile, &root, &instance_path).await?;
    terraform::replace_provider(&instance_path).await?;
    terraform::init(&instance_path).await?;

    let report = terraform::validate(&instance_path).await?;
    let flagged = report.error_lines(terraform::RESOURCES_FILE);

    if flagged.is_empty() {
        println!("{}", "Validation clean; nothing to repair.".green());
    } else {
        let resources = instance_path.join(terraform::RESOURCES_FILE);
        println!(
            "{} {} flagged line(s) from {}",
            "Removing".bright_blue().bold(),
            flagged.len().to_string().bright_yellow(),
            resources.display()
        );
        repair::repair_file(&resources, flagged)?;
    }

    println!(
        "{} {}",
        "Synced into".green().bold(),
        instance_path.display()
    );
    Ok(())
}
