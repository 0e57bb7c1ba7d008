//! Tear down an instance and remove its folder.

use std::fs;

use colored::Colorize;

use crate::config::Config;
use crate::error::{Result, TfmError};
use crate::store;
use crate::terraform;

pub async fn run(config: &Config, name: &str) -> Result<()> {
    let root = store::ensure_root(&config.root)?;
    let instance_path = store::instance_dir(&root, name);

    if !instance_path.exists() {
        return Err(TfmError::FolderMissing(instance_path.display().to_string()));
    }

    println!(
        "{} {}...",
        "Destroying".bright_blue().bold(),
        name.bright_cyan().bold()
    );

    terraform::destroy(&instance_path).await?;
    fs::remove_dir_all(&instance_path)?;

    println!("{} {}", "Destroyed".green().bold(), name);
    Ok(())
}
