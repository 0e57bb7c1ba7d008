//! tfm - Terraform-backed EC2 instance manager.
//!
//! Provision, inventory, synchronize and tear down EC2 instances, delegating
//! provisioning to Terraform and live-instance imports to terraformer.

mod config;
mod create;
mod destroy;
mod ec2;
mod error;
mod exec;
mod repair;
mod store;
mod sync;
mod terraform;
mod ui;

use clap::Parser;
use colored::Colorize;

use config::{Args, Command, Config};
use error::TfmError;
use ui::SelectChooser;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(&args);

    init_logging(&config.log_level);

    if let Err(e) = run(args, &config).await {
        match e {
            TfmError::Cancelled => {
                println!("\n{}", "Cancelled. Exiting.".yellow());
            }
            _ => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                std::process::exit(1);
            }
        }
    }
}

async fn run(args: Args, config: &Config) -> error::Result<()> {
    let chooser = SelectChooser;

    match args.command {
        Command::Sync => sync::run(config, &chooser).await,
        Command::Create {
            name,
            distro,
            instance_type,
        } => {
            create::run(
                config,
                &chooser,
                &name,
                distro.as_deref(),
                instance_type.as_deref(),
            )
            .await
        }
        Command::List => list(config),
        Command::Destroy { name } => destroy::run(config, &name).await,
    }
}

fn list(config: &Config) -> error::Result<()> {
    let instances = store::list_instances(&config.root)?;

    if instances.is_empty() {
        println!("No instances found.");
        return Ok(());
    }

    for instance in instances {
        println!("Instance {}:", instance.name.bright_cyan().bold());
        println!("    Region: {}", instance.meta.region);
        println!("    AMI: {}", instance.meta.ami);
        println!("    Instance type: {}", instance.meta.instance_type);
        println!("    Distro: {}", instance.meta.distro);
        println!("    Created: {}", instance.meta.creation_date);
        println!();
    }
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = format!("error,tfm={}", log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(false)
        .init();
}
