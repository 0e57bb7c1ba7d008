//! Application configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const COMMIT: &str = env!("GIT_COMMIT");
const BUILD_DATE: &str = env!("BUILD_DATE");

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "tfm")]
#[command(about = "Interactive EC2 instance lifecycle manager backed by Terraform")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// AWS profile for API calls and terraformer imports
    #[arg(short, long, env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Specific AWS region (if not set, the SDK default region is used)
    #[arg(short, long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,

    /// Root directory holding the per-instance Terraform folders
    #[arg(long, env = "TFM_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "TFM_LOG_LEVEL", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a running EC2 instance into a local Terraform folder
    Sync,

    /// Create an EC2 instance from the built-in Terraform template
    Create {
        /// Name for the new instance (also names the ec2-<name> folder)
        name: String,

        /// Linux distribution (amazon-linux or ubuntu); prompted if omitted
        #[arg(long)]
        distro: Option<String>,

        /// EC2 instance type; prompted if omitted
        #[arg(long)]
        instance_type: Option<String>,
    },

    /// List locally managed instance folders
    List,

    /// Destroy an instance and remove its folder
    Destroy {
        /// Name of the instance to destroy
        name: String,
    },
}

/// Application configuration derived from CLI args, built once at the entry
/// point and passed down. Environment variables enter only through the clap
/// `env` fallbacks above.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub root: PathBuf,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: &Args) -> Self {
        Self {
            profile: args.profile.clone(),
            region: args.region.clone(),
            root: args.root.clone().unwrap_or_else(default_root),
            log_level: args.log_level.clone(),
        }
    }

    /// Get profile display name for UI.
    pub fn profile_display(&self) -> &str {
        self.profile.as_deref().unwrap_or("default")
    }

    /// The profile, or a fatal error for steps that cannot run without one.
    pub fn require_profile(&self) -> crate::error::Result<&str> {
        self.profile
            .as_deref()
            .ok_or(crate::error::TfmError::MissingProfile)
    }
}

/// Default managed root: `~/.tfm/instances`.
fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tfm")
        .join("instances")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_is_home_relative() {
        let root = default_root();
        assert!(root.ends_with(".tfm/instances"));
    }

    #[test]
    fn test_profile_display_falls_back_to_default() {
        let config = Config {
            profile: None,
            region: None,
            root: PathBuf::from("/tmp"),
            log_level: "warn".to_string(),
        };
        assert_eq!(config.profile_display(), "default");
    }

    #[test]
    fn test_require_profile_errors_when_unset() {
        let config = Config {
            profile: None,
            region: None,
            root: PathBuf::from("/tmp"),
            log_level: "warn".to_string(),
        };
        assert!(config.require_profile().is_err());
    }

    #[test]
    fn test_require_profile_returns_value() {
        let config = Config {
            profile: Some("deployment-tests".to_string()),
            region: None,
            root: PathBuf::from("/tmp"),
            log_level: "warn".to_string(),
        };
        assert_eq!(config.require_profile().unwrap(), "deployment-tests");
    }
}
