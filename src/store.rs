//! Local per-instance Terraform folders and their metadata.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use tracing::warn;

use crate::ec2::OsFamily;
use crate::error::Result;

const CONFIG_DIR: &str = "config";

/// Resolve the managed root, creating it when missing. A file occupying the
/// path is fatal.
pub fn ensure_root(root: &Path) -> Result<PathBuf> {
    if root.is_file() {
        return Err(anyhow::anyhow!(
            "\"{}\" already exists, but it's a file, not a directory",
            root.display()
        )
        .into());
    }
    if !root.exists() {
        fs::create_dir_all(root)?;
    }
    Ok(root.to_path_buf())
}

/// Per-instance folder: `<root>/ec2-<name>`.
pub fn instance_dir(root: &Path, name: &str) -> PathBuf {
    root.join(format!("ec2-{}", name))
}

/// Metadata persisted alongside a created instance, one value per file in
/// its `config/` folder.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMeta {
    pub region: String,
    pub ami: String,
    pub instance_type: String,
    pub distro: OsFamily,
    pub creation_date: String,
    pub server_ip: String,
    pub server_key: String,
}

impl InstanceMeta {
    pub fn write(&self, instance_path: &Path) -> Result<()> {
        let config_dir = instance_path.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir)?;

        fs::write(config_dir.join("region"), &self.region)?;
        fs::write(config_dir.join("ami-id"), &self.ami)?;
        fs::write(config_dir.join("instance_type"), &self.instance_type)?;
        fs::write(config_dir.join("distro"), self.distro.as_marker())?;
        fs::write(config_dir.join("creation_date"), &self.creation_date)?;
        fs::write(config_dir.join("server_ip.txt"), &self.server_ip)?;
        fs::write(config_dir.join("server_key.txt"), &self.server_key)?;
        Ok(())
    }

    /// Read a `config/` folder written by [`write`](Self::write).
    pub fn read(instance_path: &Path) -> anyhow::Result<Self> {
        let config_dir = instance_path.join(CONFIG_DIR);
        let read_value = |file: &str| -> anyhow::Result<String> {
            let path = config_dir.join(file);
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("missing {}", path.display()))?;
            Ok(contents.trim().to_string())
        };

        Ok(Self {
            region: read_value("region")?,
            ami: read_value("ami-id")?,
            instance_type: read_value("instance_type")?,
            distro: OsFamily::from_marker(&read_value("distro")?),
            creation_date: read_value("creation_date")?,
            server_ip: read_value("server_ip.txt")?,
            server_key: read_value("server_key.txt")?,
        })
    }

    /// Timestamp for `creation_date`.
    pub fn now_stamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// A locally managed instance folder together with its metadata.
#[derive(Debug)]
pub struct CreatedInstance {
    pub name: String,
    pub meta: InstanceMeta,
}

/// Enumerate `ec2-*` folders under the root, sorted by name. Folders with
/// incomplete metadata are reported and skipped, never fatal.
pub fn list_instances(root: &Path) -> Result<Vec<CreatedInstance>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }

    let mut entries: Vec<_> = fs::read_dir(root)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = dir_name.strip_prefix("ec2-") else {
            continue;
        };
        match InstanceMeta::read(&path) {
            Ok(meta) => found.push(CreatedInstance {
                name: name.to_string(),
                meta,
            }),
            Err(e) => {
                warn!(folder = %path.display(), error = %e, "skipping folder with incomplete metadata");
            }
        }
    }

    Ok(found)
}
