//! Provisioning of a new instance folder from the built-in template.
//!
//! Launch settings are resolved against live AWS data: explicit flags are
//! validated against what the region actually offers, everything else is
//! prompted through the chooser.

use std::fs;
use std::path::Path;

use aws_sdk_ec2::types::Filter;
use colored::Colorize;

use crate::config::Config;
use crate::ec2::{self, OsFamily};
use crate::error::{Result, TfmError};
use crate::store::{self, InstanceMeta};
use crate::terraform;
use crate::ui::Chooser;

const MAIN_TEMPLATE: &str = include_str!("../templates/main.tf.tpl");
const USER_DATA: &str = include_str!("../templates/user-data.sh");

/// Listed first when prompting for a region.
const PRIORITY_REGION: &str = "us-east-1";

/// CPU architecture of an instance type, used to match AMIs.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    X86_64,
    Arm64,
}

impl CpuArch {
    pub fn from_aws(arch: &str) -> Result<Self> {
        match arch {
            "x86_64" => Ok(CpuArch::X86_64),
            "arm64" => Ok(CpuArch::Arm64),
            other => Err(anyhow::anyhow!("Unexpected AWS architecture: {}", other).into()),
        }
    }

    pub fn as_aws(&self) -> &'static str {
        match self {
            CpuArch::X86_64 => "x86_64",
            CpuArch::Arm64 => "arm64",
        }
    }
}

/// Everything needed to render the launch template.
#[derive(Debug, Clone)]
struct LaunchConfig {
    region: String,
    ami: String,
    instance_type: String,
    distro: OsFamily,
}

/// Create `<root>/ec2-<name>`, render the template into it, and apply it.
pub async fn run(
    config: &Config,
    chooser: &dyn Chooser,
    name: &str,
    distro_flag: Option<&str>,
    type_flag: Option<&str>,
) -> Result<()> {
    let root = store::ensure_root(&config.root)?;
    let instance_path = store::instance_dir(&root, name);
    if instance_path.exists() {
        return Err(TfmError::FolderExists(instance_path.display().to_string()));
    }

    let base_config = ec2::sdk_config(config.profile.as_deref(), config.region.as_deref()).await;
    let base_client = aws_sdk_ec2::Client::new(&base_config);

    let region = resolve_region(&base_client, config.region.as_deref(), chooser).await?;

    let regional_config = ec2::sdk_config(config.profile.as_deref(), Some(&region)).await;
    let client = aws_sdk_ec2::Client::new(&regional_config);

    // The instance type is chosen before the AMI so the AMI can match the
    // type's CPU architecture.
    let (instance_type, arch) = resolve_instance_type(&client, type_flag, chooser).await?;
    let (ami, distro) = resolve_ami(&client, distro_flag, arch, chooser).await?;
    let account = account_id(&regional_config).await?;

    let launch = LaunchConfig {
        region,
        ami,
        instance_type,
        distro,
    };

    println!(
        "{} {} ({}, {}, {})",
        "Launching".bright_blue().bold(),
        name.bright_cyan().bold(),
        launch.region,
        launch.instance_type,
        launch.ami
    );

    fs::create_dir_all(&instance_path)?;
    fs::write(
        instance_path.join("main.tf"),
        render_template(name, &account, &launch),
    )?;
    fs::write(instance_path.join("user-data.sh"), USER_DATA)?;

    terraform::init(&instance_path).await?;
    terraform::apply(&instance_path).await?;

    let server_key = terraform::output_value(&instance_path, "server_key").await?;
    let server_ip = terraform::output_value(&instance_path, "server_ip").await?;

    restrict_key_permissions(&instance_path.join(&server_key))?;

    let meta = InstanceMeta {
        region: launch.region.clone(),
        ami: launch.ami.clone(),
        instance_type: launch.instance_type.clone(),
        distro: launch.distro.clone(),
        creation_date: InstanceMeta::now_stamp(),
        server_ip: server_ip.clone(),
        server_key,
    };
    meta.write(&instance_path)?;

    println!(
        "{} {} ({})",
        "Created".green().bold(),
        name.bright_cyan().bold(),
        server_ip
    );
    Ok(())
}

/// Validate an explicit region against the live region list, or prompt with
/// the priority region on top. Cancelling the prompt falls back to the
/// priority region.
async fn resolve_region(
    client: &aws_sdk_ec2::Client,
    chosen: Option<&str>,
    chooser: &dyn Chooser,
) -> Result<String> {
    let resp = client
        .describe_regions()
        .send()
        .await
        .map_err(TfmError::aws)?;
    let mut regions: Vec<String> = resp
        .regions()
        .iter()
        .filter_map(|r| r.region_name().map(str::to_string))
        .collect();

    if let Some(chosen) = chosen {
        if !regions.iter().any(|r| r == chosen) {
            return Err(anyhow::anyhow!(
                "Region \"{}\" not found in AWS regions {:?}",
                chosen,
                regions
            )
            .into());
        }
        return Ok(chosen.to_string());
    }

    regions.retain(|r| r != PRIORITY_REGION);
    regions.insert(0, PRIORITY_REGION.to_string());

    let picked = chooser.choose(&regions, Some("Select an AWS region:"))?;
    Ok(picked.unwrap_or_else(|| PRIORITY_REGION.to_string()))
}

/// Candidate instance type with the details needed for selection.
#[derive(Debug, Clone)]
struct TypeCandidate {
    name: String,
    arch: String,
    vcpus: i32,
    memory_mib: i64,
}

fn render_type(candidate: &TypeCandidate) -> String {
    format!(
        "{} - {} vCPUs, {} GiB RAM",
        candidate.name,
        candidate.vcpus,
        candidate.memory_mib as f64 / 1024.0
    )
}

/// The instance type name out of a rendered selection line.
fn type_name_of_line(line: &str) -> &str {
    line.split_once(" - ")
        .map(|(name, _)| name.trim())
        .unwrap_or(line)
}

/// All general-purpose (`c`/`m`/`t` family) instance types in the region.
async fn fetch_instance_types(client: &aws_sdk_ec2::Client) -> Result<Vec<TypeCandidate>> {
    let mut stream = client.describe_instance_types().into_paginator().items().send();

    let mut candidates = Vec::new();
    while let Some(item) = stream.next().await {
        let info = item.map_err(TfmError::aws)?;
        let Some(name) = info.instance_type().map(|t| t.as_str().to_string()) else {
            continue;
        };
        if !(name.starts_with('c') || name.starts_with('m') || name.starts_with('t')) {
            continue;
        }
        candidates.push(TypeCandidate {
            arch: info
                .processor_info()
                .and_then(|p| p.supported_architectures().first())
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
            vcpus: info
                .v_cpu_info()
                .and_then(|v| v.default_v_cpus())
                .unwrap_or_default(),
            memory_mib: info
                .memory_info()
                .and_then(|m| m.size_in_mib())
                .unwrap_or_default(),
            name,
        });
    }

    Ok(candidates)
}

async fn resolve_instance_type(
    client: &aws_sdk_ec2::Client,
    chosen: Option<&str>,
    chooser: &dyn Chooser,
) -> Result<(String, CpuArch)> {
    let candidates = fetch_instance_types(client).await?;

    if let Some(chosen) = chosen {
        let Some(candidate) = candidates.iter().find(|c| c.name == chosen) else {
            return Err(anyhow::anyhow!(
                "Instance type \"{}\" is not available in this region",
                chosen
            )
            .into());
        };
        return Ok((candidate.name.clone(), CpuArch::from_aws(&candidate.arch)?));
    }

    let mut rendered: Vec<String> = candidates.iter().map(render_type).collect();
    rendered.sort();

    let Some(line) = chooser.choose(&rendered, Some("Select an instance type:"))? else {
        return Err(TfmError::Cancelled);
    };
    let name = type_name_of_line(&line);
    let candidate = candidates
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| anyhow::anyhow!("Instance type \"{}\" disappeared from the list", name))?;

    Ok((candidate.name.clone(), CpuArch::from_aws(&candidate.arch)?))
}

/// Newest image id by creation date.
fn newest_image(images: &[aws_sdk_ec2::types::Image]) -> Option<String> {
    images
        .iter()
        .max_by_key(|img| img.creation_date().unwrap_or_default().to_string())
        .and_then(|img| img.image_id())
        .map(str::to_string)
}

/// Latest Amazon Linux 2023 AMI for the architecture.
async fn latest_amazon_linux(
    client: &aws_sdk_ec2::Client,
    arch: CpuArch,
) -> Result<Option<String>> {
    let resp = client
        .describe_images()
        .owners("amazon")
        .filters(
            Filter::builder()
                .name("description")
                .values("Amazon Linux 2023 AMI 2023*")
                .build(),
        )
        .filters(
            Filter::builder()
                .name("architecture")
                .values(arch.as_aws())
                .build(),
        )
        .send()
        .await
        .map_err(TfmError::aws)?;

    Ok(newest_image(resp.images()))
}

/// Latest Ubuntu 22.04 LTS AMI for the architecture, skipping UNSUPPORTED,
/// Pro and Minimal variants.
async fn latest_ubuntu(client: &aws_sdk_ec2::Client, arch: CpuArch) -> Result<Option<String>> {
    let resp = client
        .describe_images()
        .owners("amazon")
        .filters(
            Filter::builder()
                .name("description")
                .values("*Ubuntu*22.04*LTS*")
                .build(),
        )
        .filters(
            Filter::builder()
                .name("architecture")
                .values(arch.as_aws())
                .build(),
        )
        .send()
        .await
        .map_err(TfmError::aws)?;

    let eligible: Vec<aws_sdk_ec2::types::Image> = resp
        .images()
        .iter()
        .filter(|img| {
            let description = img.description().unwrap_or_default();
            !description.contains("UNSUPPORTED")
                && !description.contains("Pro")
                && !description.contains("Minimal")
        })
        .cloned()
        .collect();

    Ok(newest_image(&eligible))
}

/// The distro and AMI id out of a rendered AMI option line.
fn parse_ami_choice(line: &str) -> (String, OsFamily) {
    let distro = if line.starts_with("Amazon Linux") {
        OsFamily::AmazonLinux
    } else {
        OsFamily::Ubuntu
    };
    let ami = line
        .rsplit(':')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    (ami, distro)
}

async fn resolve_ami(
    client: &aws_sdk_ec2::Client,
    distro_flag: Option<&str>,
    arch: CpuArch,
    chooser: &dyn Chooser,
) -> Result<(String, OsFamily)> {
    let amazon = latest_amazon_linux(client, arch).await?;
    let ubuntu = latest_ubuntu(client, arch).await?;

    if let Some(flag) = distro_flag {
        return match flag {
            "amazon-linux" => amazon
                .map(|ami| (ami, OsFamily::AmazonLinux))
                .ok_or_else(|| anyhow::anyhow!("No Amazon Linux AMI found").into()),
            "ubuntu" => ubuntu
                .map(|ami| (ami, OsFamily::Ubuntu))
                .ok_or_else(|| anyhow::anyhow!("No Ubuntu AMI found").into()),
            other => Err(anyhow::anyhow!(
                "Unexpected distro: {} (expected amazon-linux or ubuntu)",
                other
            )
            .into()),
        };
    }

    let mut options = Vec::new();
    if let Some(ami) = &amazon {
        options.push(format!("Amazon Linux AMI: {}", ami));
    }
    if let Some(ami) = &ubuntu {
        options.push(format!("Ubuntu AMI: {}", ami));
    }
    if options.is_empty() {
        return Err(anyhow::anyhow!("No candidate AMIs found in this region").into());
    }

    let Some(line) = chooser.choose(&options, Some("Select an AMI:"))? else {
        return Err(TfmError::Cancelled);
    };
    Ok(parse_ami_choice(&line))
}

/// Account id for the template's allowed_account_ids guard.
async fn account_id(sdk_config: &aws_config::SdkConfig) -> Result<String> {
    let sts = aws_sdk_sts::Client::new(sdk_config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .map_err(TfmError::aws)?;
    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| TfmError::Aws("caller identity has no account id".to_string()))
}

fn render_template(name: &str, account: &str, launch: &LaunchConfig) -> String {
    MAIN_TEMPLATE
        .replace("$NAME", name)
        .replace("$REGION", &launch.region)
        .replace("$AMI", &launch.ami)
        .replace("$INSTANCE_TYPE", &launch.instance_type)
        .replace("$ACCOUNT", account)
}

/// Private key material must not stay group or world readable.
fn restrict_key_permissions(key_path: &Path) -> Result<()> {
    #[cfg(unix)]
    if key_path.exists() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(key_path, fs::Permissions::from_mode(0o400))?;
    }
    #[cfg(not(unix))]
    let _ = key_path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch() -> LaunchConfig {
        LaunchConfig {
            region: "us-east-1".to_string(),
            ami: "ami-0123456789abcdef0".to_string(),
            instance_type: "t3.micro".to_string(),
            distro: OsFamily::Ubuntu,
        }
    }

    #[test]
    fn test_render_template_fills_every_placeholder() {
        let rendered = render_template("web1", "123456789012", &launch());
        for placeholder in ["$NAME", "$REGION", "$AMI", "$INSTANCE_TYPE", "$ACCOUNT"] {
            assert!(
                !rendered.contains(placeholder),
                "{} left in template",
                placeholder
            );
        }
        assert!(rendered.contains("ami-0123456789abcdef0"));
        assert!(rendered.contains("t3.micro"));
        assert!(rendered.contains("123456789012"));
        assert!(rendered.contains("Name = \"web1\""));
    }

    #[test]
    fn test_render_template_keeps_terraform_interpolations() {
        let rendered = render_template("web1", "123456789012", &launch());
        assert!(rendered.contains("${path.module}"));
    }

    #[test]
    fn test_render_type_line() {
        let candidate = TypeCandidate {
            name: "t3.micro".to_string(),
            arch: "x86_64".to_string(),
            vcpus: 2,
            memory_mib: 1024,
        };
        assert_eq!(render_type(&candidate), "t3.micro - 2 vCPUs, 1 GiB RAM");
    }

    #[test]
    fn test_render_type_fractional_memory() {
        let candidate = TypeCandidate {
            name: "t3.nano".to_string(),
            arch: "x86_64".to_string(),
            vcpus: 2,
            memory_mib: 512,
        };
        assert_eq!(render_type(&candidate), "t3.nano - 2 vCPUs, 0.5 GiB RAM");
    }

    #[test]
    fn test_type_name_of_line() {
        assert_eq!(type_name_of_line("c5.large - 2 vCPUs, 4 GiB RAM"), "c5.large");
        assert_eq!(type_name_of_line("c5.large"), "c5.large");
    }

    #[test]
    fn test_parse_ami_choice() {
        let (ami, distro) = parse_ami_choice("Amazon Linux AMI: ami-111");
        assert_eq!(ami, "ami-111");
        assert_eq!(distro, OsFamily::AmazonLinux);

        let (ami, distro) = parse_ami_choice("Ubuntu AMI: ami-222");
        assert_eq!(ami, "ami-222");
        assert_eq!(distro, OsFamily::Ubuntu);
    }

    #[test]
    fn test_cpu_arch_round_trip() {
        assert_eq!(CpuArch::from_aws("x86_64").unwrap(), CpuArch::X86_64);
        assert_eq!(CpuArch::from_aws("arm64").unwrap(), CpuArch::Arm64);
        assert_eq!(CpuArch::X86_64.as_aws(), "x86_64");
    }

    #[test]
    fn test_cpu_arch_rejects_unknown() {
        assert!(CpuArch::from_aws("riscv64").is_err());
    }
}
