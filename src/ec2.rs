//! EC2 instance discovery.

use std::collections::HashMap;

use aws_config::BehaviorVersion;
use aws_sdk_ec2::types::Filter;
use tracing::debug;

use crate::error::{Result, TfmError};

/// Operating system family of an instance's backing image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsFamily {
    AmazonLinux,
    Ubuntu,
    EksAmi,
    /// Unrecognized image; carries the lowercased description for diagnosis.
    Unknown(String),
}

impl OsFamily {
    /// Classify an AMI description by case-insensitive substring match.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("ubuntu") {
            OsFamily::Ubuntu
        } else if lower.contains("amzn") || lower.contains("amazon linux") {
            OsFamily::AmazonLinux
        } else if lower.contains("kubernetes worker ami") {
            OsFamily::EksAmi
        } else {
            OsFamily::Unknown(lower)
        }
    }

    /// Stable marker persisted in instance config folders.
    pub fn as_marker(&self) -> &str {
        match self {
            OsFamily::AmazonLinux => "amazon-linux",
            OsFamily::Ubuntu => "ubuntu",
            OsFamily::EksAmi => "eks-ami",
            OsFamily::Unknown(_) => "unknown",
        }
    }

    /// Parse a persisted marker. Unrecognized markers become [`Unknown`]
    /// rather than an error; new image families appear over time.
    ///
    /// [`Unknown`]: OsFamily::Unknown
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            "amazon-linux" => OsFamily::AmazonLinux,
            "ubuntu" => OsFamily::Ubuntu,
            "eks-ami" => OsFamily::EksAmi,
            other => OsFamily::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::AmazonLinux => write!(f, "Amazon Linux"),
            OsFamily::Ubuntu => write!(f, "Ubuntu"),
            OsFamily::EksAmi => write!(f, "EKS AMI"),
            OsFamily::Unknown(description) if description.is_empty() => write!(f, "Unknown"),
            OsFamily::Unknown(description) => write!(f, "Unknown - {}", description),
        }
    }
}

/// One running EC2 instance as observed from the provider. Not persisted;
/// lives for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub instance_id: String,
    /// Value of the `Name` tag; empty means unnamed.
    pub name: String,
    pub instance_type: String,
    /// Placement availability zone minus its trailing zone letter.
    pub region: String,
    pub public_ip: Option<String>,
    pub os_family: OsFamily,
}

impl InstanceRecord {
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Load AWS SDK configuration with optional profile and explicit region.
/// Without a region the SDK default chain applies (environment, config
/// file, IMDS).
pub async fn sdk_config(profile: Option<&str>, region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// EC2 instance scanner.
pub struct Scanner {
    client: aws_sdk_ec2::Client,
}

impl Scanner {
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }

    pub async fn from_config(profile: Option<&str>, region: Option<&str>) -> Self {
        let sdk_config = sdk_config(profile, region).await;
        Self::new(aws_sdk_ec2::Client::new(&sdk_config))
    }

    /// Fetch all instances currently in the `running` state.
    pub async fn fetch_running(&self) -> Result<Vec<InstanceRecord>> {
        let resp = self
            .client
            .describe_instances()
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(TfmError::aws)?;

        let instances: Vec<aws_sdk_ec2::types::Instance> = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .cloned()
            .collect();

        debug!(count = instances.len(), "describe-instances returned");

        let descriptions = self.fetch_image_descriptions(&instances).await?;

        let records = instances
            .iter()
            .map(|i| {
                // Classification is recomputed on every run; instances with
                // no resolvable image classify as Unknown("").
                let os_family = i
                    .image_id()
                    .and_then(|id| descriptions.get(id))
                    .map(|d| OsFamily::classify(d))
                    .unwrap_or_else(|| OsFamily::Unknown(String::new()));

                InstanceRecord {
                    instance_id: i.instance_id().unwrap_or_default().to_string(),
                    name: extract_name_tag(i).unwrap_or_default(),
                    instance_type: i
                        .instance_type()
                        .map(|t| t.as_str().to_string())
                        .unwrap_or_default(),
                    region: region_of(i),
                    public_ip: i.public_ip_address().map(str::to_string),
                    os_family,
                }
            })
            .collect();

        Ok(records)
    }

    /// Batched `DescribeImages` for every distinct backing AMI, keyed by
    /// image id.
    async fn fetch_image_descriptions(
        &self,
        instances: &[aws_sdk_ec2::types::Instance],
    ) -> Result<HashMap<String, String>> {
        let mut ids: Vec<String> = instances
            .iter()
            .filter_map(|i| i.image_id().map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let resp = self
            .client
            .describe_images()
            .set_image_ids(Some(ids))
            .send()
            .await
            .map_err(TfmError::aws)?;

        Ok(resp
            .images()
            .iter()
            .filter_map(|img| {
                img.image_id().map(|id| {
                    (
                        id.to_string(),
                        img.description().unwrap_or_default().to_string(),
                    )
                })
            })
            .collect())
    }
}

fn region_of(instance: &aws_sdk_ec2::types::Instance) -> String {
    let zone = instance
        .placement()
        .and_then(|p| p.availability_zone())
        .unwrap_or_default();
    strip_zone_letter(zone).to_string()
}

/// Region is the availability zone minus its trailing zone letter
/// (`us-east-1a` -> `us-east-1`).
pub fn strip_zone_letter(zone: &str) -> &str {
    match zone.char_indices().next_back() {
        Some((idx, c)) if c.is_ascii_alphabetic() => &zone[..idx],
        _ => zone,
    }
}

/// First tag keyed `Name`, if any.
fn extract_name_tag(instance: &aws_sdk_ec2::types::Instance) -> Option<String> {
    instance
        .tags()
        .iter()
        .find(|tag| tag.key() == Some("Name"))
        .and_then(|tag| tag.value())
        .map(|s| s.to_string())
}
