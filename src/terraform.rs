//! Terraform and terraformer invocations.
//!
//! Command argument lists are built by pure functions so every invocation is
//! reproducible and testable; the actual runs go through [`crate::exec`].

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::exec::run_step;
use crate::repair::DiagnosticSet;

/// File terraformer writes the imported resource definitions to.
pub const RESOURCES_FILE: &str = "resources.tf";

/// Placeholder provider reference emitted by terraformer imports; init and
/// validate cannot resolve it.
const PLACEHOLDER_PROVIDER: &str = "registry.terraform.io/-/aws";
/// Canonical provider source.
const CANONICAL_PROVIDER: &str = "hashicorp/aws";

pub fn import_args(instance_id: &str, profile: &str, output_dir: &Path) -> Vec<String> {
    vec![
        "import".to_string(),
        "aws".to_string(),
        "--resources=ec2_instance".to_string(),
        format!("--filter=Name=id;Value={}", instance_id),
        format!("--profile={}", profile),
        "--compact".to_string(),
        "--path-pattern".to_string(),
        output_dir.display().to_string(),
    ]
}

/// Reverse-generate the Terraform definition of one instance into
/// `output_dir` via terraformer. Runs from the managed root so relative
/// output paths resolve predictably.
pub async fn import_instance(
    instance_id: &str,
    profile: &str,
    root: &Path,
    output_dir: &Path,
) -> Result<()> {
    run_step(
        "terraformer import",
        "terraformer",
        &import_args(instance_id, profile, output_dir),
        root,
    )
    .await?
    .require_success("terraformer import")?;
    Ok(())
}

pub fn replace_provider_args() -> Vec<String> {
    vec![
        "state".to_string(),
        "replace-provider".to_string(),
        "-auto-approve".to_string(),
        PLACEHOLDER_PROVIDER.to_string(),
        CANONICAL_PROVIDER.to_string(),
    ]
}

/// Rewrite the imported state so the provider source reference is the
/// canonical one. The underlying command is idempotent; re-running against
/// an already-canonical state succeeds.
pub async fn replace_provider(dir: &Path) -> Result<()> {
    run_step(
        "terraform state replace-provider",
        "terraform",
        &replace_provider_args(),
        dir,
    )
    .await?
    .require_success("terraform state replace-provider")?;
    Ok(())
}

pub async fn init(dir: &Path) -> Result<()> {
    run_step("terraform init", "terraform", &["init".to_string()], dir)
        .await?
        .require_success("terraform init")?;
    Ok(())
}

pub async fn apply(dir: &Path) -> Result<()> {
    run_step(
        "terraform apply",
        "terraform",
        &["apply".to_string(), "-auto-approve".to_string()],
        dir,
    )
    .await?
    .require_success("terraform apply")?;
    Ok(())
}

pub async fn destroy(dir: &Path) -> Result<()> {
    run_step(
        "terraform destroy",
        "terraform",
        &["destroy".to_string(), "-auto-approve".to_string()],
        dir,
    )
    .await?
    .require_success("terraform destroy")?;
    Ok(())
}

/// Read one `terraform output` value, stripped of surrounding quoting.
pub async fn output_value(dir: &Path, name: &str) -> Result<String> {
    let step = format!("terraform output {}", name);
    let out = run_step(&step, "terraform", &["output".to_string(), name.to_string()], dir)
        .await?
        .require_success(&step)?;
    Ok(out.stdout_text().trim().trim_matches('"').to_string())
}

/// `terraform validate -json` report. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct ValidateReport {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    pub range: Option<DiagnosticRange>,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticRange {
    #[serde(default)]
    pub filename: String,
    pub start: Option<DiagnosticPos>,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticPos {
    pub line: usize,
}

impl ValidateReport {
    /// 1-based start lines of error diagnostics anchored to `file`.
    /// Warnings and diagnostics without a range carry no line to remove.
    pub fn error_lines(&self, file: &str) -> DiagnosticSet {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == "error")
            .filter_map(|d| d.range.as_ref())
            .filter(|r| r.filename == file)
            .filter_map(|r| r.start.as_ref())
            .map(|s| s.line)
            .collect()
    }
}

/// Run a structural validation pass. Success means a parseable report, not a
/// zero exit code: terraform exits non-zero whenever diagnostics exist.
pub async fn validate(dir: &Path) -> Result<ValidateReport> {
    run_step(
        "terraform validate",
        "terraform",
        &["validate".to_string(), "-json".to_string()],
        dir,
    )
    .await?
    .parse_json("terraform validate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_import_args_scope_one_instance() {
        let args = import_args(
            "i-0450bdd70834f2294",
            "deployment-tests",
            &PathBuf::from("/managed/ec2-web1"),
        );
        assert!(args.contains(&"--resources=ec2_instance".to_string()));
        assert!(args.contains(&"--filter=Name=id;Value=i-0450bdd70834f2294".to_string()));
        assert!(args.contains(&"--profile=deployment-tests".to_string()));
        assert!(args.contains(&"/managed/ec2-web1".to_string()));
    }

    #[test]
    fn test_replace_provider_args_are_pure() {
        // Same args every time; the rewrite can be re-run safely.
        assert_eq!(replace_provider_args(), replace_provider_args());
        assert_eq!(
            replace_provider_args(),
            vec![
                "state",
                "replace-provider",
                "-auto-approve",
                "registry.terraform.io/-/aws",
                "hashicorp/aws",
            ]
        );
    }

    const SAMPLE_REPORT: &str = r#"{
        "format_version": "1.0",
        "valid": false,
        "error_count": 2,
        "warning_count": 1,
        "diagnostics": [
            {
                "severity": "error",
                "summary": "Unsupported argument",
                "detail": "An argument named \"arn\" is not expected here.",
                "range": {
                    "filename": "resources.tf",
                    "start": {"line": 4, "column": 3, "byte": 80},
                    "end": {"line": 4, "column": 6, "byte": 83}
                }
            },
            {
                "severity": "error",
                "summary": "Unsupported argument",
                "range": {
                    "filename": "resources.tf",
                    "start": {"line": 11, "column": 3, "byte": 240},
                    "end": {"line": 11, "column": 20, "byte": 257}
                }
            },
            {
                "severity": "warning",
                "summary": "Deprecated attribute",
                "range": {
                    "filename": "resources.tf",
                    "start": {"line": 7, "column": 3, "byte": 120},
                    "end": {"line": 7, "column": 9, "byte": 126}
                }
            },
            {
                "severity": "error",
                "summary": "Provider configuration problem"
            },
            {
                "severity": "error",
                "summary": "Elsewhere",
                "range": {
                    "filename": "provider.tf",
                    "start": {"line": 2, "column": 1, "byte": 10},
                    "end": {"line": 2, "column": 5, "byte": 14}
                }
            }
        ]
    }"#;

    #[test]
    fn test_error_lines_filters_severity_and_file() {
        let report: ValidateReport = serde_json::from_str(SAMPLE_REPORT).unwrap();
        assert!(!report.valid);
        let lines = report.error_lines(RESOURCES_FILE);
        // The warning on line 7, the unanchored diagnostic and the
        // provider.tf error contribute nothing.
        assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![4, 11]);
    }

    #[test]
    fn test_error_lines_empty_diagnostics() {
        let report: ValidateReport =
            serde_json::from_str(r#"{"format_version": "1.0", "valid": true}"#).unwrap();
        assert!(report.valid);
        assert!(report.error_lines(RESOURCES_FILE).is_empty());
    }
}
