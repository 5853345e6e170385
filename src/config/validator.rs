use anyhow::{bail, Result};

use super::types::{resolve_credentials_path, Settings};

/// Validate settings before any discovery or execution happens.
pub fn validate(settings: &Settings) -> Result<()> {
    validate_root(settings)?;
    validate_credentials(settings)?;
    validate_limits(settings)?;
    Ok(())
}

fn validate_root(settings: &Settings) -> Result<()> {
    let root = settings.root();
    if !root.is_dir() {
        bail!("Terragrunt root path does not exist: {}", root.display());
    }
    Ok(())
}

fn validate_credentials(settings: &Settings) -> Result<()> {
    if let Some(ref raw) = settings.gcp.credentials_path {
        let resolved = resolve_credentials_path(raw);
        if !resolved.exists() {
            bail!(
                "GCP credentials path does not exist: {}",
                resolved.display()
            );
        }
    }
    Ok(())
}

fn validate_limits(settings: &Settings) -> Result<()> {
    if settings.terragrunt.parallelism == 0 {
        bail!("terragrunt.parallelism must be at least 1");
    }
    if settings.stacks.max_parallel_units == Some(0) {
        bail!("stacks.max_parallel_units must be at least 1 when set");
    }
    if settings.terragrunt.binary_path.trim().is_empty() {
        bail!("terragrunt.binary_path must not be empty");
    }
    Ok(())
}
