//! Locating the federation configuration.

use anyhow::{Context, bail};
use skyfed_auth::FederationConfig;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "skyfed.yaml";
const DEFAULT_TERRAFORM_OUTPUT: &str = "tfoutput.json";

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    TerraformOutput(PathBuf),
}

impl ConfigSource {
    /// Pick an explicit source, else the first default file present in `dir`.
    pub fn resolve(
        config: Option<PathBuf>,
        terraform_output: Option<PathBuf>,
        dir: &Path,
    ) -> anyhow::Result<Self> {
        if let Some(path) = terraform_output {
            return Ok(Self::TerraformOutput(path));
        }
        if let Some(path) = config {
            return Ok(Self::File(path));
        }

        let file = dir.join(DEFAULT_CONFIG_FILE);
        if file.exists() {
            return Ok(Self::File(file));
        }
        let tf = dir.join(DEFAULT_TERRAFORM_OUTPUT);
        if tf.exists() {
            return Ok(Self::TerraformOutput(tf));
        }

        bail!(
            "no configuration found: pass --config or --terraform-output, or create {} or {}",
            DEFAULT_CONFIG_FILE,
            DEFAULT_TERRAFORM_OUTPUT
        )
    }

    pub fn load(&self) -> anyhow::Result<FederationConfig> {
        match self {
            Self::File(path) => FederationConfig::load(path)
                .with_context(|| format!("loading {}", path.display())),
            Self::TerraformOutput(path) => FederationConfig::from_terraform_file(path)
                .with_context(|| format!("loading {}", path.display())),
        }
    }
}
