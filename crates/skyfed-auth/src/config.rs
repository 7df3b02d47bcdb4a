//! Static federation configuration.
//!
//! Values come from provisioning output (the Terraform `output -json` document)
//! or from a layered config file with `SKYFED__*` environment overrides. The
//! resulting [`FederationConfig`] is built once at startup and shared read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid provisioning output: {0}")]
    Terraform(#[from] serde_json::Error),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid issuer URL: {0}")]
    InvalidIssuer(String),
}

/// Process-wide federation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// KMS key handle (key id or ARN) of the signing key.
    pub key_id: String,
    /// Overrides the `kid` published in headers and the JWKS.
    #[serde(default)]
    pub kid: Option<String>,
    /// Issuer written into every minted token.
    pub issuer_url: String,
    /// `sub` claim presented by the exchange adapters.
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Deadline for each network round trip, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub kms: KmsSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub aws: AwsSettings,
    #[serde(default)]
    pub azure: AzureSettings,
    #[serde(default)]
    pub gcp: GcpSettings,
}

fn default_subject() -> String {
    "example-sub".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// How the KMS client is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KmsSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// HTTP listener for the discovery/JWKS publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// AWS role assumption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSettings {
    #[serde(default)]
    pub role_arn: String,
    #[serde(default = "default_aws_region")]
    pub region: String,
    #[serde(default = "default_session_name")]
    pub session_name: String,
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u32,
    /// Overrides the regional STS endpoint.
    #[serde(default)]
    pub sts_endpoint: Option<String>,
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_session_name() -> String {
    "skyfed".to_string()
}

fn default_duration_seconds() -> u32 {
    3600
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            role_arn: String::new(),
            region: default_aws_region(),
            session_name: default_session_name(),
            duration_seconds: default_duration_seconds(),
            sts_endpoint: None,
        }
    }
}

/// Azure AD application bound to the federated credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureSettings {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_azure_scope")]
    pub scope: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
}

fn default_azure_scope() -> String {
    "https://management.azure.com/.default".to_string()
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            scope: default_azure_scope(),
            authority_host: default_authority_host(),
        }
    }
}

/// GCP workload identity pool and impersonated service account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpSettings {
    #[serde(default)]
    pub organization_id: String,
    /// Full provider audience, `//iam.googleapis.com/projects/.../providers/...`.
    #[serde(default)]
    pub workload_identity_audience: String,
    #[serde(default)]
    pub service_account_email: String,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime: String,
    #[serde(default = "default_gcp_sts_endpoint")]
    pub sts_endpoint: String,
    #[serde(default = "default_iam_credentials_endpoint")]
    pub iam_credentials_endpoint: String,
}

fn default_token_lifetime() -> String {
    "3600s".to_string()
}

fn default_gcp_sts_endpoint() -> String {
    "https://sts.googleapis.com/v1/token".to_string()
}

fn default_iam_credentials_endpoint() -> String {
    "https://iamcredentials.googleapis.com".to_string()
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            organization_id: String::new(),
            workload_identity_audience: String::new(),
            service_account_email: String::new(),
            token_lifetime: default_token_lifetime(),
            sts_endpoint: default_gcp_sts_endpoint(),
            iam_credentials_endpoint: default_iam_credentials_endpoint(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TerraformOutput {
    value: serde_json::Value,
}

impl FederationConfig {
    /// Create a configuration with defaults for everything but the key and issuer.
    pub fn new(key_id: impl Into<String>, issuer_url: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            kid: None,
            issuer_url: issuer_url.into(),
            subject: default_subject(),
            request_timeout_secs: default_request_timeout(),
            kms: KmsSettings::default(),
            server: ServerSettings::default(),
            aws: AwsSettings::default(),
            azure: AzureSettings::default(),
            gcp: GcpSettings::default(),
        }
    }

    /// Load from a config file, then apply `SKYFED__SECTION__KEY` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(config::Environment::with_prefix("SKYFED").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `terraform output -json` file.
    pub fn from_terraform_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_terraform_output(&contents)
    }

    /// Parse the `{"name": {"value": ...}}` provisioning output document.
    pub fn from_terraform_output(json: &str) -> Result<Self, ConfigError> {
        let outputs: HashMap<String, TerraformOutput> = serde_json::from_str(json)?;
        let value = |name: &str| -> String {
            match outputs.get(name).map(|o| &o.value) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };

        let mut config = Self::new(value("key_id"), value("issuer_url"));
        config.azure.tenant_id = value("azure_tenant_id");
        config.azure.client_id = value("azure_client_id");
        config.gcp.organization_id = value("gcp_organization_id");
        config.gcp.workload_identity_audience = value("gcp_audience");
        config.gcp.service_account_email = value("gcp_service_account");
        config.aws.role_arn = value("aws_role_arn");

        config.validate()?;
        Ok(config)
    }

    /// Check the settings every component depends on.
    ///
    /// Per-cloud identifiers are checked when the matching provider is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_id.trim().is_empty() {
            return Err(ConfigError::Missing("key_id"));
        }
        if self.issuer_url.trim().is_empty() {
            return Err(ConfigError::Missing("issuer_url"));
        }

        let issuer = url::Url::parse(&self.issuer_url)
            .map_err(|e| ConfigError::InvalidIssuer(format!("{}: {}", self.issuer_url, e)))?;
        if !matches!(issuer.scheme(), "https" | "http") || issuer.host_str().is_none() {
            return Err(ConfigError::InvalidIssuer(self.issuer_url.clone()));
        }

        Ok(())
    }

    /// The `kid` used in token headers and the JWKS.
    pub fn kid(&self) -> &str {
        self.kid.as_deref().unwrap_or(&self.key_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Authority (`host[:port]`) of the issuer URL.
    pub fn issuer_authority(&self) -> Option<String> {
        let issuer = url::Url::parse(&self.issuer_url).ok()?;
        let host = issuer.host_str()?;
        Some(match issuer.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}
