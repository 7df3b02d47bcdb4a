//! Command handlers.

use anyhow::Context;
use console::style;
use serde_json::Value;
use skyfed_api::AppState;
use skyfed_auth::{
    AwsProvider, AzureProvider, ClaimSet, CloudCredentials, CredentialBroker, FederationConfig, GcpProvider,
    KmsSigner, Signer, SubjectTokenSource, TokenExchangeProvider, TokenMinter, TokenResponse, kms_client,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::commands::Cloud;

/// Connect to KMS and load the public key. Failure here is fatal.
async fn connect_signer(config: &FederationConfig) -> anyhow::Result<KmsSigner> {
    let client = kms_client(&config.kms).await;
    KmsSigner::connect(client, config.key_id.clone(), config.kid())
        .await
        .context("signing key unavailable")
}

fn minter(config: &FederationConfig, signer: KmsSigner) -> Arc<TokenMinter> {
    Arc::new(TokenMinter::new(Arc::new(signer), config.issuer_url.clone()))
}

/// Run the discovery/JWKS publisher.
pub async fn serve(config: &FederationConfig, bind: Option<String>) -> anyhow::Result<()> {
    let signer = connect_signer(config).await?;
    let state = Arc::new(AppState::from_config(signer.key().clone(), config));

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;

    skyfed_api::serve(listener, state).await?;
    Ok(())
}

/// Mint a token and print it.
pub async fn token(
    config: &FederationConfig,
    audience: String,
    subject: Option<String>,
    claims: Vec<String>,
) -> anyhow::Result<()> {
    let mut claim_set = ClaimSet::new()
        .subject(subject.unwrap_or_else(|| config.subject.clone()))
        .audience(audience);
    for raw in &claims {
        let (name, value) = parse_claim(raw)?;
        claim_set = claim_set.claim(name, value);
    }

    let signer = connect_signer(config).await?;
    let minted = minter(config, signer).mint(claim_set).await?;

    println!("{}", serde_json::to_string_pretty(&TokenResponse::from(minted))?);
    Ok(())
}

/// Acquire credentials for one cloud and print a summary.
pub async fn credentials(config: &FederationConfig, cloud: Cloud) -> anyhow::Result<()> {
    let timeout = config.request_timeout();
    let provider: Box<dyn TokenExchangeProvider> = match cloud {
        Cloud::Aws => Box::new(AwsProvider::new(config.aws.clone(), timeout)?),
        Cloud::Azure => Box::new(AzureProvider::new(config.azure.clone(), timeout)?),
        Cloud::Gcp => Box::new(GcpProvider::new(config.gcp.clone(), timeout)?),
    };

    let signer = connect_signer(config).await?;
    let tokens = Arc::new(SubjectTokenSource::new(minter(config, signer), config.subject.clone()));
    let broker = CredentialBroker::new(tokens, timeout);

    info!(?cloud, audience = provider.audience(), "Acquiring federated credentials");
    let credentials = broker.acquire(provider.as_ref()).await?;

    print_credentials(config, &credentials);
    Ok(())
}

fn print_credentials(config: &FederationConfig, credentials: &CloudCredentials) {
    match credentials {
        CloudCredentials::Aws(creds) => {
            println!(
                "{} Assumed AWS role {}",
                style("✓").green(),
                style(&config.aws.role_arn).bold()
            );
            println!("  Access key: {}", creds.access_key_id);
            println!("  Region: {}", creds.region);
        }
        CloudCredentials::Azure(creds) => {
            println!(
                "{} Authenticated to Azure tenant {}",
                style("✓").green(),
                style(&creds.tenant_id).bold()
            );
            println!("  Client ID: {}", config.azure.client_id);
            println!("  Access token: {}", redact(&creds.access_token));
        }
        CloudCredentials::Gcp(creds) => {
            println!(
                "{} Impersonated {} in GCP organization {}",
                style("✓").green(),
                style(&config.gcp.service_account_email).bold(),
                config.gcp.organization_id
            );
            println!("  Access token: {}", redact(&creds.access_token));
        }
    }

    println!("  Expires: {}", credentials.expires_at().to_rfc3339());
}

/// Print the effective configuration.
pub fn show_config(config: &FederationConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Parse `NAME=VALUE`; VALUE is JSON if it parses, otherwise a string.
pub fn parse_claim(raw: &str) -> anyhow::Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("claim {:?} is not NAME=VALUE", raw))?;
    if name.is_empty() {
        anyhow::bail!("claim {:?} has an empty name", raw);
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}… ({} chars)", prefix, token.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claim() {
        assert_eq!(
            parse_claim("sub=example-sub").unwrap(),
            ("sub".to_string(), Value::String("example-sub".to_string()))
        );
        assert_eq!(parse_claim("n=42").unwrap().1, serde_json::json!(42));
        assert_eq!(parse_claim("ctx={\"env\":\"prod\"}").unwrap().1["env"], "prod");
        assert_eq!(parse_claim("url=https://a.example.com/?x=1").unwrap().1, "https://a.example.com/?x=1");
        assert!(parse_claim("novalue").is_err());
        assert!(parse_claim("=x").is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("ya29.abcdefghijkl"), "ya29.a… (17 chars)");
    }
}
