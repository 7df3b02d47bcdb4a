//! CLI command definitions.

use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the OIDC discovery document and JWKS
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Mint an identity token and print it as JSON
    Token {
        /// Audience claim
        #[arg(short, long)]
        audience: String,

        /// Subject claim (defaults to the configured subject)
        #[arg(short, long)]
        subject: Option<String>,

        /// Extra claim; the value is parsed as JSON when possible
        #[arg(long = "claim", value_name = "NAME=VALUE")]
        claims: Vec<String>,
    },

    /// Exchange a fresh identity token for cloud credentials
    Credentials {
        /// Target cloud
        #[arg(value_enum)]
        cloud: Cloud,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Cloud {
    Aws,
    Azure,
    Gcp,
}
