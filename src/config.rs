use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub region: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "S3-compatible gateway over a directory tree")]
pub struct Args {
    /// Host to bind to (overrides DIRSTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DIRSTORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory holding one sub-directory per bucket (overrides DIRSTORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Region reported for `?location` queries (overrides DIRSTORE_REGION)
    #[arg(long)]
    pub region: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Merge CLI values over environment values over defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("DIRSTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match lookup("DIRSTORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing DIRSTORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 9090,
            Err(err) => return Err(err).context("reading DIRSTORE_PORT"),
        };
        let env_storage =
            lookup("DIRSTORE_STORAGE_DIR").unwrap_or_else(|_| "./data/buckets".into());
        let env_region = lookup("DIRSTORE_REGION").unwrap_or_else(|_| "us-east-1".into());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            region: args.region.unwrap_or(env_region),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
