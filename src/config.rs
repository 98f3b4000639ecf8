use crate::services::{
    remote_store::{DEFAULT_BUCKET, DEFAULT_TABLE, DEFAULT_TIMEOUT, RemoteConfig},
    store::Backend,
};
use crate::validation::MAX_FILE_SIZE_MB;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use url::Url;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub database_url: String,
    pub remote: Option<RemoteConfig>,
    pub max_file_size_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Roblox asset upload hub")]
pub struct Args {
    /// Host to bind to (overrides ASSET_HUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_HUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides ASSET_HUB_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// SQLite URL for the local backend (overrides ASSET_HUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL of the remote service (overrides ASSET_HUB_REMOTE_URL)
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Storage bucket name (overrides ASSET_HUB_REMOTE_BUCKET)
    #[arg(long)]
    pub remote_bucket: Option<String>,

    /// Metadata table name (overrides ASSET_HUB_REMOTE_TABLE)
    #[arg(long)]
    pub remote_table: Option<String>,

    /// Upload size ceiling in MiB (overrides ASSET_HUB_MAX_FILE_SIZE_MB)
    #[arg(long)]
    pub max_file_size_mb: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI values over values looked up through `var`. CLI wins.
    pub fn resolve(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = args
            .host
            .or_else(|| var("ASSET_HUB_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_var(&var, "ASSET_HUB_PORT")?.unwrap_or(3000),
        };
        let backend = match args.backend {
            Some(backend) => backend,
            None => match var("ASSET_HUB_BACKEND") {
                Some(value) => <Backend as clap::ValueEnum>::from_str(&value, true)
                    .map_err(|e| anyhow::anyhow!(e))
                    .with_context(|| format!("parsing ASSET_HUB_BACKEND value `{}`", value))?,
                None => Backend::Local,
            },
        };
        let database_url = args
            .database_url
            .or_else(|| var("ASSET_HUB_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://./data/asset_hub.db".into());
        let max_file_size_mb = match args.max_file_size_mb {
            Some(mb) => mb,
            None => parse_var(&var, "ASSET_HUB_MAX_FILE_SIZE_MB")?.unwrap_or(MAX_FILE_SIZE_MB),
        };

        let remote_url = args.remote_url.or_else(|| var("ASSET_HUB_REMOTE_URL"));
        let remote_key = var("ASSET_HUB_REMOTE_KEY");
        let remote = match (remote_url, remote_key) {
            (Some(url), Some(api_key)) => {
                let base_url = Url::parse(&url)
                    .with_context(|| format!("parsing ASSET_HUB_REMOTE_URL value `{}`", url))?;
                let timeout = parse_var::<u64>(&var, "ASSET_HUB_REMOTE_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TIMEOUT);
                Some(RemoteConfig {
                    base_url,
                    api_key,
                    bucket: args
                        .remote_bucket
                        .or_else(|| var("ASSET_HUB_REMOTE_BUCKET"))
                        .unwrap_or_else(|| DEFAULT_BUCKET.into()),
                    table: args
                        .remote_table
                        .or_else(|| var("ASSET_HUB_REMOTE_TABLE"))
                        .unwrap_or_else(|| DEFAULT_TABLE.into()),
                    timeout,
                })
            }
            _ => None,
        };

        if backend == Backend::Remote && remote.is_none() {
            bail!("remote backend requires ASSET_HUB_REMOTE_URL and ASSET_HUB_REMOTE_KEY");
        }

        Ok(Self {
            host,
            port,
            backend,
            database_url,
            remote,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(None),
    }
}
