//! Process configuration from environment variables (after `.env`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use anyhow::{bail, Context};

use chainfeed_core::config::FeedConfig;
use chainfeed_storage::{BackendKind, PostgresConfig, StorageBackend};

use crate::logging::LogConfig;

pub const DEFAULT_PORT: u16 = 10592;
pub const DEFAULT_SQLITE_PATH: &str = "./chainfeed.db";

/// Everything `chainfeed serve` needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub feed: FeedConfig,
    pub storage: StorageBackend,
    pub log: LogConfig,
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset and empty values take
    /// defaults; malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = FeedConfig::default();
        let min_fee = parse_or(&get, "MIN_FEE", defaults.min_fee)?;
        let feed = FeedConfig {
            rpc_url: get("NUKLAI_RPC").context("NUKLAI_RPC must be set")?,
            recipient: get("RECIPIENT").unwrap_or(defaults.recipient),
            min_fee,
            fee_delta: parse_or(&get, "FEE_DELTA", defaults.fee_delta)?,
            initial_fee: get("INITIAL_FEE")
                .map(|v| parse_value::<u64>("INITIAL_FEE", &v))
                .transpose()?,
            target_epoch_secs: parse_or(&get, "TARGET_DURATION_PER_EPOCH", defaults.target_epoch_secs)?,
            admin_token: get("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            feed_size: parse_or(&get, "FEEDSIZE", defaults.feed_size)?,
            ..defaults
        };
        feed.validate().context("invalid feed configuration")?;

        let kind: BackendKind = match get("STORAGE_BACKEND") {
            Some(v) => v.parse().context("STORAGE_BACKEND")?,
            None => BackendKind::Postgres,
        };
        let storage = match kind {
            BackendKind::Memory => StorageBackend::Memory,
            BackendKind::Sqlite => StorageBackend::Sqlite {
                path: get("SQLITE_PATH").unwrap_or_else(|| DEFAULT_SQLITE_PATH.into()),
            },
            BackendKind::Postgres => {
                let pg = PostgresConfig::default();
                StorageBackend::Postgres(PostgresConfig {
                    host: get("POSTGRES_HOST").unwrap_or(pg.host),
                    port: parse_or(&get, "POSTGRES_PORT", pg.port)?,
                    user: get("POSTGRES_USER").unwrap_or(pg.user),
                    password: get("POSTGRES_PASSWORD").unwrap_or(pg.password),
                    dbname: get("POSTGRES_DBNAME").unwrap_or(pg.dbname),
                    enable_ssl: parse_bool(&get, "POSTGRES_ENABLESSL")?,
                })
            }
        };

        Ok(Self {
            host: get("HOST").unwrap_or_default(),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            feed,
            storage,
            log: LogConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                json: parse_bool(&get, "LOG_JSON")?,
            },
        })
    }

    /// Address to bind. An empty host means every interface; anything else
    /// may be an IP literal or a hostname, resolved here.
    pub async fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        if self.host.is_empty() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port));
        }
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("cannot resolve HOST {:?}", self.host))?
            .next()
            .with_context(|| format!("HOST {:?} resolved to no addresses", self.host))
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}={raw:?} is not valid"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<bool> {
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("{key}={v:?} is not a boolean"),
        },
    }
}
