//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use axum_extra::extract::cookie::Key;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "holmok";
const ENV_PREFIX: &str = "HOLMOK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_COOKIE_NAME: &str = "_holmok";
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_COOKIE_MAX_AGE_DAYS: u64 = 7;
const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 5;
const DEFAULT_CACHE_TTL_MINUTES: u64 = 60;
const MIN_COOKIE_KEY_BYTES: usize = 32;

/// Command-line arguments for the Holmok binary.
#[derive(Debug, Parser)]
#[command(name = "holmok", version, about = "Holmok photo site server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HOLMOK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Print the stored form of a password for seeding the users table.
    #[command(name = "hash-password")]
    HashPassword(HashPasswordArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct HashPasswordArgs {
    /// Plain-text password to hash.
    #[arg(value_name = "PASSWORD")]
    pub password: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override log level filter.
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON formatted logs.
    #[arg(long = "log-json", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the identity token secret.
    #[arg(long = "session-secret", value_name = "SECRET")]
    pub session_secret: Option<String>,

    /// Override the per-cache byte budget, in MiB.
    #[arg(long = "cache-max-size-mb", value_name = "MIB")]
    pub cache_max_size_mb: Option<u64>,

    /// Override the cache entry lifetime.
    #[arg(long = "cache-ttl-minutes", value_name = "MINUTES")]
    pub cache_ttl_minutes: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub cookie_name: String,
    pub token_ttl: Duration,
    pub cookie_max_age: Duration,
    cookie_key_material: Vec<u8>,
}

impl SessionSettings {
    /// Signing key for the cookie jar, derived from the configured key material.
    pub fn cookie_key(&self) -> Key {
        Key::derive_from(&self.cookie_key_material)
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &"<redacted>")
            .field("cookie_name", &self.cookie_name)
            .field("token_ttl", &self.token_ttl)
            .field("cookie_max_age", &self.cookie_max_age)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_size_bytes: NonZeroUsize,
    pub ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("session.cookie_keys")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    if let Some(Command::Serve(args)) = cli.command.as_ref() {
        raw.apply_serve_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    session: RawSessionSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(secret) = overrides.session_secret.as_ref() {
            self.session.secret = Some(secret.clone());
        }
        if let Some(size) = overrides.cache_max_size_mb {
            self.cache.max_size_mb = Some(size);
        }
        if let Some(minutes) = overrides.cache_ttl_minutes {
            self.cache.ttl_minutes = Some(minutes);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            session,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            session: build_session_settings(session)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let secret = session.secret.unwrap_or_default();
    if secret.is_empty() {
        return Err(LoadError::invalid("session.secret", "must not be empty"));
    }

    let cookie_name = session
        .cookie_name
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
    if cookie_name.is_empty() {
        return Err(LoadError::invalid("session.cookie_name", "must not be empty"));
    }

    let token_ttl_secs = session
        .token_ttl_seconds
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    if token_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "session.token_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let max_age_days = session
        .cookie_max_age_days
        .unwrap_or(DEFAULT_COOKIE_MAX_AGE_DAYS);
    if max_age_days == 0 {
        return Err(LoadError::invalid(
            "session.cookie_max_age_days",
            "must be greater than zero",
        ));
    }
    let cookie_max_age_secs = max_age_days.checked_mul(24 * 60 * 60).ok_or_else(|| {
        LoadError::invalid(
            "session.cookie_max_age_days",
            "value exceeds supported range",
        )
    })?;

    let cookie_key_material = session.cookie_keys.concat().into_bytes();
    if cookie_key_material.len() < MIN_COOKIE_KEY_BYTES {
        return Err(LoadError::invalid(
            "session.cookie_keys",
            format!("key material must be at least {MIN_COOKIE_KEY_BYTES} bytes"),
        ));
    }

    Ok(SessionSettings {
        secret,
        cookie_name,
        token_ttl: Duration::from_secs(token_ttl_secs),
        cookie_max_age: Duration::from_secs(cookie_max_age_secs),
        cookie_key_material,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let size_mb = cache.max_size_mb.unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB);
    let bytes = size_mb
        .checked_mul(1024 * 1024)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.max_size_mb",
                "value exceeds supported range for usize",
            )
        })?;
    let max_size_bytes = NonZeroUsize::new(bytes)
        .ok_or_else(|| LoadError::invalid("cache.max_size_mb", "must be greater than zero"))?;

    let ttl_minutes = cache.ttl_minutes.unwrap_or(DEFAULT_CACHE_TTL_MINUTES);
    if ttl_minutes == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_minutes",
            "must be greater than zero",
        ));
    }
    let ttl_secs = ttl_minutes
        .checked_mul(60)
        .ok_or_else(|| LoadError::invalid("cache.ttl_minutes", "value exceeds supported range"))?;

    Ok(CacheSettings {
        max_size_bytes,
        ttl: Duration::from_secs(ttl_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    secret: Option<String>,
    cookie_name: Option<String>,
    token_ttl_seconds: Option<u64>,
    cookie_max_age_days: Option<u64>,
    cookie_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_size_mb: Option<u64>,
    ttl_minutes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
