use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::{Path, PathBuf};

use crate::models::ValidatorKind;

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub settings: Settings,
    pub remote: RemoteConfig,
    pub directories: Directories,
    pub executables: Executables,
    pub labels: Labels,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Public URL of this service; hook targets are built from it.
    pub root_url: String,
    pub hook_secret: Secret<String>,
    pub client_id: String,
    pub cookie_name: String,
    pub session_ttl_days: i64,
    pub validators: Vec<String>,
    /// Service account used for one-shot validation of public repositories.
    pub service_account: Option<ServiceAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub username: String,
    pub password: Secret<String>,
}

/// Longest accepted session lifetime.
pub const MAX_SESSION_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub web_url: String,
    pub git_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directories {
    pub temp: PathBuf,
    pub results: PathBuf,
    pub tokens: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Executables {
    pub git: String,
    pub bids: String,
    pub nix: String,
    pub odml: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Labels {
    pub results_folder: String,
    pub results_file: String,
    pub results_badge: String,
    pub results_meta: String,
    pub validation_config_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub queue_size: usize,
    pub command_timeout_secs: u64,
    /// Fetch annexed file content after checkout.
    pub annex_content: bool,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            results_folder: "latest".to_string(),
            results_file: "results.json".to_string(),
            results_badge: "results.svg".to_string(),
            results_meta: "result.json".to_string(),
            validation_config_file: "ginvalidation.yaml".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_size: 64,
            command_timeout_secs: 1800,
            annex_content: true,
        }
    }
}

impl Directories {
    pub fn under(home: &Path) -> Self {
        Self {
            temp: home.join("tmp"),
            results: home.join("results"),
            tokens: home.join("tokens"),
        }
    }
}

impl ValidationConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let home = PathBuf::from(get_env("VALIDATION_HOME", Some("/data"), false)?);
        let defaults = WorkerConfig::default();
        let local_url = format!("http://localhost:{}", common.port);

        Ok(ValidationConfig {
            settings: Settings {
                root_url: get_env("ROOT_URL", Some(&local_url), is_prod)?,
                hook_secret: Secret::new(get_env("HOOK_SECRET", None, is_prod)?),
                client_id: get_env("CLIENT_ID", Some("gin-valid"), false)?,
                cookie_name: get_env("COOKIE_NAME", Some("gin-valid-session"), false)?,
                session_ttl_days: session_ttl(parse_env("SESSION_TTL_DAYS", 7)?)?,
                validators: get_env("VALIDATORS", Some("bids,nix,odml"), false)?
                    .split(',')
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty())
                    .collect(),
                service_account: service_account()?,
            },
            remote: RemoteConfig {
                web_url: get_env("GIN_WEB_URL", Some("https://gin.g-node.org"), is_prod)?,
                git_url: get_env("GIN_GIT_URL", Some("https://gin.g-node.org"), is_prod)?,
            },
            directories: Directories {
                temp: env_path("TEMP_DIR", home.join("tmp")),
                results: env_path("RESULTS_DIR", home.join("results")),
                tokens: env_path("TOKENS_DIR", home.join("tokens")),
            },
            executables: Executables {
                git: get_env("GIT_EXEC", Some("git"), false)?,
                bids: get_env("BIDS_EXEC", Some("bids-validator"), false)?,
                nix: get_env("NIX_EXEC", Some("nixio"), false)?,
                odml: get_env("ODML_EXEC", Some("odmlvalidate"), false)?,
            },
            labels: Labels::default(),
            worker: WorkerConfig {
                worker_count: parse_env("WORKER_COUNT", defaults.worker_count)?,
                queue_size: parse_env("QUEUE_SIZE", defaults.queue_size)?,
                command_timeout_secs: parse_env(
                    "COMMAND_TIMEOUT_SECS",
                    defaults.command_timeout_secs,
                )?,
                annex_content: parse_env("ANNEX_CONTENT", defaults.annex_content)?,
            },
            common,
        })
    }

    /// Configuration rooted at `home` with development defaults.
    pub fn with_home(home: &Path, hook_secret: &str) -> Self {
        let common = core_config::Config::default();
        ValidationConfig {
            settings: Settings {
                root_url: format!("http://localhost:{}", common.port),
                hook_secret: Secret::new(hook_secret.to_string()),
                client_id: "gin-valid".to_string(),
                cookie_name: "gin-valid-session".to_string(),
                session_ttl_days: 7,
                validators: ValidatorKind::ALL.iter().map(|v| v.to_string()).collect(),
                service_account: None,
            },
            remote: RemoteConfig {
                web_url: "http://localhost:3000".to_string(),
                git_url: "http://localhost:3000".to_string(),
            },
            directories: Directories::under(home),
            executables: Executables {
                git: "git".to_string(),
                bids: "bids-validator".to_string(),
                nix: "nixio".to_string(),
                odml: "odmlvalidate".to_string(),
            },
            labels: Labels::default(),
            worker: WorkerConfig::default(),
            common,
        }
    }

    /// Configured validators that this build knows how to run.
    pub fn supported_validators(&self) -> Vec<ValidatorKind> {
        let mut kinds = Vec::new();
        for name in &self.settings.validators {
            match name.parse::<ValidatorKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(e) => tracing::warn!(validator = %name, "Ignoring configured validator: {}", e),
            }
        }
        kinds
    }
}

fn session_ttl(days: i64) -> Result<i64, AppError> {
    if !(1..=MAX_SESSION_TTL_DAYS).contains(&days) {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "SESSION_TTL_DAYS must be between 1 and {}, got {}",
            MAX_SESSION_TTL_DAYS,
            days
        )));
    }
    Ok(days)
}

/// `GIN_USER` and `GIN_PASSWORD` together, or neither.
fn service_account() -> Result<Option<ServiceAccount>, AppError> {
    match (env::var("GIN_USER").ok(), env::var("GIN_PASSWORD").ok()) {
        (Some(username), Some(password)) => Ok(Some(ServiceAccount {
            username,
            password: Secret::new(password),
        })),
        (None, None) => Ok(None),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "GIN_USER and GIN_PASSWORD must be set together"
        ))),
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}
