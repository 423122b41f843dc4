use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Cloud project identifier (`GOOGLE_CLOUD_PROJECT`, or metadata server on GCE)
    pub project_id: Option<String>,
    pub server: ServerConfig,
    pub fanout: FanoutConfig,
    pub access_log: AccessLogConfig,
    pub scheduler: SchedulerConfig,
    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Downstream services queried by `/hello`, in response order
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub targets: Vec<String>,
    /// Timeout applied to each outbound call
    pub request_timeout_seconds: u64,
    /// Deadline for the whole fan-out, all targets included
    pub deadline_seconds: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            request_timeout_seconds: 10,
            deadline_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/access_log.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub base_url: String,
    /// Static bearer token; the metadata server is asked for one when unset
    pub access_token: Option<String>,
    pub metadata_url: String,
    pub timeout_seconds: u64,
    /// Time a job name stays locked after a successful delete
    pub cooldown_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloudscheduler.googleapis.com".to_string(),
            access_token: None,
            metadata_url: "http://metadata.google.internal".to_string(),
            timeout_seconds: 30,
            cooldown_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Probability that a root span is sampled (0.0 - 1.0)
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { sample_ratio: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

/// Load configuration from an optional TOML file layered with environment variables
///
/// Precedence, lowest first:
/// 1. built-in defaults
/// 2. the TOML file at `path` (skipped when missing)
/// 3. `FANOUT_GATEWAY__SECTION__KEY` variables (`FANOUT_GATEWAY__FANOUT__TARGETS` is comma separated)
/// 4. the platform variables `PORT` and `GOOGLE_CLOUD_PROJECT`
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("FANOUT_GATEWAY")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fanout.targets")
                .try_parsing(true),
        )
        .set_override_option("server.port", std::env::var("PORT").ok())?
        .set_override_option("project_id", std::env::var("GOOGLE_CLOUD_PROJECT").ok())?
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.fanout.targets.is_empty() {
        anyhow::bail!("At least one fan-out target must be configured");
    }

    for target in &cfg.fanout.targets {
        let parsed = url::Url::parse(target)
            .map_err(|e| anyhow::anyhow!("Fan-out target '{}' is not a valid URL: {}", target, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Fan-out target '{}' must use http or https", target);
        }
    }

    if cfg.fanout.request_timeout_seconds == 0 || cfg.fanout.deadline_seconds == 0 {
        anyhow::bail!("Fan-out timeouts must be greater than zero");
    }

    if cfg.scheduler.timeout_seconds == 0 {
        anyhow::bail!("Scheduler timeout must be greater than zero");
    }

    if !(0.0..=1.0).contains(&cfg.tracing.sample_ratio) {
        anyhow::bail!(
            "tracing.sample_ratio must be between 0.0 and 1.0, got {}",
            cfg.tracing.sample_ratio
        );
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid log format '{}', expected 'text' or 'json'", other),
    }

    Ok(())
}
