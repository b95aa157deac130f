use anyhow::{Context, Result};
use dotenvy::dotenv;
use extraction::SecretString;
use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::GPT_4O_MINI;

/// Ten years; keeps `chrono::Duration::hours` well inside its range.
const MAX_JOB_TTL_HOURS: i64 = 87_600;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub request_timeout: Duration,

    pub openai_api_key: SecretString,
    pub openai_base_url: String,
    pub openai_model: String,
    pub llm_timeout: Duration,
    pub llm_max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
    pub max_model_input_bytes: usize,

    pub dom_timeout: Duration,
    pub min_content_chars: usize,
    pub headless_render_url: Option<String>,
    pub headless_render_token: Option<SecretString>,
    pub headless_pool_size: usize,
    pub headless_acquire_timeout: Duration,
    pub headless_timeout: Duration,
    /// Fixed settle delay; network-idle settle when unset
    pub headless_settle: Option<Duration>,

    pub schema_fetch_timeout: Duration,
    pub schema_cache_ttl: Duration,

    pub job_ttl_hours: i64,
    pub job_soft_target: Duration,
    pub job_hard_cutoff: Duration,
    pub sweep_interval: Duration,

    pub ssrf_resolve_dns: bool,
    pub ssrf_allowed_hosts: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: var_or("PORT", 8080)?,
            database_url: optional("DATABASE_URL"),
            request_timeout: Duration::from_secs(var_or("REQUEST_TIMEOUT_SECS", 10)?),

            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?
                .into(),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: optional("OPENAI_MODEL").unwrap_or_else(|| GPT_4O_MINI.to_string()),
            llm_timeout: Duration::from_secs(var_or("LLM_TIMEOUT_SECS", 30)?),
            llm_max_attempts: var_or("LLM_MAX_ATTEMPTS", 3)?,
            backoff_initial: Duration::from_millis(var_or("BACKOFF_INITIAL_MS", 500)?),
            backoff_max: Duration::from_millis(var_or("BACKOFF_MAX_MS", 8000)?),
            backoff_multiplier: var_or("BACKOFF_MULTIPLIER", 2.0)?,
            max_model_input_bytes: var_or("MAX_MODEL_INPUT_BYTES", 100_000)?,

            dom_timeout: Duration::from_secs(var_or("DOM_TIMEOUT_SECS", 10)?),
            min_content_chars: var_or("MIN_CONTENT_CHARS", 100)?,
            headless_render_url: optional("HEADLESS_RENDER_URL"),
            headless_render_token: optional("HEADLESS_RENDER_TOKEN").map(SecretString::from),
            headless_pool_size: var_or("HEADLESS_POOL_SIZE", 5)?,
            headless_acquire_timeout: Duration::from_millis(var_or(
                "HEADLESS_ACQUIRE_TIMEOUT_MS",
                5000,
            )?),
            headless_timeout: Duration::from_secs(var_or("HEADLESS_TIMEOUT_SECS", 15)?),
            headless_settle: optional("HEADLESS_SETTLE_MS")
                .map(|v| parse_value::<u64>("HEADLESS_SETTLE_MS", &v))
                .transpose()?
                .map(Duration::from_millis),

            schema_fetch_timeout: Duration::from_secs(var_or("SCHEMA_FETCH_TIMEOUT_SECS", 10)?),
            schema_cache_ttl: Duration::from_secs(var_or("SCHEMA_CACHE_TTL_SECS", 300)?),

            job_ttl_hours: in_range(
                "JOB_TTL_HOURS",
                var_or("JOB_TTL_HOURS", 24)?,
                1..=MAX_JOB_TTL_HOURS,
            )?,
            job_soft_target: Duration::from_secs(var_or("JOB_SOFT_TARGET_SECS", 30)?),
            job_hard_cutoff: Duration::from_secs(var_or("JOB_HARD_CUTOFF_SECS", 60)?),
            sweep_interval: Duration::from_secs(var_or("SWEEP_INTERVAL_SECS", 3600)?),

            ssrf_resolve_dns: var_or("SSRF_RESOLVE_DNS", true)?,
            ssrf_allowed_hosts: optional("SSRF_ALLOWED_HOSTS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        })
    }
}

/// Non-empty value of `name`, if set.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(value) => parse_value(name, &value),
        None => Ok(default),
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", name, value))
}

fn in_range(name: &str, value: i64, range: RangeInclusive<i64>) -> Result<i64> {
    if range.contains(&value) {
        return Ok(value);
    }
    Err(anyhow::anyhow!(
        "must be between {} and {}",
        range.start(),
        range.end()
    ))
    .with_context(|| format!("{} has an invalid value: {:?}", name, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
