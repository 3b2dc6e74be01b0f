//! Startup settings, read from the process environment and validated
//! before anything else is constructed.

use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable holding the reasoning-engine credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

const MODEL_VAR: &str = "CARAVEL_MODEL";
const TEMPERATURE_VAR: &str = "CARAVEL_TEMPERATURE";
const TOP_P_VAR: &str = "CARAVEL_TOP_P";
const TOP_K_VAR: &str = "CARAVEL_TOP_K";
const MAX_ATTEMPTS_VAR: &str = "CARAVEL_RETRY_MAX_ATTEMPTS";
const BACKOFF_BASE_VAR: &str = "CARAVEL_RETRY_BACKOFF_BASE";
const INITIAL_DELAY_VAR: &str = "CARAVEL_RETRY_INITIAL_DELAY_MS";
const MAX_DELAY_VAR: &str = "CARAVEL_RETRY_MAX_DELAY_MS";
const JITTER_VAR: &str = "CARAVEL_RETRY_JITTER";
const STATUS_CODES_VAR: &str = "CARAVEL_RETRY_STATUS_CODES";
const TOOL_COMMAND_VAR: &str = "CARAVEL_TOOL_COMMAND";
const TOOL_ARGS_VAR: &str = "CARAVEL_TOOL_ARGS";
const LAUNCH_TIMEOUT_VAR: &str = "CARAVEL_LAUNCH_TIMEOUT_SECS";
const CALL_TIMEOUT_VAR: &str = "CARAVEL_CALL_TIMEOUT_SECS";

/// Reasoning-engine settings: credential, model, fixed sampling parameters.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API key for the reasoning engine. Required.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling parameter.
    pub top_p: f32,
    /// Top-k sampling parameter.
    pub top_k: u32,
}

/// Retry/backoff settings for outbound model requests.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts per request, at least 1.
    pub max_attempts: u32,
    /// Exponential backoff base multiplier.
    pub backoff_base: f64,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Optional cap on the unjittered delay.
    pub max_delay: Option<Duration>,
    /// Jitter fraction in `[0, 1)`.
    pub jitter: f64,
    /// HTTP status codes that are worth retrying.
    pub retryable_status_codes: Vec<u16>,
}

/// External tool process settings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Bound on spawn + protocol handshake.
    pub launch_timeout: Duration,
    /// Bound on a single tool invocation.
    pub call_timeout: Duration,
}

/// Validated startup configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,
    pub retry: RetrySettings,
    pub tool: ToolSettings,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// The credential is required; everything else falls back to the
    /// defaults the original deployment ran with.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar { var: API_KEY_VAR })?;

        let llm = LlmSettings {
            api_key,
            model: lookup(MODEL_VAR).unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            temperature: parse_or(&lookup, TEMPERATURE_VAR, 0.05)?,
            top_p: parse_or(&lookup, TOP_P_VAR, 0.98)?,
            top_k: parse_or(&lookup, TOP_K_VAR, 5)?,
        };

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::out_of_range(
                TEMPERATURE_VAR,
                llm.temperature,
                "must be in [0, 2]",
            ));
        }
        if !(llm.top_p > 0.0 && llm.top_p <= 1.0) {
            return Err(ConfigError::out_of_range(
                TOP_P_VAR,
                llm.top_p,
                "must be in (0, 1]",
            ));
        }
        if llm.top_k == 0 {
            return Err(ConfigError::out_of_range(TOP_K_VAR, 0, "must be at least 1"));
        }

        let retry = RetrySettings {
            max_attempts: parse_or(&lookup, MAX_ATTEMPTS_VAR, 5)?,
            backoff_base: parse_or(&lookup, BACKOFF_BASE_VAR, 7.0)?,
            initial_delay: Duration::from_millis(parse_or(&lookup, INITIAL_DELAY_VAR, 1_000)?),
            max_delay: parse_opt::<u64>(&lookup, MAX_DELAY_VAR)?.map(Duration::from_millis),
            jitter: parse_or(&lookup, JITTER_VAR, 0.0)?,
            retryable_status_codes: parse_status_codes(&lookup)?,
        };

        if retry.max_attempts == 0 {
            return Err(ConfigError::out_of_range(
                MAX_ATTEMPTS_VAR,
                0,
                "must be at least 1",
            ));
        }
        if retry.backoff_base < 1.0 {
            return Err(ConfigError::out_of_range(
                BACKOFF_BASE_VAR,
                retry.backoff_base,
                "must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&retry.jitter) {
            return Err(ConfigError::out_of_range(
                JITTER_VAR,
                retry.jitter,
                "must be in [0, 1)",
            ));
        }

        let tool = ToolSettings {
            command: lookup(TOOL_COMMAND_VAR).unwrap_or_else(|| "npx".to_string()),
            args: lookup(TOOL_ARGS_VAR)
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| vec!["@playwright/mcp@latest".to_string()]),
            launch_timeout: Duration::from_secs(parse_or(&lookup, LAUNCH_TIMEOUT_VAR, 60)?),
            call_timeout: Duration::from_secs(parse_or(&lookup, CALL_TIMEOUT_VAR, 30)?),
        };

        if tool.command.trim().is_empty() {
            return Err(ConfigError::invalid(TOOL_COMMAND_VAR, "must not be empty"));
        }

        Ok(Self { llm, retry, tool })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(var, format!("{e}"))),
        None => Ok(default),
    }
}

fn parse_opt<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(var, format!("{e}"))),
        None => Ok(None),
    }
}

fn parse_status_codes(lookup: &impl Fn(&str) -> Option<String>) -> Result<Vec<u16>> {
    let raw = match lookup(STATUS_CODES_VAR) {
        Some(raw) => raw,
        None => return Ok(vec![429, 500, 503, 504]),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e| ConfigError::invalid(STATUS_CODES_VAR, format!("'{s}': {e}")))
        })
        .collect()
}
