//! Configuration for the Caravel orchestrator.
//!
//! All startup configuration is environment-sourced and validated up front:
//! the reasoning-engine credential and sampling parameters, the retry policy
//! for outbound model requests, and the external tool process command with
//! its timeouts. A [`ConfigError`] here is fatal — it aborts startup before
//! any tool process is spawned.

pub mod error;
pub mod settings;

pub use error::{ConfigError, Result};
pub use settings::{API_KEY_VAR, LlmSettings, RetrySettings, Settings, ToolSettings};
