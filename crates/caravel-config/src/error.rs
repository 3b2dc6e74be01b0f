//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading startup configuration.
///
/// All of these are fatal: they abort startup before any tool process is
/// spawned or any network client is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required environment variable '{var}'")]
    MissingVar { var: &'static str },

    /// An environment variable could not be parsed.
    #[error("invalid value for '{var}': {reason}")]
    InvalidVar { var: &'static str, reason: String },

    /// A parsed value falls outside its permitted range.
    #[error("'{var}' value {value} is out of range: {constraint}")]
    OutOfRange {
        var: &'static str,
        value: String,
        constraint: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidVar {
            var,
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(
        var: &'static str,
        value: impl ToString,
        constraint: &'static str,
    ) -> Self {
        Self::OutOfRange {
            var,
            value: value.to_string(),
            constraint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_names_the_variable() {
        let err = ConfigError::MissingVar {
            var: "GEMINI_API_KEY",
        };
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn out_of_range_includes_constraint() {
        let err = ConfigError::out_of_range("CARAVEL_TOP_P", 1.5, "must be in (0, 1]");
        let msg = err.to_string();
        assert!(msg.contains("1.5"));
        assert!(msg.contains("(0, 1]"));
    }
}
