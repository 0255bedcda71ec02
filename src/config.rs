use std::{path::PathBuf, time::Duration};

use crate::quiz::{
    ai_helper::{GradingMode, Provider, UnknownProvider},
    session::Pacing,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a number of milliseconds, got '{value}'")]
    InvalidDelay { var: &'static str, value: String },
    #[error("LLM_PROVIDER: {0}")]
    Provider(#[from] UnknownProvider),
    #[error("GRADING_MODE must be 'assisted' or 'local', got '{0}'")]
    GradingMode(String),
}

/// Process-wide settings read from the environment (and `.env`).
/// The bot token is read separately by `Bot::from_env`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub provider: Provider,
    pub data_dir: PathBuf,
    pub dialogue_db: String,
    pub pacing: Pacing,
    pub grading: GradingMode,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Pacing::default();

        let delay = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match var(name) {
                None => Ok(default),
                Some(value) => value
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidDelay { var: name, value }),
            }
        };

        let provider = match var("LLM_PROVIDER") {
            Some(name) => name.parse::<Provider>()?,
            None => Provider::default(),
        };

        let grading = match var("GRADING_MODE").as_deref() {
            None | Some("assisted") => GradingMode::Assisted,
            Some("local") => GradingMode::LocalOnly,
            Some(other) => return Err(ConfigError::GradingMode(other.to_string())),
        };

        Ok(Self {
            api_key: var("LLM_API_KEY"),
            provider,
            data_dir: var("DATA_DIR").unwrap_or_else(|| "data/progress".to_string()).into(),
            dialogue_db: var("DIALOGUE_DB").unwrap_or_else(|| "db.sqlite".to_string()),
            pacing: Pacing {
                feedback: delay("FEEDBACK_DELAY_MS", defaults.feedback)?,
                advance: delay("ADVANCE_DELAY_MS", defaults.advance)?,
            },
            grading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.pacing, Pacing::default());
        assert_eq!(config.grading, GradingMode::Assisted);
        assert_eq!(config.dialogue_db, "db.sqlite");
    }

    #[test]
    fn values_are_read() {
        let config = config_from(&[
            ("LLM_API_KEY", "sk-test"),
            ("LLM_PROVIDER", "anthropic"),
            ("FEEDBACK_DELAY_MS", "0"),
            ("ADVANCE_DELAY_MS", "25"),
            ("GRADING_MODE", "local"),
            ("DATA_DIR", "/tmp/drills"),
        ])
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.pacing.feedback, Duration::ZERO);
        assert_eq!(config.pacing.advance, Duration::from_millis(25));
        assert_eq!(config.grading, GradingMode::LocalOnly);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/drills"));
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            config_from(&[("FEEDBACK_DELAY_MS", "soon")]),
            Err(ConfigError::InvalidDelay {
                var: "FEEDBACK_DELAY_MS",
                value: "soon".to_string()
            })
        );
        assert!(matches!(config_from(&[("LLM_PROVIDER", "gemini")]), Err(ConfigError::Provider(_))));
        assert!(matches!(config_from(&[("GRADING_MODE", "fuzzy")]), Err(ConfigError::GradingMode(_))));
    }
}
