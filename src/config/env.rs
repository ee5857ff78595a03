//! The dev/prod environment flag
//!
//! Read once at startup and handed to every task at construction time.

use crate::error::{ConfigError, ConfigResult};
use std::fmt;
use std::path::Path;

/// Build environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Unminified output with source maps
    #[default]
    Dev,
    /// Minified output
    Prod,
}

impl Environment {
    /// Parse an environment value; empty means dev
    pub fn parse(var: &str, value: &str) -> ConfigResult<Self> {
        match value.trim() {
            "" | "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(ConfigError::InvalidEnvironment {
                var: var.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Read the flag from the process environment after loading `dotenv`
    ///
    /// Variables already set in the process win over the file. A missing
    /// file is fine; an unreadable or malformed one is an error.
    pub fn from_env(var: &str, dotenv: &Path) -> ConfigResult<Self> {
        match dotenvy::from_path(dotenv) {
            Ok(()) => {}
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(ConfigError::Dotenv {
                    path: dotenv.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
        let value = std::env::var(var).unwrap_or_default();
        Self::parse(var, &value)
    }

    pub fn is_prod(self) -> bool {
        self == Environment::Prod
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_known_values() {
        assert_eq!(Environment::parse("NODE_ENV", "").unwrap(), Environment::Dev);
        assert_eq!(Environment::parse("NODE_ENV", "dev").unwrap(), Environment::Dev);
        assert_eq!(
            Environment::parse("NODE_ENV", "production").unwrap(),
            Environment::Prod
        );
        assert!(Environment::parse("NODE_ENV", " prod ").unwrap().is_prod());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let result = Environment::parse("NODE_ENV", "staging");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvironment { ref value, .. }) if value == "staging"
        ));
    }

    #[test]
    fn test_from_env_reads_variable() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("PIPEWORK_TEST_ENV_FLAG", "prod");
        assert_eq!(
            Environment::from_env("PIPEWORK_TEST_ENV_FLAG", &temp.path().join(".env")).unwrap(),
            Environment::Prod
        );
        std::env::remove_var("PIPEWORK_TEST_ENV_FLAG");
    }

    #[test]
    fn test_from_env_loads_dotenv_file() {
        let temp = TempDir::new().unwrap();
        let dotenv = temp.path().join(".env");
        fs::write(&dotenv, "# build settings\nPIPEWORK_TEST_DOTENV_FLAG=production\n").unwrap();

        assert_eq!(
            Environment::from_env("PIPEWORK_TEST_DOTENV_FLAG", &dotenv).unwrap(),
            Environment::Prod
        );
        std::env::remove_var("PIPEWORK_TEST_DOTENV_FLAG");
    }

    #[test]
    fn test_malformed_dotenv_is_an_error() {
        let temp = TempDir::new().unwrap();
        let dotenv = temp.path().join(".env");
        fs::write(&dotenv, "BAD LINE WITHOUT EQUALS\nPIPEWORK_TEST_BAD_DOTENV=prod\n").unwrap();

        let result = Environment::from_env("PIPEWORK_TEST_BAD_DOTENV", &dotenv);
        assert!(matches!(
            result,
            Err(ConfigError::Dotenv { ref path, .. }) if *path == dotenv
        ));
        assert!(std::env::var("PIPEWORK_TEST_BAD_DOTENV").is_err());
    }
}
