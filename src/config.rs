use crate::constants::*;
use std::{env, path::PathBuf, str::FromStr};
use thiserror::Error;

/// How widely a budget category name must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetCategoryScope {
    /// One budget per category name across every user.
    #[default]
    Global,
    /// One budget per category name for each user.
    PerUser,
}

impl FromStr for BudgetCategoryScope {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "user" | "per-user" | "per_user" => Ok(Self::PerUser),
            other => Err(ConfigError::InvalidBudgetScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub budget_scope: BudgetCategoryScope,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,
    #[error("Invalid JWT secret: must be at least {MIN_JWT_SECRET_LENGTH} bytes long")]
    InvalidJwtSecret,
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    #[error("Invalid budget category scope: {0} (expected `global` or `user`)")]
    InvalidBudgetScope(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup("SERVER_PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
        let data_path = lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());
        let upload_dir = lookup("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string());

        if port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidPort(port));
        }

        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::InvalidJwtSecret);
        }

        let budget_scope = match lookup("BUDGET_CATEGORY_SCOPE") {
            Some(value) => value.parse()?,
            None => BudgetCategoryScope::default(),
        };

        Ok(Config {
            host,
            port,
            data_path,
            upload_dir: PathBuf::from(upload_dir),
            jwt_secret,
            budget_scope,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
