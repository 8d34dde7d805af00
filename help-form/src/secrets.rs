use async_trait::async_trait;
use std::fmt::Display;

pub const EMAIL_USER: &str = "EMAIL_USER";
pub const EMAIL_PASSWORD: &str = "EMAIL_PASSWORD";
pub const RECIPIENT_EMAIL: &str = "RECIPIENT_EMAIL";
pub const FORM_PASSWORD: &str = "FORM_PASSWORD";

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn open() -> Self
    where
        Self: Sized;

    async fn get_secret(&self, name: &'static str) -> Result<String, EnvironmentError>;
}

/// Reads secrets from the process environment, seeded from a `.env` file when one exists.
#[derive(Clone)]
pub struct EnvSecretRepository;

#[async_trait]
impl SecretRepository for EnvSecretRepository {
    async fn open() -> Self {
        if let Err(error) = dotenvy::dotenv() {
            if !error.not_found() {
                tracing::warn!("Could not load .env file: {error}");
            }
        }
        Self
    }

    async fn get_secret(&self, name: &'static str) -> Result<String, EnvironmentError> {
        std::env::var(name).map_err(|_| EnvironmentError::MissingSecret(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    MissingSecret(&'static str),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::MissingSecret(key) => write!(f, "Missing secret {key}"),
        }
    }
}

impl std::error::Error for EnvironmentError {}
