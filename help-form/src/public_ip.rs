use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const UNAVAILABLE_IP: &str = "IP não disponível";

pub struct PublicIpResolver {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

impl PublicIpResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|error| {
                warn!("Could not configure HTTP client timeout, using defaults: {error}");
                Client::new()
            });
        Self {
            client,
            url: url.into(),
        }
    }

    /// Returns the public IP address, or [`UNAVAILABLE_IP`] on any failure.
    pub async fn resolve(&self) -> String {
        match self.fetch().await {
            Ok(ip) => ip,
            Err(error) => {
                warn!("Could not resolve public IP from {}: {error}", self.url);
                UNAVAILABLE_IP.into()
            }
        }
    }

    async fn fetch(&self) -> Result<String, PublicIpError> {
        let response = self.client.get(&self.url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(PublicIpError::UnexpectedStatus(response.status()));
        }
        let body: IpifyResponse = response.json().await?;
        Ok(body.ip)
    }
}

#[derive(Debug)]
enum PublicIpError {
    Request(reqwest::Error),
    UnexpectedStatus(StatusCode),
}

impl From<reqwest::Error> for PublicIpError {
    fn from(error: reqwest::Error) -> Self {
        PublicIpError::Request(error)
    }
}

impl std::fmt::Display for PublicIpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublicIpError::Request(error) => write!(f, "Request error: {error}"),
            PublicIpError::UnexpectedStatus(status) => write!(f, "Unexpected status {status}"),
        }
    }
}

impl std::error::Error for PublicIpError {}
