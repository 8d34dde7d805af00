mod captcha;
mod clock;
mod config;
mod controller;
mod date_format;
mod mailer;
mod page;
mod public_ip;
mod routes;
mod secrets;
mod session;
mod validation;

use anyhow::Context;
use config::Settings;
use controller::FormController;
use routes::{router, AppState};
use secrets::{EnvSecretRepository, SecretRepository};
use session::SessionStore;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // Loads `.env` before any setting is read.
    let secrets_repository = EnvSecretRepository::open().await;
    let settings = Settings::from_env();

    let controller = FormController::new(secrets_repository, &settings);
    let app = router(AppState::new(controller, SessionStore::new()));

    let listener = TcpListener::bind(settings.bind_address.as_str())
        .await
        .with_context(|| format!("Unable to bind to {}", settings.bind_address))?;
    info!("Help form listening on {}", settings.bind_address);
    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")
}
