use std::{borrow::Cow, time::Duration};

const BIND_ADDRESS: &str = "0.0.0.0:8501";
const SMTP_URL: &str = "smtps://smtp.gmail.com:465";
const NTP_SERVER: &str = "pool.ntp.br:123";
const PUBLIC_IP_URL: &str = "https://api.ipify.org?format=json";

pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoints the service talks to. Credentials are not part of this; see `secrets`.
#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_address: String,
    pub smtp_url: String,
    pub ntp_server: String,
    pub public_ip_url: String,
    pub network_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("BIND_ADDRESS", BIND_ADDRESS).into_owned(),
            smtp_url: env_or("SMTP_URL", SMTP_URL).into_owned(),
            ntp_server: env_or("NTP_SERVER", NTP_SERVER).into_owned(),
            public_ip_url: env_or("PUBLIC_IP_URL", PUBLIC_IP_URL).into_owned(),
            network_timeout: NETWORK_TIMEOUT,
        }
    }
}

fn env_or(key: &str, default: &'static str) -> Cow<'static, str> {
    std::env::var(key)
        .map(Cow::Owned)
        .unwrap_or(default.into())
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use googletest::prelude::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn falls_back_to_defaults() -> Result<()> {
        std::env::remove_var("SMTP_URL");
        std::env::remove_var("NTP_SERVER");

        let settings = Settings::from_env();

        verify_that!(settings.smtp_url, eq("smtps://smtp.gmail.com:465"))?;
        verify_that!(settings.ntp_server, eq("pool.ntp.br:123"))
    }

    #[test]
    #[serial]
    fn reads_overrides_from_environment() -> Result<()> {
        std::env::set_var("PUBLIC_IP_URL", "http://localhost:1234/ip");

        let settings = Settings::from_env();
        std::env::remove_var("PUBLIC_IP_URL");

        verify_that!(settings.public_ip_url, eq("http://localhost:1234/ip"))
    }
}
