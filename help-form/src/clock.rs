use chrono::{DateTime, Utc};
use chrono_tz::{America::Sao_Paulo, Tz};
use std::{fmt::Display, time::Duration};
use tokio::{net::UdpSocket, time::timeout};
use tracing::{debug, warn};

pub const TIME_ZONE: Tz = Sao_Paulo;

const PACKET_LEN: usize = 48;
// LI 0, version 3, mode 3 (client).
const CLIENT_REQUEST_HEADER: u8 = 0x1b;
const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;
// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Reads wall-clock time from an NTP server, falling back to the local clock.
pub struct NtpClock {
    server: String,
    timeout: Duration,
}

pub struct ClockReading {
    pub time: DateTime<Tz>,
    /// Set when the server could not be used and `time` comes from the local clock.
    pub fallback: Option<NtpError>,
}

impl NtpClock {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }

    pub async fn now(&self) -> ClockReading {
        match self.query().await {
            Ok(time) => ClockReading {
                time: time.with_timezone(&TIME_ZONE),
                fallback: None,
            },
            Err(error) => {
                warn!("Could not synchronise with NTP server {}: {error}", self.server);
                ClockReading {
                    time: Utc::now().with_timezone(&TIME_ZONE),
                    fallback: Some(error),
                }
            }
        }
    }

    async fn query(&self) -> Result<DateTime<Utc>, NtpError> {
        // The bound covers name resolution as well as the exchange itself.
        timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| NtpError::Timeout)?
    }

    async fn exchange(&self) -> Result<DateTime<Utc>, NtpError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.server.as_str()).await?;
        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_REQUEST_HEADER;
        socket.send(&request).await?;

        let mut response = [0u8; PACKET_LEN];
        let len = socket.recv(&mut response).await?;
        debug!("Received {len} bytes from NTP server {}", self.server);
        parse_transmit_time(&response[..len])
    }
}

fn parse_transmit_time(packet: &[u8]) -> Result<DateTime<Utc>, NtpError> {
    if packet.len() < PACKET_LEN {
        return Err(NtpError::MalformedResponse);
    }
    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(NtpError::MalformedResponse);
    }
    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 {
        return Err(NtpError::MalformedResponse);
    }
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(i64::from(seconds) - NTP_UNIX_OFFSET, nanos)
        .ok_or(NtpError::MalformedResponse)
}

#[derive(Debug)]
pub enum NtpError {
    Io(std::io::Error),
    Timeout,
    MalformedResponse,
}

impl From<std::io::Error> for NtpError {
    fn from(error: std::io::Error) -> Self {
        NtpError::Io(error)
    }
}

impl Display for NtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NtpError::Io(error) => write!(f, "{error}"),
            NtpError::Timeout => write!(f, "timed out"),
            NtpError::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

impl std::error::Error for NtpError {}

#[cfg(test)]
mod tests {
    use super::{parse_transmit_time, NtpClock, NtpError};
    use chrono::{Datelike, Timelike, Weekday};
    use googletest::prelude::*;
    use std::time::{Duration, Instant};
    use test_support::fake_ntp::{FakeNtpServer, FAKE_NTP_UNIX_TIME};

    #[tokio::test]
    async fn reads_time_from_server_in_sao_paulo() -> Result<()> {
        FakeNtpServer::start();
        let clock = NtpClock::new(FakeNtpServer::address(), Duration::from_secs(2));

        let reading = clock.now().await;

        verify_that!(reading.fallback, none())?;
        verify_that!(reading.time.timestamp(), eq(FAKE_NTP_UNIX_TIME as i64))?;
        verify_that!(reading.time.weekday(), eq(Weekday::Mon))?;
        verify_that!(reading.time.hour(), eq(6))
    }

    #[tokio::test]
    async fn falls_back_to_local_clock_when_server_is_unreachable() -> Result<()> {
        let clock = NtpClock::new("127.0.0.1:9", Duration::from_millis(300));
        let before = chrono::Utc::now().timestamp();

        let reading = clock.now().await;

        verify_that!(reading.fallback, some(anything()))?;
        verify_that!(reading.time.timestamp(), ge(before))
    }

    #[tokio::test]
    async fn gives_up_on_silent_server_within_timeout() -> Result<()> {
        // Bound but never read, so requests go unanswered.
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
        let clock = NtpClock::new(silent.local_addr()?.to_string(), Duration::from_millis(200));
        let started = Instant::now();

        let reading = clock.now().await;

        verify_that!(
            reading.fallback,
            some(predicate(|e: &NtpError| matches!(e, NtpError::Timeout)))
        )?;
        verify_that!(started.elapsed(), lt(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn falls_back_on_malformed_reply() -> Result<()> {
        FakeNtpServer::start_malformed();
        let clock = NtpClock::new(FakeNtpServer::malformed_address(), Duration::from_secs(2));

        let reading = clock.now().await;

        verify_that!(
            reading.fallback,
            some(predicate(|e: &NtpError| matches!(e, NtpError::MalformedResponse)))
        )
    }

    #[test]
    fn rejects_client_mode_packets() -> Result<()> {
        let mut packet = [0u8; 48];
        packet[0] = 0x1b;
        packet[40] = 0xe9;

        verify_that!(
            parse_transmit_time(&packet),
            err(predicate(|e: &NtpError| matches!(e, NtpError::MalformedResponse)))
        )
    }
}
