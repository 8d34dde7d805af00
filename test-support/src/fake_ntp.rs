use log::debug;
use std::{net::UdpSocket, sync::Once};

pub const NTP_PORT: u16 = 5123;
pub const MALFORMED_NTP_PORT: u16 = 5124;

/// 2024-03-04T09:05:00Z, a Monday.
pub const FAKE_NTP_UNIX_TIME: u64 = 1_709_543_100;

const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Answers every SNTP request with [`FAKE_NTP_UNIX_TIME`].
pub struct FakeNtpServer;

impl FakeNtpServer {
    pub fn start() {
        static STARTED: Once = Once::new();
        STARTED.call_once(|| serve(NTP_PORT, reply_packet()));
    }

    /// Starts a server whose replies are too short to carry a transmit timestamp.
    pub fn start_malformed() {
        static STARTED: Once = Once::new();
        STARTED.call_once(|| serve(MALFORMED_NTP_PORT, vec![0x1c; 12]));
    }

    pub fn address() -> String {
        format!("127.0.0.1:{NTP_PORT}")
    }

    pub fn malformed_address() -> String {
        format!("127.0.0.1:{MALFORMED_NTP_PORT}")
    }
}

fn serve(port: u16, reply: Vec<u8>) {
    let socket = UdpSocket::bind(format!("127.0.0.1:{port}")).unwrap();
    std::thread::spawn(move || {
        let mut buf = [0u8; 48];
        while let Ok((len, peer)) = socket.recv_from(&mut buf) {
            debug!("Fake NTP got {len} bytes from {peer}");
            let _ = socket.send_to(&reply, peer);
        }
    });
}

fn reply_packet() -> Vec<u8> {
    let mut packet = vec![0u8; 48];
    // LI 0, version 3, mode 4 (server).
    packet[0] = 0x1c;
    packet[1] = 2;
    let seconds = (FAKE_NTP_UNIX_TIME + NTP_UNIX_OFFSET) as u32;
    packet[40..44].copy_from_slice(&seconds.to_be_bytes());
    packet
}
