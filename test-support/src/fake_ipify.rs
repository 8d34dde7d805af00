use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Once;

pub const IPIFY_PORT: u16 = 5284;
pub const FAKE_PUBLIC_IP: &str = "203.0.113.7";

const IP_PATH: &str = "/ip";
const BROKEN_PATH: &str = "/broken";
const GARBLED_PATH: &str = "/garbled";

/// Stand-in for the public IP echo service. One instance serves every test in the binary.
pub struct FakeIpify;

impl FakeIpify {
    pub fn start() {
        static STARTED: Once = Once::new();
        STARTED.call_once(|| {
            // Bound before returning so the first request cannot race the server thread.
            let listener = std::net::TcpListener::bind(format!("127.0.0.1:{IPIFY_PORT}")).unwrap();
            listener.set_nonblocking(true).unwrap();
            std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                    let app = Router::new()
                        .route(IP_PATH, get(ip))
                        .route(BROKEN_PATH, get(broken))
                        .route(GARBLED_PATH, get(garbled));
                    let _ = axum::serve(listener, app).await;
                });
            });
        });
    }

    pub fn url() -> String {
        format!("http://127.0.0.1:{IPIFY_PORT}{IP_PATH}?format=json")
    }

    pub fn failing_url() -> String {
        format!("http://127.0.0.1:{IPIFY_PORT}{BROKEN_PATH}")
    }

    pub fn garbled_url() -> String {
        format!("http://127.0.0.1:{IPIFY_PORT}{GARBLED_PATH}")
    }
}

async fn ip() -> Json<Value> {
    Json(json!({ "ip": FAKE_PUBLIC_IP }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

async fn garbled() -> &'static str {
    "Invalid response"
}
