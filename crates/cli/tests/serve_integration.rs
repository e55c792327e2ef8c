//! Integration tests for the `rideshare serve` HTTP API.
//!
//! Each test seeds a SQLite file through the CLI, starts the server as a
//! child process on a unique port, and talks plain HTTP/1.1 to it.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Once;
use std::time::Duration;

use tempfile::TempDir;

static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: Once = Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 30000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const FIXTURE: &str = r#"{
    "rides": [{"id": "R1", "passenger_id": "P1", "price": "20.00"}],
    "drivers": [
        {"id": "D1", "status": "approved"},
        {"id": "D2", "status": "approved"}
    ]
}"#;

/// Kills the server when the test ends, pass or fail.
struct Server {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn rideshare(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rideshare"));
    cmd.current_dir(dir)
        .env_remove("RIDESHARE_DB")
        .env_remove("RIDESHARE_PORT")
        .env_remove("RIDESHARE_RATE_LIMIT")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(dir.join("rideshare.toml"));
    cmd
}

fn start_server(rate_limit: u64) -> Server {
    let dir = TempDir::new().unwrap();
    let config = format!(
        "[server]\nrate_limit = {rate_limit}\n\n[storage]\nbackend = \"sqlite\"\npath = \"{}\"\n",
        dir.path().join("rides.db").display()
    );
    std::fs::write(dir.path().join("rideshare.toml"), config).unwrap();
    std::fs::write(dir.path().join("fixture.json"), FIXTURE).unwrap();

    let status = rideshare(dir.path())
        .args(["seed", "fixture.json"])
        .stdout(Stdio::null())
        .status()
        .expect("failed to run seed");
    assert!(status.success());

    let port = next_port();
    let child = rideshare(dir.path())
        .args(["serve", "--port", &port.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start rideshare serve");

    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _dir: dir,
    }
}

fn request(port: u16, method: &str, path: &str, body: Option<&str>) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost:{port}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let (head, payload) = response.split_once("\r\n\r\n").unwrap_or((response.as_str(), ""));
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let payload = if head.to_ascii_lowercase().contains("transfer-encoding: chunked") {
        decode_chunked(payload)
    } else {
        payload.to_string()
    };
    let json = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn decode_chunked(mut data: &str) -> String {
    let mut out = String::new();
    while let Some(line_end) = data.find("\r\n") {
        let size = match usize::from_str_radix(data[..line_end].trim(), 16) {
            Ok(0) | Err(_) => break,
            Ok(size) => size,
        };
        let start = line_end + 2;
        let end = (start + size).min(data.len());
        out.push_str(&data[start..end]);
        data = data.get(end + 2..).unwrap_or("");
    }
    out
}

#[test]
fn health_is_ok() {
    let server = start_server(100);
    let (status, body) = request(server.port, "GET", "/health", None);
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[test]
fn unknown_ride_is_404_with_code() {
    let server = start_server(100);
    let (status, body) = request(server.port, "GET", "/rides/R404", None);
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["error"].as_str().unwrap().contains("R404"));
}

#[test]
fn accept_then_second_accept_is_not_eligible() {
    let server = start_server(100);
    let (status, body) = request(
        server.port,
        "GET",
        "/rides/R1/eligibility/D1",
        None,
    );
    assert_eq!(status, 200);
    assert_eq!(body["eligible"], true);

    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/driver-actions",
        Some(r#"{"driver_id": "D1", "action": "accept", "expected_version": 0}"#),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["result"], "transitioned");
    assert_eq!(body["ride"]["status"], "accepted");

    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/driver-actions",
        Some(r#"{"driver_id": "D2", "action": "accept"}"#),
    );
    assert_eq!(status, 422);
    assert_eq!(body["code"], "NOT_ELIGIBLE");

    let (status, body) = request(server.port, "GET", "/rides/R1/history", None);
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[test]
fn stale_passenger_cancel_is_409() {
    let server = start_server(100);
    request(
        server.port,
        "POST",
        "/rides/R1/driver-actions",
        Some(r#"{"driver_id": "D1", "action": "accept"}"#),
    );
    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/passenger-cancel",
        Some(r#"{"passenger_id": "P1", "expected_version": 0}"#),
    );
    assert_eq!(status, 409);
    assert_eq!(body["code"], "CONCURRENT_MODIFICATION");
}

#[test]
fn admin_actions_are_checked_and_listed() {
    let server = start_server(100);
    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/admin-actions",
        Some(r#"{"admin_id": "adm-1", "role": "support", "reason": "swap", "action": "reassign_driver", "new_driver_id": "D2"}"#),
    );
    assert_eq!(status, 403);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/admin-actions",
        Some(r#"{"admin_id": "adm-1", "role": "admin", "reason": "   ", "action": "cancel"}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(body["code"], "VALIDATION");

    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/admin-actions",
        Some(r#"{"admin_id": "adm-1", "role": "admin", "reason": "fraud", "action": "cancel"}"#),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["ride"]["status"], "cancelled_by_admin");

    let (status, body) = request(
        server.port,
        "POST",
        "/rides/R1/admin-actions",
        Some(r#"{"admin_id": "adm-1", "role": "admin", "reason": "again", "action": "cancel"}"#),
    );
    assert_eq!(status, 409);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, body) = request(server.port, "GET", "/admin-actions?admin_id=adm-1", None);
    assert_eq!(status, 200);
    let actions = body.as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["reason"], "fraud");
}

#[test]
fn rate_limit_returns_429() {
    let server = start_server(2);
    assert_eq!(request(server.port, "GET", "/health", None).0, 200);
    assert_eq!(request(server.port, "GET", "/health", None).0, 200);
    let (status, body) = request(server.port, "GET", "/health", None);
    assert_eq!(status, 429);
    assert!(body["retry_after"].as_u64().is_some());
}
