//! Integration tests for the `wastetrack serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tempfile::NamedTempFile;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const CONFIG: &str = r#"
[[barangays]]
id = 1
name = "San Roque"
code = "SR"
municipality = "Nabua"
province = "Camarines Sur"

[[barangays]]
id = 2
name = "Angustia"
code = "AN"
municipality = "Nabua"
province = "Camarines Sur"

[[collectors]]
id = 10
username = "crew10"
full_name = "Crew Ten"
barangay_id = 1
"#;

const ADMIN: &[(&str, &str)] = &[("X-Actor-Id", "1"), ("X-Actor-Role", "admin")];
const REP: &[(&str, &str)] = &[
    ("X-Actor-Id", "2"),
    ("X-Actor-Role", "barangay"),
    ("X-Actor-Barangay", "1"),
];
const CREW: &[(&str, &str)] = &[("X-Actor-Id", "10"), ("X-Actor-Role", "collector")];

/// A running server plus the config file it was started with.
struct Server {
    child: Child,
    port: u16,
    _config: NamedTempFile,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

/// Helper: start `wastetrack serve` on a fresh port.
fn start_server(api_key: Option<&str>) -> Server {
    let port = next_port();
    let mut config = NamedTempFile::new().expect("temp config");
    config.write_all(CONFIG.as_bytes()).expect("write config");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wastetrack"));
    cmd.arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--config")
        .arg(config.path());
    cmd.env_remove("WASTETRACK_API_KEY");
    if let Some(key) = api_key {
        cmd.env("WASTETRACK_API_KEY", key);
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start wastetrack serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _config: config,
    }
}

/// Helper: send one HTTP request and return (status, body).
fn request(
    port: u16,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body = body.unwrap_or("");
    if !body.is_empty() {
        header_lines.push_str("Content-Type: application/json\r\n");
    }

    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        header_lines,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn get(port: u16, path: &str, headers: &[(&str, &str)]) -> (u16, serde_json::Value) {
    let (status, body) = request(port, "GET", path, headers, None);
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

fn post(port: u16, path: &str, headers: &[(&str, &str)], body: &str) -> (u16, serde_json::Value) {
    let (status, body) = request(port, "POST", path, headers, Some(body));
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked")
    {
        decode_chunked(&body)
    } else {
        body
    };

    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

fn register(port: u16, sorted: bool) -> String {
    let body = format!(
        r#"{{"waste_type":"recyclable","barangay_id":1,"is_sorted":{},"address":"Zone 3"}}"#,
        sorted
    );
    let (status, json) = post(port, "/api/items", REP, &body);
    assert_eq!(status, 201, "register failed: {}", json);
    json["item_id"].as_str().unwrap().to_string()
}

#[test]
fn health_returns_200_with_version() {
    let server = start_server(None);
    let (status, json) = get(server.port, "/health", &[]);
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[test]
fn unknown_route_returns_404() {
    let server = start_server(None);
    let (status, json) = get(server.port, "/api/nothing", ADMIN);
    assert_eq!(status, 404);
    assert_eq!(json["error"], "not found");
}

#[test]
fn missing_actor_headers_return_401() {
    let server = start_server(None);
    let (status, _) = get(server.port, "/api/dashboard", &[]);
    assert_eq!(status, 401);
}

#[test]
fn lifecycle_over_http() {
    let server = start_server(None);
    let port = server.port;

    let id = register(port, false);
    let (status, json) = get(port, &format!("/api/items/{}", id), ADMIN);
    assert_eq!(status, 200);
    assert_eq!(json["status"], "not_collected");
    assert_eq!(json["item_name"], "Recyclable Waste");

    let (status, json) = post(port, &format!("/api/items/{}/collect", id), CREW, "");
    assert_eq!(status, 409);
    assert_eq!(json["kind"], "state");

    let (status, json) = post(port, &format!("/api/items/{}/sort", id), REP, "");
    assert_eq!(status, 200);
    assert_eq!(json["item"]["status"], "pending_collection");

    let (status, json) = post(
        port,
        &format!("/api/items/{}/collect", id),
        CREW,
        r#"{"latitude":"13.40","longitude":"123.30"}"#,
    );
    assert_eq!(status, 200);
    assert_eq!(json["item"]["status"], "collected");
    assert_eq!(json["record"]["latitude"], 13.4);

    let (status, json) = post(port, &format!("/api/items/{}/confirm", id), REP, "");
    assert_eq!(status, 200);
    assert_eq!(json["item"]["client_confirmed"], true);

    let (status, json) = get(port, &format!("/api/items/{}/history", id), REP);
    assert_eq!(status, 200);
    let history = json["history"].as_array().unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0]["notes"], "Collection confirmed by client");
    assert_eq!(history[3]["notes"], "Waste item registered for collection");
}

#[test]
fn track_endpoint_reports_swapped_coordinates() {
    let server = start_server(None);
    let port = server.port;
    let id = register(port, true);

    let body = format!(
        r#"{{"item_id":"{}","status":"in_transit","location":"Depot","latitude":123.30,"longitude":13.40}}"#,
        id
    );
    let (status, json) = post(port, "/api/waste/track", CREW, &body);
    assert_eq!(status, 200, "{}", json);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "in_transit");
    assert_eq!(
        json["warning"],
        "Device coordinates looked swapped and were corrected"
    );

    let (_, json) = get(port, &format!("/api/items/{}/history", id), ADMIN);
    let latest = &json["history"][0];
    assert_eq!(latest["latitude"], 13.4);
    assert_eq!(latest["longitude"], 123.3);
    assert!(latest["notes"]
        .as_str()
        .unwrap()
        .ends_with("[COORD_ISSUE: swapped]"));
}

#[test]
fn representatives_are_forbidden_from_collecting() {
    let server = start_server(None);
    let id = register(server.port, true);
    let (status, json) = post(
        server.port,
        &format!("/api/items/{}/collect", id),
        REP,
        "",
    );
    assert_eq!(status, 403);
    assert_eq!(json["kind"], "permission");
}

#[test]
fn invalid_registration_returns_400() {
    let server = start_server(None);
    let (status, json) = post(
        server.port,
        "/api/items",
        REP,
        r#"{"waste_type":"plastic","barangay_id":1}"#,
    );
    assert_eq!(status, 400);
    assert_eq!(json["kind"], "validation");

    let (status, _) = post(server.port, "/api/items", REP, "{not json");
    assert_eq!(status, 400);
}

#[test]
fn collector_ping_and_presence() {
    let server = start_server(None);
    let port = server.port;

    let (status, json) = post(
        port,
        "/api/collectors/ping",
        CREW,
        r#"{"latitude":"abc","longitude":"123.3"}"#,
    );
    assert_eq!(status, 422);
    assert_eq!(json["result"], "rejected");

    let (status, json) = post(
        port,
        "/api/collectors/ping",
        CREW,
        r#"{"latitude":13.35,"longitude":123.31}"#,
    );
    assert_eq!(status, 200);
    assert_eq!(json["result"], "accepted");

    let (status, json) = get(port, "/api/barangays/1/collectors", REP);
    assert_eq!(status, 200);
    let collectors = json["collectors"].as_array().unwrap();
    assert_eq!(collectors.len(), 1);
    assert_eq!(collectors[0]["recency"], "live");

    let (status, _) = get(port, "/api/barangays/2/collectors", REP);
    assert_eq!(status, 403);
}

#[test]
fn queue_and_dashboard() {
    let server = start_server(None);
    let port = server.port;
    register(port, true);
    register(port, false);

    let (status, json) = get(port, "/api/queue", CREW);
    assert_eq!(status, 200);
    let queue = json["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["barangay_name"], "San Roque");

    let (status, json) = get(port, "/api/dashboard", ADMIN);
    assert_eq!(status, 200);
    assert_eq!(json["total"], 2);

    let (status, json) = get(port, "/api/items?status=bogus", ADMIN);
    assert_eq!(status, 400);
    assert!(json["error"].is_string());
}

#[test]
fn api_key_required_when_configured() {
    let server = start_server(Some("s3cret"));
    let port = server.port;

    let (status, _) = get(port, "/health", &[]);
    assert_eq!(status, 200);

    let (status, _) = get(port, "/api/dashboard", ADMIN);
    assert_eq!(status, 401);

    let mut headers = ADMIN.to_vec();
    headers.push(("Authorization", "Bearer wrong"));
    let (status, _) = get(port, "/api/dashboard", &headers);
    assert_eq!(status, 403);

    headers.pop();
    headers.push(("X-API-Key", "s3cret"));
    let (status, _) = get(port, "/api/dashboard", &headers);
    assert_eq!(status, 200);
}
