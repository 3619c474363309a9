//! Integration tests for the `praxis serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests over a raw TCP socket, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

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

/// Kills the server when the test ends, pass or fail.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

/// Helper: start `praxis serve` on a fresh port with extra env vars.
fn start_server(env: &[(&str, &str)]) -> Server {
    let port = next_port();
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_praxis"));
    cmd.current_dir(workspace_root);
    cmd.arg("serve").arg("--port").arg(port.to_string());
    for var in ["PRAXIS_PORT", "PRAXIS_RATE_LIMIT", "PRAXIS_API_KEY"] {
        cmd.env_remove(var);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start praxis serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

/// Helper: send one HTTP request and return (status, parsed JSON body).
fn request(
    port: u16,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
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
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let (status, body) = parse_http_response(&response);
    let json = if body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body))
    };
    (status, json)
}

const FRONT_DESK: &[(&str, &str)] = &[("X-Actor-Id", "fd-1"), ("X-Actor-Role", "front_desk")];
const BILLING: &[(&str, &str)] = &[("X-Actor-Id", "bill-1"), ("X-Actor-Role", "billing")];

fn get(port: u16, path: &str) -> (u16, serde_json::Value) {
    request(port, "GET", path, &[], None)
}

fn create(port: u16, entity_type: &str, body: &str) -> serde_json::Value {
    let (status, json) = request(
        port,
        "POST",
        &format!("/entities/{}", entity_type),
        FRONT_DESK,
        Some(body),
    );
    assert_eq!(status, 201, "create failed: {}", json);
    json
}

fn transition(
    port: u16,
    entity_type: &str,
    id: &str,
    actor: &[(&str, &str)],
    body: &str,
) -> (u16, serde_json::Value) {
    request(
        port,
        "POST",
        &format!("/entities/{}/{}/transitions", entity_type, id),
        actor,
        Some(body),
    )
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status_line = headers.lines().next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = headers
        .to_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { decode_chunked(&body) } else { body };

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

// ──────────────────────────────────────────────
// Introspection
// ──────────────────────────────────────────────

#[test]
fn health_returns_200_with_version() {
    let server = start_server(&[]);
    let (status, json) = get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert!(json.get("version").is_some(), "version field must be present");
    assert_eq!(json["workflow"], "practice");
}

#[test]
fn workflows_lists_entity_types() {
    let server = start_server(&[]);
    let (status, json) = get(server.port, "/workflows");
    assert_eq!(status, 200);
    let types = json["entityTypes"].as_array().expect("entityTypes array");
    assert_eq!(types.len(), 5);
    assert_eq!(types[0]["name"], "Lead");
    assert_eq!(types[0]["terminal"], serde_json::json!(["CONVERTED", "LOST"]));
}

#[test]
fn rules_for_type_and_unknown_type() {
    let server = start_server(&[]);
    let (status, json) = get(server.port, "/workflows/Refund/rules");
    assert_eq!(status, 200);
    let rules = json["rules"].as_array().expect("rules array");
    assert_eq!(rules.len(), 3);
    assert_eq!(rules[0]["action"], "approve");

    let (status, json) = get(server.port, "/workflows/Invoice/rules");
    assert_eq!(status, 404);
    assert_eq!(json["kind"], "unknown_entity_type");
}

#[test]
fn not_found_returns_404() {
    let server = start_server(&[]);
    let (status, json) = get(server.port, "/nonexistent");
    assert_eq!(status, 404);
    assert_eq!(json["error"], "not found");
}

// ──────────────────────────────────────────────
// Entities and transitions
// ──────────────────────────────────────────────

#[test]
fn lead_contact_records_history() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", r#"{"payload": {"name": "Ada"}}"#);
    assert_eq!(lead["status"], "NEW");
    assert_eq!(lead["version"], 0);
    let id = lead["id"].as_str().unwrap();

    let (status, json) = transition(server.port, "Lead", id, FRONT_DESK, r#"{"action": "contact"}"#);
    assert_eq!(status, 200, "{}", json);
    assert_eq!(json["entity"]["status"], "CONTACTED");
    assert_eq!(json["transition"]["fromStatus"], "NEW");
    assert_eq!(json["transition"]["toStatus"], "CONTACTED");

    let (status, json) = get(server.port, &format!("/entities/Lead/{}/transitions", id));
    assert_eq!(status, 200);
    let history = json["transitions"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["actorRole"], "front_desk");

    let (status, json) = get(server.port, &format!("/entities/Lead/{}", id));
    assert_eq!(status, 200);
    assert_eq!(json["status"], "CONTACTED");
    assert_eq!(json["payload"]["name"], "Ada");
}

#[test]
fn terminal_lead_returns_409() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", "");
    let id = lead["id"].as_str().unwrap();
    let (status, _) = transition(
        server.port,
        "Lead",
        id,
        FRONT_DESK,
        r#"{"action": "mark_lost", "fieldUpdates": {"lostReason": "no show"}}"#,
    );
    assert_eq!(status, 200);

    let (status, json) = transition(server.port, "Lead", id, FRONT_DESK, r#"{"action": "contact"}"#);
    assert_eq!(status, 409);
    assert_eq!(json["kind"], "terminal_state");
    assert_eq!(json["status"], "LOST");
}

#[test]
fn refund_without_reason_returns_422() {
    let server = start_server(&[]);
    let payment = create(server.port, "Payment", r#"{"payload": {"amount": "80.00"}}"#);
    let id = payment["id"].as_str().unwrap();

    let (status, json) = transition(server.port, "Payment", id, BILLING, r#"{"action": "refund"}"#);
    assert_eq!(status, 422);
    assert_eq!(json["kind"], "precondition_failed");
    assert_eq!(json["missingFields"], serde_json::json!(["refundReason"]));
}

#[test]
fn wrong_role_returns_403() {
    let server = start_server(&[]);
    let payment = create(server.port, "Payment", "{}");
    let id = payment["id"].as_str().unwrap();
    let (status, json) = transition(server.port, "Payment", id, FRONT_DESK, r#"{"action": "process"}"#);
    assert_eq!(status, 403);
    assert_eq!(json["kind"], "forbidden");
}

#[test]
fn missing_actor_headers_returns_400() {
    let server = start_server(&[]);
    let (status, json) = request(server.port, "POST", "/entities/Lead", &[], Some("{}"));
    assert_eq!(status, 400);
    assert_eq!(json["kind"], "bad_request");
}

#[test]
fn malformed_transition_body_returns_400() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", "{}");
    let id = lead["id"].as_str().unwrap();
    let (status, json) = transition(server.port, "Lead", id, FRONT_DESK, "{not json");
    assert_eq!(status, 400);
    assert_eq!(json["kind"], "bad_request");
}

#[test]
fn unknown_entity_returns_404() {
    let server = start_server(&[]);
    let (status, json) = get(server.port, "/entities/Lead/does-not-exist");
    assert_eq!(status, 404);
    assert_eq!(json["kind"], "not_found");
}

#[test]
fn idempotent_transition_is_replayed() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", "{}");
    let id = lead["id"].as_str().unwrap();
    let body = r#"{"action": "contact", "idempotencyKey": "retry-1"}"#;

    let (s1, first) = transition(server.port, "Lead", id, FRONT_DESK, body);
    let (s2, second) = transition(server.port, "Lead", id, FRONT_DESK, body);
    assert_eq!((s1, s2), (200, 200));
    assert_eq!(first["transition"]["id"], second["transition"]["id"]);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["entity"]["version"], 1);
}

#[test]
fn idempotency_key_reused_for_another_action_returns_409() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", "{}");
    let id = lead["id"].as_str().unwrap();

    let (status, _) = transition(
        server.port,
        "Lead",
        id,
        FRONT_DESK,
        r#"{"action": "contact", "idempotencyKey": "k1"}"#,
    );
    assert_eq!(status, 200);

    let (status, json) = transition(
        server.port,
        "Lead",
        id,
        FRONT_DESK,
        r#"{"action": "mark_lost", "idempotencyKey": "k1", "fieldUpdates": {"lostReason": "moved"}}"#,
    );
    assert_eq!(status, 409, "{}", json);
    assert_eq!(json["kind"], "idempotency_key_reused");
    assert_eq!(json["recordedAction"], "contact");

    let (_, json) = get(server.port, &format!("/entities/Lead/{}", id));
    assert_eq!(json["status"], "CONTACTED");
}

#[test]
fn transition_cannot_override_precondition_operands() {
    let server = start_server(&[]);
    let refund = create(
        server.port,
        "Refund",
        r#"{"payload": {"amount": 150, "originalAmount": 100}}"#,
    );
    let id = refund["id"].as_str().unwrap();
    let manager = &[("X-Actor-Id", "m-1"), ("X-Actor-Role", "manager")];

    let (status, json) = transition(
        server.port,
        "Refund",
        id,
        manager,
        r#"{"action": "approve", "fieldUpdates": {"originalAmount": "1000.00"}}"#,
    );
    assert_eq!(status, 422, "{}", json);
    assert_eq!(json["kind"], "protected_field");
    assert_eq!(json["fields"], serde_json::json!(["originalAmount"]));
}

#[test]
fn patch_checks_expected_version() {
    let server = start_server(&[]);
    let lead = create(server.port, "Lead", r#"{"payload": {"phone": "555"}}"#);
    let path = format!("/entities/Lead/{}", lead["id"].as_str().unwrap());

    let (status, json) = request(
        server.port,
        "PATCH",
        &path,
        FRONT_DESK,
        Some(r#"{"patch": {"phone": null, "email": "a@b.c"}, "expectedVersion": 0}"#),
    );
    assert_eq!(status, 200, "{}", json);
    assert_eq!(json["version"], 1);
    assert_eq!(json["status"], "NEW");
    assert_eq!(json["payload"], serde_json::json!({"email": "a@b.c"}));

    let (status, json) = request(
        server.port,
        "PATCH",
        &path,
        FRONT_DESK,
        Some(r#"{"patch": {"email": "x@y.z"}, "expectedVersion": 0}"#),
    );
    assert_eq!(status, 409);
    assert_eq!(json["kind"], "conflict");
    assert_eq!(json["actualVersion"], 1);
}

#[test]
fn list_filters_by_status() {
    let server = start_server(&[]);
    let a = create(server.port, "Lead", "{}");
    create(server.port, "Lead", "{}");
    let (status, _) = transition(
        server.port,
        "Lead",
        a["id"].as_str().unwrap(),
        FRONT_DESK,
        r#"{"action": "contact"}"#,
    );
    assert_eq!(status, 200);

    let (status, json) = get(server.port, "/entities/Lead?status=CONTACTED");
    assert_eq!(status, 200);
    let entities = json["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["id"], a["id"]);

    let (_, json) = get(server.port, "/entities/Lead");
    assert_eq!(json["entities"].as_array().unwrap().len(), 2);
}

#[test]
fn actions_reflect_caller_role() {
    let server = start_server(&[]);
    let refund = create(
        server.port,
        "Refund",
        r#"{"payload": {"amount": 10, "originalAmount": 25}}"#,
    );
    let path = format!("/entities/Refund/{}/actions", refund["id"].as_str().unwrap());

    let (status, json) = request(
        server.port,
        "GET",
        &path,
        &[("X-Actor-Id", "m-1"), ("X-Actor-Role", "manager")],
        None,
    );
    assert_eq!(status, 200);
    let actions = json["actions"].as_array().unwrap();
    assert_eq!(actions[0]["action"], "approve");
    assert_eq!(actions[0]["available"], true);
    assert_eq!(actions[1]["action"], "reject");
    assert_eq!(actions[1]["blocked"]["type"], "missing_fields");

    let (_, json) = request(server.port, "GET", &path, BILLING, None);
    assert_eq!(json["actions"][0]["blocked"]["type"], "forbidden");
}

// ──────────────────────────────────────────────
// Middleware
// ──────────────────────────────────────────────

#[test]
fn api_key_required_when_configured() {
    let server = start_server(&[("PRAXIS_API_KEY", "s3cret")]);

    let (status, _) = get(server.port, "/health");
    assert_eq!(status, 200, "/health is exempt from auth");

    let (status, _) = get(server.port, "/workflows");
    assert_eq!(status, 401);

    let (status, _) = request(server.port, "GET", "/workflows", &[("X-API-Key", "wrong")], None);
    assert_eq!(status, 403);

    let (status, _) = request(
        server.port,
        "GET",
        "/workflows",
        &[("Authorization", "Bearer s3cret")],
        None,
    );
    assert_eq!(status, 200);
}

#[test]
fn rate_limit_returns_429() {
    let server = start_server(&[("PRAXIS_RATE_LIMIT", "3")]);
    for _ in 0..3 {
        let (status, _) = get(server.port, "/health");
        assert_eq!(status, 200);
    }
    let (status, json) = get(server.port, "/health");
    assert_eq!(status, 429);
    assert_eq!(json["kind"], "rate_limited");
}
