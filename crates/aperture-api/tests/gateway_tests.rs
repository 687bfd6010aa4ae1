//! End-to-end tests over real listeners
//!
//! Binds the gateway on port 0 in independent mode and talks HTTP/1.1 to it over TCP.

use std::net::SocketAddr;
use std::sync::Arc;

use aperture_api::{telemetry::DiscardingSink, Server, ServerComponents};
use aperture_auth::GatewayHandle;
use aperture_config::{OptionsSource, RawOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    frontend: SocketAddr,
    otlp: SocketAddr,
    login_url: Option<String>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<aperture_api::Result<()>>,
}

async fn start() -> Running {
    let mut raw = RawOptions::default();
    raw.frontend.endpoint_urls = Some("http://127.0.0.1:0".into());
    raw.frontend.auth_mode = Some("browser_token".into());
    raw.frontend.browser_token = Some("s3cret".into());
    raw.otlp.http_endpoint_url = Some("http://127.0.0.1:0".into());
    raw.otlp.auth_mode = Some("api_key".into());
    raw.otlp.primary_api_key = Some("primary".into());
    let options = OptionsSource::new(raw).build().unwrap();

    let server = Server::bind(ServerComponents {
        gateway: Arc::new(GatewayHandle::new(options)),
        sink: Arc::new(DiscardingSink),
    })
    .await
    .unwrap();

    let topology = Arc::clone(server.topology());
    let frontend = topology.frontend_endpoint(0).unwrap().unwrap().local_addr;
    let otlp = topology.otlp_http_endpoint().unwrap().unwrap().local_addr;
    let login_url = server.login_url().unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async move {
        let _ = stopped.await;
    }));

    Running {
        frontend,
        otlp,
        login_url,
        stop,
        task,
    }
}

struct Reply {
    status: u16,
    head: String,
    body: String,
}

async fn send(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)]) -> Reply {
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("Content-Length: 0\r\n\r\n");

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();

    let text = String::from_utf8_lossy(&buf).to_string();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    Reply {
        status,
        head: head.to_ascii_lowercase(),
        body: body.to_string(),
    }
}

async fn stop(running: Running) {
    running.stop.send(()).unwrap();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_telemetry_export_with_api_key() {
    let running = start().await;

    let reply = send(
        running.otlp,
        "POST",
        "/v1/traces",
        &[("x-otlp-api-key", "primary"), ("content-type", "application/x-protobuf")],
    )
    .await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("rejectedSpans"));

    let reply = send(running.otlp, "POST", "/v1/logs", &[("x-otlp-api-key", "wrong")]).await;
    assert_eq!(reply.status, 401);
    assert!(!reply.head.contains("location:"));

    stop(running).await;
}

#[tokio::test]
async fn test_surfaces_are_bound_to_their_listeners() {
    let running = start().await;

    // Telemetry on the interactive listener, even with a valid key
    let reply = send(
        running.frontend,
        "POST",
        "/v1/traces",
        &[("x-otlp-api-key", "primary")],
    )
    .await;
    assert_eq!(reply.status, 401);
    assert!(reply.body.contains("not enabled on this connection"));

    // Interactive routes on the telemetry listener
    let reply = send(running.otlp, "GET", "/health", &[]).await;
    assert_eq!(reply.status, 401);

    let reply = send(running.frontend, "GET", "/health", &[]).await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("\"healthy\""));

    stop(running).await;
}

#[tokio::test]
async fn test_browser_token_login_flow() {
    let running = start().await;

    // No session yet: challenge to the login page
    let reply = send(running.frontend, "GET", "/api/session", &[]).await;
    assert_eq!(reply.status, 302);
    assert!(reply
        .head
        .contains("location: /login?returnurl=%2fapi%2fsession"));

    let reply = send(running.frontend, "GET", "/login?t=s3cret&returnUrl=%2Fapi%2Fsession", &[]).await;
    assert_eq!(reply.status, 302);
    let cookie_line = reply
        .head
        .lines()
        .find(|line| line.starts_with("set-cookie:"))
        .unwrap()
        .to_string();
    assert!(cookie_line.contains("httponly"));

    let login_url = running.login_url.clone().unwrap();
    assert_eq!(
        login_url,
        format!("http://127.0.0.1:{}/login?t=s3cret", running.frontend.port())
    );

    stop(running).await;
}

#[tokio::test]
async fn test_session_cookie_grants_access() {
    let running = start().await;

    let mut stream = TcpStream::connect(running.frontend).await.unwrap();
    let request = format!(
        "GET /login?t=s3cret HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        running.frontend
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8_lossy(&buf).to_string();

    // Keep the original case of the cookie value
    let cookie = text
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("set-cookie:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
        .and_then(|value| value.split(';').next())
        .unwrap()
        .to_string();

    let reply = send(running.frontend, "GET", "/api/session", &[("cookie", cookie.as_str())]).await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("browser-token-verified"));

    stop(running).await;
}
