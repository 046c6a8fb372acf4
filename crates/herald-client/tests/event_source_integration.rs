//! Integration tests for the full connect → validate → parse → dispatch
//! pipeline.
//!
//! A scripted in-memory transport stands in for the network. Each connect
//! pops the next script, records where it went, and serves a canned response
//! over a duplex pipe. Time is paused, so reconnection delays elapse
//! instantly while still being measurable.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use herald_client::{
    BoxedConnection, ClientConfig, EventSource, EventSourceBuilder, Handler, NotificationStream,
    Transport,
};
use herald_types::{DispatchableEvent, Notification, ReadyState};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

const OK_HEAD: &str = "HTTP/1.1 200 OK\nContent-Type: text/event-stream\n\n";

enum Script {
    Refuse,
    Respond { response: String, hold: bool },
}

#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: Mutex<Vec<(String, u16)>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    fn connects(&self) -> Vec<(String, u16)> {
        self.connects.lock().unwrap().clone()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<BoxedConnection>> + Send + 'a>> {
        self.connects.lock().unwrap().push((host.to_string(), port));
        let script = self.scripts.lock().unwrap().pop_front();
        let requests = Arc::clone(&self.requests);
        Box::pin(async move {
            match script {
                None | Some(Script::Refuse) => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )),
                Some(Script::Respond { response, hold }) => {
                    let (client, server) = tokio::io::duplex(64 * 1024);
                    tokio::spawn(serve(server, response, hold, requests));
                    Ok(Box::new(client) as BoxedConnection)
                }
            }
        })
    }
}

/// Read the request head, record it, write the response, then either hang up
/// or hold the connection until the client goes away.
async fn serve(
    mut server: DuplexStream,
    response: String,
    hold: bool,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 256];
    while !request.ends_with(b"\n\n") {
        match server.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    requests
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&request).into_owned());

    if server.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    if hold {
        let _ = server.read(&mut buf).await;
    }
}

fn respond(response: impl Into<String>, hold: bool) -> Script {
    Script::Respond {
        response: response.into(),
        hold,
    }
}

fn builder(url: &str, transport: &Arc<ScriptedTransport>) -> EventSourceBuilder {
    EventSource::builder(url).transport(Arc::clone(transport) as Arc<dyn Transport>)
}

/// Connect and subscribe to the three standard channels plus `extra`.
fn open(
    url: &str,
    transport: &Arc<ScriptedTransport>,
    extra: &[&str],
) -> (EventSource, NotificationStream) {
    let builder = builder(url, transport);
    let mut channels = vec!["open", "message", "error"];
    channels.extend_from_slice(extra);
    let stream = builder.notifications(channels);
    (builder.connect().unwrap(), stream)
}

async fn next(stream: &mut NotificationStream) -> Notification {
    tokio::time::timeout(Duration::from_secs(300), stream.next())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification stream ended early")
}

async fn drain(stream: &mut NotificationStream) -> Vec<Notification> {
    let mut rest = Vec::new();
    while let Some(n) = tokio::time::timeout(Duration::from_secs(300), stream.next())
        .await
        .expect("stream did not end")
    {
        rest.push(n);
    }
    rest
}

fn error(message: &str) -> Notification {
    Notification::Error {
        message: message.to_string(),
    }
}

fn message(data: &str, origin: &str) -> Notification {
    Notification::Message(DispatchableEvent::new(
        data.to_string(),
        String::new(),
        origin.to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Test: successful connection and message delivery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_open_then_multiline_message() {
    let url = "http://example.com:8080/events";
    let transport = ScriptedTransport::new(vec![respond(
        format!("{OK_HEAD}data: a\ndata: b\n\n"),
        true,
    )]);
    let (source, mut stream) = open(url, &transport, &[]);
    assert_eq!(source.ready_state(), ReadyState::Connecting);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(source.ready_state(), ReadyState::Open);
    assert_eq!(next(&mut stream).await, message("a\nb", url));

    assert_eq!(transport.connects(), vec![("example.com".to_string(), 8080)]);
    assert_eq!(
        transport.requests()[0],
        "GET /events HTTP/1.1\nHost: example.com\nAccept: text/event-stream\nCache-Control: no-cache\n\n"
    );

    source.close();
    assert!(drain(&mut stream).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_named_event_goes_to_its_own_channel() {
    let url = "http://example.com/";
    let transport = ScriptedTransport::new(vec![respond(
        format!("{OK_HEAD}: keep-alive\nevent: ping\ndata: {{}}\n\n"),
        true,
    )]);
    let (source, mut stream) = open(url, &transport, &["ping"]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(
        next(&mut stream).await,
        Notification::Message(DispatchableEvent::new(
            "{}".into(),
            "ping".into(),
            url.into()
        ))
    );

    source.close();
    assert!(drain(&mut stream).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_crlf_line_endings() {
    let url = "http://example.com/";
    let transport = ScriptedTransport::new(vec![respond(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream; charset=utf-8\r\n\r\ndata: x\r\n\r\n",
        true,
    )]);
    let (source, mut stream) = open(url, &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(next(&mut stream).await, message("x", url));
    source.close();
}

// ---------------------------------------------------------------------------
// Test: reconnection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_server_error_reconnects_after_default_delay() {
    let url = "http://example.com/";
    let transport = ScriptedTransport::new(vec![
        respond("HTTP/1.1 503 Service Unavailable\n\n", false),
        respond(format!("{OK_HEAD}data: back\n\n"), true),
    ]);
    let (source, mut stream) = open(url, &transport, &[]);
    let started = Instant::now();

    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Server Error (status: 503)")
    );
    assert_eq!(source.ready_state(), ReadyState::Connecting);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(next(&mut stream).await, message("back", url));
    assert_eq!(transport.connects().len(), 2);

    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_network_error_reconnects() {
    let transport = ScriptedTransport::new(vec![
        Script::Refuse,
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Network error: refused")
    );
    assert_eq!(next(&mut stream).await, Notification::Open);
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_last_event_id_sent_on_reconnect() {
    let url = "http://example.com/";
    let transport = ScriptedTransport::new(vec![
        respond(format!("{OK_HEAD}id: 7\ndata: one\n\n"), false),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open(url, &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(next(&mut stream).await, message("one", url));
    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Connection closed by server")
    );
    assert_eq!(next(&mut stream).await, Notification::Open);

    let requests = transport.requests();
    assert!(!requests[0].contains("Last-Event-ID"));
    assert!(requests[1].ends_with("Last-Event-ID: 7\n\n"));
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_retry_field_changes_delay() {
    let transport = ScriptedTransport::new(vec![
        respond(format!("{OK_HEAD}retry: 5000\n\n"), false),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    let opened = Instant::now();
    assert!(matches!(next(&mut stream).await, Notification::Error { .. }));
    assert_eq!(next(&mut stream).await, Notification::Open);

    let waited = opened.elapsed();
    assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
    assert!(waited < Duration::from_secs(10), "waited {waited:?}");
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_limit_fails_the_connection() {
    let transport = ScriptedTransport::new(vec![Script::Refuse, Script::Refuse]);
    let builder = builder("http://example.com/", &transport)
        .config(ClientConfig::default().max_reconnect_attempts(Some(1)));
    let mut stream = builder.notifications(["open", "error"]);
    let source = builder.connect().unwrap();

    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Network error: refused")
    );
    assert_eq!(
        next(&mut stream).await,
        error("Giving up after 1 reconnection attempts: Network error: refused")
    );
    assert!(drain(&mut stream).await.is_empty());
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert!(source.has_failed());
    assert_eq!(transport.connects().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_line_reconnects() {
    let transport = ScriptedTransport::new(vec![
        respond(format!("{OK_HEAD}data: {}", "x".repeat(100)), true),
        respond(format!("{OK_HEAD}data: ok\n\n"), true),
    ]);
    let builder = builder("http://example.com/", &transport)
        .config(ClientConfig::default().max_line_length(64));
    let mut stream = builder.notifications(["open", "message", "error"]);
    let source = builder.connect().unwrap();

    // The head and the long line may arrive in one read, so the first open
    // is not guaranteed.
    let mut first = next(&mut stream).await;
    if first == Notification::Open {
        first = next(&mut stream).await;
    }
    assert_eq!(first, error("reconnecting Line exceeds 64 bytes"));
    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(next(&mut stream).await, message("ok", "http://example.com/"));
    assert_eq!(transport.connects().len(), 2);
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_endless_response_head_reconnects() {
    let padding: String = (0..10).map(|i| format!("X-Pad-{i}: filler\n")).collect();
    let transport = ScriptedTransport::new(vec![
        respond(format!("HTTP/1.1 200 OK\n{padding}"), true),
        respond(OK_HEAD, true),
    ]);
    let builder = builder("http://example.com/", &transport)
        .config(ClientConfig::default().max_line_length(64));
    let mut stream = builder.notifications(["open", "error"]);
    let source = builder.connect().unwrap();

    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Response head exceeds 64 bytes")
    );
    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(transport.connects().len(), 2);
    source.close();
}

// ---------------------------------------------------------------------------
// Test: fatal responses
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_unsupported_status_fails_without_reconnecting() {
    let transport = ScriptedTransport::new(vec![
        respond("HTTP/1.1 404 Not Found\n\n", true),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(
        next(&mut stream).await,
        error("Bad or Unsupported HTTP Response Status: 404")
    );
    assert!(drain(&mut stream).await.is_empty());
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert!(source.has_failed());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_mime_type_fails() {
    let transport = ScriptedTransport::new(vec![respond(
        "HTTP/1.1 200 OK\nContent-Type: text/plain\n\n",
        true,
    )]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(
        next(&mut stream).await,
        error("Bad MIME Type: text/plain (expected \"text/event-stream\")")
    );
    assert_eq!(source.ready_state(), ReadyState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_carries_challenge() {
    let transport = ScriptedTransport::new(vec![respond(
        "HTTP/1.1 401 Unauthorized\nWWW-Authenticate: Basic realm=\"x\"\n\n",
        true,
    )]);
    let (_source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(
        next(&mut stream).await,
        error("Needs Authentication (status:401)\nWWW-Authenticate: Basic realm=\"x\"")
    );
}

// ---------------------------------------------------------------------------
// Test: redirects
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_redirect_is_followed_without_notifications() {
    let transport = ScriptedTransport::new(vec![
        respond(
            "HTTP/1.1 302 Found\nLocation: http://other.example:8080/moved\n\n",
            true,
        ),
        respond(format!("{OK_HEAD}data: x\n\n"), true),
    ]);
    let (source, mut stream) = open("http://origin.example/", &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(
        next(&mut stream).await,
        message("x", "http://other.example:8080/moved")
    );
    assert_eq!(
        transport.connects(),
        vec![
            ("origin.example".to_string(), 80),
            ("other.example".to_string(), 8080)
        ]
    );
    assert!(transport.requests()[1].starts_with("GET /moved HTTP/1.1\nHost: other.example\n"));
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_relative_redirect_keeps_authority() {
    let transport = ScriptedTransport::new(vec![
        respond("HTTP/1.1 307 Temporary Redirect\nLocation: /v2\n\n", true),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://origin.example:9000/v1", &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(transport.connects()[1], ("origin.example".to_string(), 9000));
    assert!(transport.requests()[1].starts_with("GET /v2 HTTP/1.1\n"));
    source.close();
}

#[tokio::test(start_paused = true)]
async fn test_redirect_loop_is_capped() {
    let redirect = || respond("HTTP/1.1 301 Moved Permanently\nLocation: /again\n\n", true);
    let transport = ScriptedTransport::new(vec![redirect(), redirect(), redirect()]);
    let builder = builder("http://example.com/", &transport)
        .config(ClientConfig::default().max_redirects(2));
    let mut stream = builder.notifications(["open", "error"]);
    let source = builder.connect().unwrap();

    assert_eq!(next(&mut stream).await, error("Too many redirects (3)"));
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert_eq!(transport.connects().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_keeps_retry_attempt() {
    let transport = ScriptedTransport::new(vec![
        respond("HTTP/1.1 503 Service Unavailable\n\n", false),
        respond("HTTP/1.1 302 Found\nLocation: /next\n\n", true),
        respond("HTTP/1.1 503 Service Unavailable\n\n", false),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);
    let started = Instant::now();

    for _ in 0..2 {
        assert_eq!(
            next(&mut stream).await,
            error("reconnecting Server Error (status: 503)")
        );
    }
    assert_eq!(next(&mut stream).await, Notification::Open);

    // 10s for the first attempt, 20s for the second.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30), "waited {waited:?}");
    assert!(waited < Duration::from_secs(40), "waited {waited:?}");
    assert_eq!(transport.connects().len(), 4);
    assert!(transport.requests()[2].starts_with("GET /next HTTP/1.1\n"));
    source.close();
}

// ---------------------------------------------------------------------------
// Test: close()
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_close_during_reconnect_delay_stops_reconnection() {
    let transport = ScriptedTransport::new(vec![
        respond(OK_HEAD, false),
        respond(OK_HEAD, true),
    ]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    assert_eq!(next(&mut stream).await, Notification::Open);
    assert_eq!(
        next(&mut stream).await,
        error("reconnecting Connection closed by server")
    );
    source.close();

    assert!(drain(&mut stream).await.is_empty());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects().len(), 1);
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert!(!source.has_failed());
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let transport = ScriptedTransport::new(vec![respond(OK_HEAD, true)]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);
    assert_eq!(next(&mut stream).await, Notification::Open);

    source.close();
    source.close();

    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert!(drain(&mut stream).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_before_connect_suppresses_everything() {
    let transport = ScriptedTransport::new(vec![respond(format!("{OK_HEAD}data: x\n\n"), true)]);
    let (source, mut stream) = open("http://example.com/", &transport, &[]);

    source.close();

    assert!(drain(&mut stream).await.is_empty());
    assert_eq!(source.ready_state(), ReadyState::Closed);
}

// ---------------------------------------------------------------------------
// Test: handler attributes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_onmessage_replacement_removes_previous_handler() {
    let transport = ScriptedTransport::new(vec![respond(format!("{OK_HEAD}data: x\n\n"), true)]);
    let source = builder("http://example.com/", &transport).connect().unwrap();

    let (first_tx, mut first_rx) = tokio::sync::mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = tokio::sync::mpsc::unbounded_channel();
    let first: Handler = Arc::new(move |n: &Notification| {
        let _ = first_tx.send(n.clone());
    });
    let second: Handler = Arc::new(move |n: &Notification| {
        let _ = second_tx.send(n.clone());
    });
    source.set_onmessage(Some(first));
    source.set_onmessage(Some(second));

    let received = tokio::time::timeout(Duration::from_secs(30), second_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, message("x", "http://example.com/"));
    assert!(first_rx.try_recv().is_err());

    source.set_onmessage(None);
    source.close();
}
