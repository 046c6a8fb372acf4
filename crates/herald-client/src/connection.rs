//! Connection lifecycle driver.
//!
//! One long-lived tokio task per EventSource. It connects, writes the
//! request, validates the response head, interprets the event stream, and
//! reconnects after a delay when the stream drops or the server reports a
//! transient error. Everything subscribers see is routed through the
//! [`TaskQueue`].

use std::fmt::Write as _;
use std::sync::Arc;

use herald_types::util::preview;
use herald_types::{ReadyState, ResponseError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::dispatcher::{Shared, Task, TaskQueue};
use crate::lines::LineDecoder;
use crate::response::{ResponseValidator, Verdict};
use crate::retry::RetryState;
use crate::sse::EventStreamBuffers;
use crate::transport::{BoxedConnection, Transport};
use crate::url::ParsedUrl;

/// Longest event payload echoed into debug logs.
const LOG_PREVIEW_BYTES: usize = 120;

/// Cross-origin mode recorded from `withCredentials`.
///
/// No preflight is performed; the mode is carried for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsMode {
    Anonymous,
    UseCredentials,
}

impl CorsMode {
    pub fn from_credentials(with_credentials: bool) -> Self {
        if with_credentials {
            Self::UseCredentials
        } else {
            Self::Anonymous
        }
    }
}

/// How a single connection ended.
#[derive(Debug)]
enum Outcome {
    /// Fetch again at once, against a new URL. The old connection has
    /// already been dropped, so its end-of-stream is never taken for a
    /// remote hangup.
    Redirect(ParsedUrl),
    /// Reestablish the connection after the backoff delay.
    Reconnect(String),
    /// The connection was failed; a `Fail` task is queued.
    Failed,
    /// `close()` was called.
    Closed,
}

/// Build the request written right after the transport opens.
pub(crate) fn build_request(url: &ParsedUrl, last_event_id: &str) -> String {
    let mut request = String::with_capacity(128);
    let _ = write!(
        request,
        "GET {} HTTP/1.1\nHost: {}\nAccept: text/event-stream\nCache-Control: no-cache\n",
        url.path, url.host
    );
    if !last_event_id.is_empty() {
        let _ = writeln!(request, "Last-Event-ID: {last_event_id}");
    }
    request.push('\n');
    request
}

pub(crate) struct Driver {
    url: ParsedUrl,
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    tasks: TaskQueue,
    cancel: CancellationToken,
    cors_mode: CorsMode,
    retry: RetryState,
    buffers: EventStreamBuffers,
    redirects: u32,
}

impl Driver {
    pub(crate) fn new(
        url: ParsedUrl,
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
        tasks: TaskQueue,
        cancel: CancellationToken,
        cors_mode: CorsMode,
    ) -> Self {
        let retry = RetryState::new(config.reconnection_time);
        Self {
            url,
            config,
            transport,
            shared,
            tasks,
            cancel,
            cors_mode,
            retry,
            buffers: EventStreamBuffers::new(),
            redirects: 0,
        }
    }

    /// Drive connections until the source is closed or failed.
    pub(crate) async fn run(mut self) {
        loop {
            match self.fetch().await {
                Outcome::Redirect(url) => self.url = url,
                Outcome::Reconnect(message) => {
                    if !self.reestablish(message).await {
                        break;
                    }
                }
                Outcome::Failed | Outcome::Closed => break,
            }
        }
        debug!(url = %self.url.absolute_url, "Connection driver finished");
    }

    /// Potentially CORS-enabled fetch. Preflight is not implemented, so this
    /// goes straight to establishing the connection.
    async fn fetch(&mut self) -> Outcome {
        debug!(cors_mode = ?self.cors_mode, "Fetching without CORS preflight");
        self.establish().await
    }

    async fn establish(&mut self) -> Outcome {
        info!(
            url = %self.url.absolute_url,
            authority = %self.url.authority(),
            secure = self.url.scheme.is_secure(),
            attempt = self.retry.attempt(),
            "Connecting"
        );

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.connect(&self.url.host, self.url.port),
        );
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = connect => Some(result),
        };
        let mut conn = match connected {
            None => return Outcome::Closed,
            Some(Ok(Ok(conn))) => conn,
            Some(Ok(Err(e))) => return Outcome::Reconnect(format!("Network error: {e}")),
            Some(Err(_)) => {
                return Outcome::Reconnect(format!(
                    "Connect timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                ));
            }
        };

        let request = build_request(&self.url, self.buffers.last_event_id());
        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = write_request(&mut conn, &request) => Some(result),
        };
        match written {
            None => return Outcome::Closed,
            Some(Err(e)) => return Outcome::Reconnect(format!("Network error: {e}")),
            Some(Ok(())) => {}
        }

        self.buffers.discard_pending();
        self.stream(conn).await
    }

    /// Read until the connection ends, routing lines to the validator until
    /// the response is accepted and to the event-stream parser afterwards.
    async fn stream(&mut self, mut conn: BoxedConnection) -> Outcome {
        let limit = self.config.max_line_length;
        let mut decoder = LineDecoder::with_max_line_length(limit);
        let mut validator = Some(ResponseValidator::with_max_head_length(limit));
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = conn.read(&mut buf) => Some(read),
            };

            match read {
                None => {
                    debug!("Connection closed by caller");
                    return Outcome::Closed;
                }
                Some(Ok(0)) => {
                    if decoder.pending_len() > 0 {
                        debug!(bytes = decoder.pending_len(), "Discarding unterminated line");
                    }
                    warn!(url = %self.url.absolute_url, "Stream ended by server");
                    return Outcome::Reconnect("Connection closed by server".to_string());
                }
                Some(Ok(n)) => {
                    let lines = match decoder.decode(&buf[..n]) {
                        Ok(lines) => lines,
                        Err(e) => {
                            warn!(
                                url = %self.url.absolute_url,
                                error = %e,
                                "Dropping oversized line"
                            );
                            return Outcome::Reconnect(e.to_string());
                        }
                    };
                    if let Some(outcome) = self.handle_lines(lines, &mut validator) {
                        drop(conn);
                        return outcome;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Stream read failed");
                    return Outcome::Reconnect(format!("Network error: {e}"));
                }
            }
        }
    }

    fn handle_lines(
        &mut self,
        lines: Vec<String>,
        validator: &mut Option<ResponseValidator>,
    ) -> Option<Outcome> {
        let lines = match validator.as_mut() {
            None => lines,
            Some(v) => match v.feed(lines) {
                Verdict::Pending => return None,
                Verdict::Accept { remaining } => {
                    *validator = None;
                    self.announce();
                    remaining
                }
                Verdict::Redirect { status, location } => {
                    return Some(self.redirect(status, &location));
                }
                Verdict::Retry { message } => {
                    warn!(url = %self.url.absolute_url, reason = %message, "Transient server error");
                    return Some(Outcome::Reconnect(message));
                }
                Verdict::Fail(err) => return Some(self.fail(err.to_string())),
            },
        };

        for line in &lines {
            if let Some(event) =
                self.buffers
                    .process_line(line, &self.url.absolute_url, &mut self.retry)
            {
                debug!(
                    event_type = %event.event_type(),
                    data = %preview(event.data(), LOG_PREVIEW_BYTES),
                    "Dispatching event"
                );
                self.tasks.push(Task::Deliver(event));
            }
        }
        None
    }

    /// Announce the connection.
    fn announce(&mut self) {
        info!(url = %self.url.absolute_url, "Connection open");
        self.retry.reset();
        self.redirects = 0;
        self.tasks.push(Task::Announce);
    }

    fn redirect(&mut self, status: u16, location: &str) -> Outcome {
        let next = match self.url.join(location) {
            Ok(next) => next,
            Err(e) => return self.fail(ResponseError::BadRedirect(e).to_string()),
        };

        self.redirects += 1;
        if self.redirects > self.config.max_redirects {
            return self.fail(
                ResponseError::TooManyRedirects {
                    count: self.redirects,
                }
                .to_string(),
            );
        }

        warn!(
            status,
            from = %self.url.absolute_url,
            to = %next.absolute_url,
            "Following redirect"
        );
        Outcome::Redirect(next)
    }

    /// Fail the connection. The caller drops the transport right after.
    fn fail(&mut self, message: String) -> Outcome {
        error!(url = %self.url.absolute_url, error = %message, "Failing the connection");
        self.tasks.push(Task::Fail { message });
        Outcome::Failed
    }

    /// Reestablish the connection. Returns `false` if the driver should stop.
    async fn reestablish(&mut self, message: String) -> bool {
        if self.cancel.is_cancelled() || self.shared.ready_state() == ReadyState::Closed {
            return false;
        }

        if let Some(max) = self.config.max_reconnect_attempts {
            if self.retry.attempt() >= max {
                self.fail(format!(
                    "Giving up after {max} reconnection attempts: {message}"
                ));
                return false;
            }
        }

        let delay = self.retry.next_attempt();
        let (done, step_one) = oneshot::channel();
        self.tasks.push(Task::Reconnecting {
            message: Some(message),
            done,
        });
        warn!(
            attempt = self.retry.attempt(),
            reconnection_time_ms = self.retry.reconnection_time().as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after delay"
        );

        let waited = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = async {
                tokio::time::sleep(delay).await;
                let _ = step_one.await;
            } => true,
        };

        waited && self.shared.ready_state() == ReadyState::Connecting
    }
}

async fn write_request(conn: &mut BoxedConnection, request: &str) -> std::io::Result<()> {
    conn.write_all(request.as_bytes()).await?;
    conn.flush().await
}
