//! Validation of the HTTP response that precedes the event stream.
//!
//! [`ResponseValidator`] is fed decoded lines until it reaches a verdict. It
//! keeps its state between reads, so a header block split over several reads
//! is handled the same as one that arrives at once.

use herald_types::ResponseError;
use herald_types::util::header_value;

/// MIME type an event stream must be served with.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// What to do with the connection once the response has been classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// More header lines are needed.
    Pending,
    /// The stream is valid. `remaining` holds lines after the blank line,
    /// which belong to the event stream.
    Accept { remaining: Vec<String> },
    /// Follow a redirect to `location`.
    Redirect { status: u16, location: String },
    /// A transient server error; reconnect after the usual delay.
    Retry { message: String },
    /// A fatal error; fail the connection.
    Fail(ResponseError),
}

/// How the status line was classified, for statuses that need more headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Ok,
    Redirect(u16),
    Unauthorized(u16),
}

/// Stateful classifier for one connection's response head.
#[derive(Debug)]
pub struct ResponseValidator {
    status: Option<StatusClass>,
    accept_ok: bool,
    challenge: Option<String>,
    seen: Vec<String>,
    head_len: usize,
    max_head_length: usize,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::with_max_head_length(usize::MAX)
    }
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator that gives up with [`Verdict::Retry`] once the response
    /// head, terminators included, grows past `limit` bytes.
    pub fn with_max_head_length(limit: usize) -> Self {
        Self {
            status: None,
            accept_ok: false,
            challenge: None,
            seen: Vec::new(),
            head_len: 0,
            max_head_length: limit,
        }
    }

    /// Feed the next batch of lines. Lines are consumed until a verdict other
    /// than [`Verdict::Pending`] is reached; anything left over after an
    /// accepted header block is returned in [`Verdict::Accept`].
    pub fn feed(&mut self, lines: Vec<String>) -> Verdict {
        let mut lines = lines.into_iter();
        while let Some(line) = lines.next() {
            self.head_len = self.head_len.saturating_add(line.len() + 1);
            if self.head_len > self.max_head_length {
                return Verdict::Retry {
                    message: format!("Response head exceeds {} bytes", self.max_head_length),
                };
            }
            match self.classify(&line) {
                Verdict::Pending => self.seen.push(line),
                Verdict::Accept { .. } => {
                    return Verdict::Accept {
                        remaining: lines.collect(),
                    };
                }
                verdict => return verdict,
            }
        }
        Verdict::Pending
    }

    fn classify(&mut self, line: &str) -> Verdict {
        let Some(status) = self.status else {
            return self.classify_status_line(line);
        };

        if line.is_empty() {
            return self.end_of_headers(status);
        }

        match status {
            StatusClass::Ok => {
                if let Some(value) = header_value(line, "content-type") {
                    let mime: String = value.chars().take(EVENT_STREAM_MIME.len()).collect();
                    if !mime.eq_ignore_ascii_case(EVENT_STREAM_MIME) {
                        return Verdict::Fail(ResponseError::BadMimeType { mime });
                    }
                    self.accept_ok = true;
                } else {
                    tracing::trace!(header = %line, "Ignoring response header");
                }
            }
            StatusClass::Redirect(status) => {
                if let Some(location) = header_value(line, "location") {
                    if !location.is_empty() {
                        return Verdict::Redirect {
                            status,
                            location: location.to_string(),
                        };
                    }
                }
            }
            StatusClass::Unauthorized(_) => {
                if header_value(line, "www-authenticate").is_some() && self.challenge.is_none() {
                    self.challenge = Some(line.to_string());
                }
            }
        }
        Verdict::Pending
    }

    fn classify_status_line(&mut self, line: &str) -> Verdict {
        let mut parts = line.split(' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP") {
            return Verdict::Fail(ResponseError::BadStatusLine {
                line: line.to_string(),
            });
        }

        let raw_status = parts.next().unwrap_or_default();
        let Ok(status) = raw_status.parse::<u16>() else {
            return Verdict::Fail(ResponseError::UnsupportedStatus {
                status: raw_status.to_string(),
            });
        };

        let class = match status {
            200 => StatusClass::Ok,
            301 | 302 | 303 | 307 => StatusClass::Redirect(status),
            401 => StatusClass::Unauthorized(status),
            305 => return Verdict::Fail(ResponseError::UseProxy { status }),
            407 => return Verdict::Fail(ResponseError::ProxyAuthentication),
            500 | 502 | 503 | 504 => {
                return Verdict::Retry {
                    message: format!("Server Error (status: {status})"),
                };
            }
            _ => {
                return Verdict::Fail(ResponseError::UnsupportedStatus {
                    status: status.to_string(),
                });
            }
        };
        self.status = Some(class);
        Verdict::Pending
    }

    fn end_of_headers(&mut self, status: StatusClass) -> Verdict {
        match status {
            StatusClass::Ok if self.accept_ok => Verdict::Accept {
                remaining: Vec::new(),
            },
            StatusClass::Ok => Verdict::Fail(ResponseError::Incomplete {
                response: self.seen.join("\n"),
            }),
            StatusClass::Redirect(status) => {
                Verdict::Fail(ResponseError::MissingLocation { status })
            }
            StatusClass::Unauthorized(status) => Verdict::Fail(ResponseError::Unauthorized {
                status,
                challenge: self.challenge.take(),
            }),
        }
    }
}
