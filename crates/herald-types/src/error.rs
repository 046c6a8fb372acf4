//! Error hierarchy for Herald.

use thiserror::Error;

/// Top-level error type for all Herald operations.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("An EventSource must be created inside a tokio runtime")]
    NoRuntime,
}

/// Errors from resolving a stream URL. Raised before any connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Invalid URL: {url}")]
    MissingScheme { url: String },

    #[error("invalid scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid URL (expected '://' after scheme): {url}")]
    MissingSeparator { url: String },

    #[error("Invalid URL (empty host): {url}")]
    EmptyHost { url: String },

    #[error("Invalid port '{port}' in URL: {url}")]
    InvalidPort { url: String, port: String },
}

/// Fatal problems with the HTTP response that precedes an event stream.
///
/// The `Display` text of each variant is the message carried by the `error`
/// notification when the connection fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("Bad response: {line}")]
    BadStatusLine { line: String },

    #[error("Needs to use a Proxy (status:{status})")]
    UseProxy { status: u16 },

    #[error("Needs Authentication (status:{status}){}", challenge_suffix(.challenge))]
    Unauthorized {
        status: u16,
        challenge: Option<String>,
    },

    #[error("Needs Proxy Authentication")]
    ProxyAuthentication,

    #[error("Redirect expected (status: {status}) but no Location found")]
    MissingLocation { status: u16 },

    #[error("Invalid redirect target: {0}")]
    BadRedirect(UrlError),

    #[error("Too many redirects ({count})")]
    TooManyRedirects { count: u32 },

    #[error("Bad or Unsupported HTTP Response Status: {status}")]
    UnsupportedStatus { status: String },

    #[error("Bad MIME Type: {mime} (expected \"text/event-stream\")")]
    BadMimeType { mime: String },

    #[error("Bad Response: {response}")]
    Incomplete { response: String },
}

fn challenge_suffix(challenge: &Option<String>) -> String {
    challenge
        .as_deref()
        .map(|line| format!("\n{line}"))
        .unwrap_or_default()
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
