//! Absolute URL resolution for stream endpoints.
//!
//! Only `scheme://host[:port][/path]` is understood. IPv6 literals and
//! `user:pass@` credentials are not supported: a bracketed host or userinfo
//! is split at the last colon like any other authority.

use herald_types::UrlError;

/// Port used when the authority has none. Applies to `https` as well.
pub const DEFAULT_PORT: u16 = 80;

/// URL scheme accepted by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Whether the scheme asks for TLS. The default transport does not do TLS.
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Https)
    }
}

/// A resolved stream URL. Replaced, never mutated, when a redirect is followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// The URL as given, used as the `origin` of delivered events.
    pub absolute_url: String,
}

impl ParsedUrl {
    /// Resolve an absolute URL.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let url = url.trim();
        let (scheme, rest) = url.split_once(':').ok_or_else(|| UrlError::MissingScheme {
            url: url.to_string(),
        })?;

        let scheme = match scheme {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(UrlError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        };

        let rest = rest
            .strip_prefix("//")
            .ok_or_else(|| UrlError::MissingSeparator {
                url: url.to_string(),
            })?;

        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rfind(':') {
            Some(colon) => {
                let raw_port = &authority[colon + 1..];
                let port = raw_port
                    .parse::<u16>()
                    .map_err(|_| UrlError::InvalidPort {
                        url: url.to_string(),
                        port: raw_port.to_string(),
                    })?;
                (&authority[..colon], port)
            }
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(UrlError::EmptyHost {
                url: url.to_string(),
            });
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
            absolute_url: url.to_string(),
        })
    }

    /// Resolve a redirect target against this URL.
    ///
    /// Absolute targets are parsed as-is; targets starting with `/` keep this
    /// URL's scheme, host and port.
    pub fn join(&self, location: &str) -> Result<Self, UrlError> {
        if location.starts_with('/') && !location.starts_with("//") {
            let absolute = format!(
                "{}://{}:{}{}",
                self.scheme.as_str(),
                self.host,
                self.port,
                location
            );
            return Self::parse(&absolute);
        }
        Self::parse(location)
    }

    /// The `host:port` pair handed to the transport, for logging.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
