//! Bind address parsing
//!
//! Endpoint URLs such as `https://localhost:18888` or `http://*:4317` are parsed into a
//! [`BindAddress`]. Only the scheme, host and port are meaningful; a path other than `/`,
//! credentials, a query or a fragment are rejected.

use std::fmt;

use thiserror::Error;
use url::{ParseError, Url};

/// Errors produced while parsing a bind address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No `scheme://` prefix
    #[error("missing scheme")]
    MissingScheme,

    /// Scheme other than http or https
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    /// Empty host component
    #[error("missing host")]
    MissingHost,

    /// Port is not a number in 0..=65535
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    /// Bind addresses cannot carry a path
    #[error("path '{0}' is not supported on a bind address")]
    UnsupportedPath(String),

    /// Bind addresses cannot carry credentials
    #[error("user info is not supported on a bind address")]
    UserInfo,

    /// Query or fragment after the authority
    #[error("query or fragment is not supported on a bind address: '{0}'")]
    UnexpectedSuffix(String),

    /// Rejected by the URL parser, typically an invalid host
    #[error("{0}")]
    Malformed(ParseError),
}

/// Transport scheme of a bind address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain text
    Http,
    /// TLS
    Https,
}

impl Scheme {
    /// Default port when the URL omits one
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    /// Scheme as written in a URL
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A parsed bind specification
///
/// Hosts are normalized to lowercase so two spellings of the same address compare equal.
/// IPv6 literals keep their brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindAddress {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl BindAddress {
    /// Parse an endpoint URL
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] describing the first malformed component.
    ///
    /// # Example
    ///
    /// ```
    /// use aperture_config::address::BindAddress;
    ///
    /// let address = BindAddress::parse("https://*:18888").unwrap();
    /// assert!(address.is_tls());
    /// assert!(address.is_wildcard_host());
    /// assert_eq!(address.port(), 18888);
    /// ```
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        let (scheme_text, rest) = input.split_once("://").ok_or(AddressError::MissingScheme)?;

        // `*` and `+` bind every interface but are not hosts a URL parser accepts
        let wildcard = ["*", "+"].into_iter().find(|w| {
            rest.strip_prefix(w)
                .is_some_and(|after| after.is_empty() || after.starts_with([':', '/']))
        });
        let parsed = match wildcard {
            Some(w) => Url::parse(&format!("{scheme_text}://0.0.0.0{}", &rest[w.len()..])),
            None => Url::parse(input),
        }
        .map_err(|e| match e {
            ParseError::EmptyHost => AddressError::MissingHost,
            ParseError::InvalidPort => AddressError::InvalidPort(input.to_string()),
            other => AddressError::Malformed(other),
        })?;

        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(AddressError::UnsupportedScheme(other.to_string())),
        };
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(AddressError::UserInfo);
        }
        if parsed.path() != "/" {
            return Err(AddressError::UnsupportedPath(parsed.path().to_string()));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(AddressError::UnexpectedSuffix(input.to_string()));
        }

        let host = match wildcard {
            Some(w) => w.to_string(),
            None => parsed.host_str().ok_or(AddressError::MissingHost)?.to_string(),
        };
        let port = parsed
            .port_or_known_default()
            .unwrap_or_else(|| scheme.default_port());

        Ok(Self { scheme, host, port })
    }

    /// Scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host as configured (lowercased)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port; 0 asks the operating system to assign one at bind time
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether connections to this address use TLS
    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Whether the host binds every interface (`*`, `+`, `0.0.0.0`, `[::]`)
    pub fn is_wildcard_host(&self) -> bool {
        matches!(self.host.as_str(), "*" | "+" | "0.0.0.0" | "[::]" | "::")
    }

    /// Host used when showing the address to a person
    ///
    /// Wildcards are rewritten to `localhost`. Never use this for binding.
    pub fn display_host(&self) -> &str {
        if self.is_wildcard_host() {
            "localhost"
        } else {
            &self.host
        }
    }

    /// `host:port` target for a socket bind
    pub fn bind_target(&self) -> String {
        match self.host.as_str() {
            "*" | "+" => format!("0.0.0.0:{}", self.port),
            host => format!("{}:{}", host, self.port),
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}
