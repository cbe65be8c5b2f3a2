//! Endpoint resolution from free-form host/port/path text.
//!
//! The configuration surface hands over raw text fields that may carry
//! stray whitespace, zero-width characters pasted from elsewhere, a scheme
//! prefix on the host, or slashes around the path. [`resolve`] normalises
//! them into `http://{host}:{port}/{path}`.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

const SCHEME_PREFIX: &str = "http://";

/// Characters trimmed from both ends of every field besides whitespace.
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

// ── EndpointConfig ───────────────────────────────────────────────

/// Raw endpoint fields as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: String,
    pub path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: "5000".into(),
            path: "sandbox".into(),
        }
    }
}

impl EndpointConfig {
    /// Resolve into a canonical URL.
    pub fn resolve(&self) -> Result<String, ExchangeError> {
        resolve(&self.host, &self.port, &self.path)
    }
}

// ── resolve ──────────────────────────────────────────────────────

/// Compose a canonical URL from raw host, port and path text.
///
/// Pure and idempotent. Fails with [`ExchangeError::InvalidEndpoint`] when
/// the port is not an integer in `0..=65535`, the host is empty, or the
/// result does not parse as a URL.
pub fn resolve(host: &str, port: &str, path: &str) -> Result<String, ExchangeError> {
    let host = clean(host);
    let host = strip_scheme(host);
    if host.is_empty() {
        return Err(ExchangeError::InvalidEndpoint("host is empty".into()));
    }

    let port_text = clean(port);
    let port: u16 = port_text.parse().map_err(|_| {
        ExchangeError::InvalidEndpoint(format!("port {port_text:?} is not a number in 0..=65535"))
    })?;

    let path = clean(path);
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);

    let url = format!("{SCHEME_PREFIX}{host}:{port}/{path}");
    Url::parse(&url).map_err(|e| ExchangeError::InvalidEndpoint(format!("{url}: {e}")))?;
    Ok(url)
}

fn clean(field: &str) -> &str {
    field.trim_matches(|c: char| c.is_whitespace() || ZERO_WIDTH.contains(&c))
}

fn strip_scheme(host: &str) -> &str {
    match host.get(..SCHEME_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME_PREFIX) => {
            &host[SCHEME_PREFIX.len()..]
        }
        _ => host,
    }
}

// ── Tests ────────────────────────────────────────────────────────
