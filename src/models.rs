//! Data models for KMITL portal authentication

use base64::{engine::general_purpose, Engine};
use serde::Serialize;

use crate::config::AgentConfig;

/// Parameters the portal advertises in its redirect URL.
///
/// Every field is optional on its own; the login form falls back per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredPortalParameters {
    pub url: String,
    pub acip: Option<String>,
    pub redirect_url: Option<String>,
    pub uaddress: Option<String>,
    pub umac: Option<String>,
    pub ssid: Option<String>,
}

/// Body returned by a successful login, passed through unmodified
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub body: serde_json::Value,
}

impl LoginOutcome {
    /// Wrap a response body; anything that is not JSON is kept as a string
    pub fn from_body(body: &str) -> Self {
        let body = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
        Self { body }
    }

    pub fn success(&self) -> Option<bool> {
        self.body.get("success").and_then(|v| v.as_bool())
    }

    pub fn token(&self) -> Option<&str> {
        self.body
            .get("token")
            .or_else(|| self.body.get("psessionid"))
            .and_then(|v| v.as_str())
    }
}

/// Form posted to the portal login endpoint.
///
/// Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginForm {
    #[serde(rename = "userPass")]
    pub user_pass: String,
    #[serde(rename = "authType")]
    pub auth_type: &'static str,
    pub ssid: String,
    pub uaddress: String,
    pub umac: String,
    pub acip: String,
    pub agreed: &'static str,
    #[serde(rename = "userName")]
    pub user_name: String,
}

impl LoginForm {
    /// Combine discovered parameters with the configured fallbacks
    pub fn build(cfg: &AgentConfig, discovered: Option<&DiscoveredPortalParameters>) -> Self {
        let field = |value: Option<&String>, fallback: &str| {
            value.cloned().unwrap_or_else(|| fallback.to_string())
        };

        Self {
            user_pass: cfg.password.clone(),
            auth_type: "1",
            ssid: discovered
                .and_then(|d| d.ssid.as_deref())
                .map(|s| general_purpose::STANDARD.encode(s))
                .unwrap_or_default(),
            uaddress: field(discovered.and_then(|d| d.uaddress.as_ref()), &cfg.ip_address),
            umac: field(discovered.and_then(|d| d.umac.as_ref()), &cfg.fallback_umac),
            acip: field(discovered.and_then(|d| d.acip.as_ref()), &cfg.fallback_acip),
            agreed: "1",
            user_name: cfg.username.clone(),
        }
    }
}

/// Client identity reported with every heartbeat
pub const HEARTBEAT_OS: &str = "Chrome v133.0.0.0 on Windows 11 64-bit";

/// Form posted to the keep-alive endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatForm {
    pub username: String,
    pub os: &'static str,
    pub speed: &'static str,
    pub newauth: &'static str,
}

impl HeartbeatForm {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            os: HEARTBEAT_OS,
            speed: "1.0",
            newauth: "1",
        }
    }
}
