//! KMITL captive portal implementation
//!
//! Discovery goes through the generate_204 redirect, login and heartbeat are
//! plain form POSTs to the campus portal.

use crate::config::{AgentConfig, HttpConfig};
use crate::http::HttpClient;
use crate::models::{DiscoveredPortalParameters, HeartbeatForm, LoginForm, LoginOutcome};
use crate::parser;
use crate::portal::CaptivePortal;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;

const GENERATE_204_URL: &str = "http://www.gstatic.com/generate_204";
const CONNECTIVITY_CHECK_URL: &str = "https://detectportal.firefox.com/success.txt";
const LOGIN_URL: &str = "https://portal.kmitl.ac.th:19008/portalauth/login";
const HEARTBEAT_URL: &str = "https://nani.csc.kmitl.ac.th/network-api/data/";

/// URLs the portal talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub generate_204: String,
    pub connectivity_check: String,
    pub login: String,
    pub heartbeat: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            generate_204: GENERATE_204_URL.to_string(),
            connectivity_check: CONNECTIVITY_CHECK_URL.to_string(),
            login: LOGIN_URL.to_string(),
            heartbeat: HEARTBEAT_URL.to_string(),
        }
    }
}

/// KMITL portal bound to one configuration record
pub struct KmitlPortal {
    config: AgentConfig,
    endpoints: Endpoints,
    client: HttpClient,
}

impl KmitlPortal {
    pub fn new(config: AgentConfig, http: &HttpConfig, endpoints: Endpoints) -> Result<Self> {
        Ok(Self {
            config,
            endpoints,
            client: HttpClient::new(http)?,
        })
    }

    /// Ask the portal which access point and client it sees us as
    async fn discover(&self) -> Option<DiscoveredPortalParameters> {
        let resp = match self.client.get(&self.endpoints.generate_204).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Error during URL fetching: {:#}", e);
                return None;
            }
        };

        let params = parser::parse_redirect(&resp.body);
        if params.is_none() {
            tracing::debug!("No portal redirect in generate_204 response ({})", resp.status);
        }
        params
    }
}

#[async_trait]
impl CaptivePortal for KmitlPortal {
    fn name(&self) -> &str {
        "KMITL"
    }

    async fn check_connection(&self) -> bool {
        match self.client.get(&self.endpoints.connectivity_check).await {
            Ok(resp) => parser::is_connectivity_success(resp.status, &resp.body),
            Err(e) => {
                tracing::debug!("Connectivity check failed: {:#}", e);
                false
            }
        }
    }

    async fn login(&self) -> Option<LoginOutcome> {
        let discovered = self.discover().await;
        match &discovered {
            Some(params) => {
                tracing::info!("Login URL: {}", params.url);
                if let Some(redirect) = &params.redirect_url {
                    tracing::debug!("   -> Portal redirect target: {}", redirect);
                }
            }
            None => tracing::info!("Login URL not found, attempting to login without parameters."),
        }

        let form = LoginForm::build(&self.config, discovered.as_ref());
        tracing::debug!(
            "   -> uaddress={} umac={} acip={}",
            form.uaddress,
            form.umac,
            form.acip
        );

        match self.client.post_form(&self.endpoints.login, &form).await {
            Ok(resp) if resp.status == StatusCode::OK => {
                let outcome = LoginOutcome::from_body(&resp.body);
                tracing::info!("Login successful.");
                if let Some(token) = outcome.token() {
                    tracing::debug!("   -> Session token: {}", token);
                }
                if outcome.success() == Some(false) {
                    tracing::warn!("Portal accepted the request but reported success=false");
                }
                Some(outcome)
            }
            Ok(resp) => {
                tracing::error!(
                    "Login failed ({}). Check your username and password.",
                    resp.status
                );
                None
            }
            Err(e) => {
                tracing::error!("Connection error: {:#}", e);
                None
            }
        }
    }

    async fn heartbeat(&self) -> bool {
        let form = HeartbeatForm::new(&self.config.username);

        match self.client.post_form(&self.endpoints.heartbeat, &form).await {
            Ok(resp) if resp.status == StatusCode::OK => {
                tracing::info!("Heartbeat successful.");
                true
            }
            Ok(resp) => {
                tracing::warn!("Heartbeat failed ({}).", resp.status);
                false
            }
            Err(e) => {
                tracing::error!("Connection error: {:#}", e);
                false
            }
        }
    }
}
