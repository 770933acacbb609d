//! HTTP client with timeouts and cookie support
//!
//! Every call performs exactly one request. Retry cadence belongs to the
//! controller, so nothing here loops.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::HttpConfig;

/// Status and fully read body of one response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/133.0"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,th;q=0.8"),
        );

        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(cfg.timeout))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout))
            .default_headers(headers);
        if !cfg.use_system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self { inner: client })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Self::read(resp).await
    }

    pub async fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<HttpResponse> {
        let resp = self
            .inner
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        Self::read(resp).await
    }

    async fn read(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read response body ({})", status))?;
        Ok(HttpResponse { status, body })
    }
}
