//! Parsing of portal detection responses

use crate::models::DiscoveredPortalParameters;
use regex::Regex;
use reqwest::{StatusCode, Url};

/// Body served by the connectivity check endpoint on an open network
pub const CONNECTIVITY_SUCCESS_BODY: &str = "success\n";

/// Whether a connectivity check response proves the network is unfiltered
pub fn is_connectivity_success(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && body == CONNECTIVITY_SUCCESS_BODY
}

/// Extract portal parameters from the page a captive portal serves in place
/// of the generate_204 response.
///
/// The target is parsed as-is so query values are decoded exactly once and
/// escaped delimiters inside them stay part of the value. Only a target that
/// is itself fully percent-encoded is decoded before parsing.
///
/// Returns `None` when the body has no `URL=` redirect or the target is not a
/// valid URL. Empty query values are treated as missing.
pub fn parse_redirect(html: &str) -> Option<DiscoveredPortalParameters> {
    let raw = Regex::new(r#"URL=([^"']+)"#)
        .ok()?
        .captures(html)?
        .get(1)?
        .as_str();

    let (url, parsed) = match Url::parse(raw) {
        Ok(parsed) => (raw.to_string(), parsed),
        Err(_) => {
            let decoded = urlencoding::decode(raw).ok()?.into_owned();
            match Url::parse(&decoded) {
                Ok(parsed) => (decoded, parsed),
                Err(e) => {
                    tracing::debug!("Redirect target '{}' is not a URL: {}", raw, e);
                    return None;
                }
            }
        }
    };

    let query = |name: &str| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    };

    Some(DiscoveredPortalParameters {
        acip: query("ac-ip"),
        redirect_url: query("redirect-url"),
        uaddress: query("uaddress"),
        umac: query("umac"),
        ssid: query("ssid"),
        url,
    })
}
