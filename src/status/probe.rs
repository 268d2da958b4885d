use serde_json::json;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};
use crate::provider::Endpoint;

/// What the deployed application said back
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: u16,
    pub body: String,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn probe_url(endpoint: &Endpoint, path: &str) -> Result<Url> {
    let base = Url::parse(&endpoint.url())
        .map_err(|e| Error::Config(format!("Bad endpoint address {}: {}", endpoint, e)))?;
    base.join(path)
        .map_err(|e| Error::Config(format!("Bad probe path '{}': {}", path, e)))
}

/// POST one JSON message to the deployed endpoint.
///
/// The application behind the endpoint is not ours to specify; this only
/// confirms something answers HTTP on the reported address.
pub async fn probe_endpoint(
    endpoint: &Endpoint,
    path: &str,
    message: &str,
    timeout: Duration,
) -> Result<ProbeOutcome> {
    let url = probe_url(endpoint, path)?;

    info!("Probing {}", url);

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(url)
        .json(&json!({ "message": message }))
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;

    Ok(ProbeOutcome { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            ip: "192.0.2.1".to_string(),
            port: 8080,
        }
    }

    #[test]
    fn test_probe_url_joins_path() {
        let url = probe_url(&endpoint(), "/chat").unwrap();
        assert_eq!(url.as_str(), "http://192.0.2.1:8080/chat");
    }

    #[test]
    fn test_probe_outcome_success_range() {
        let ok = ProbeOutcome {
            status: 200,
            body: String::new(),
        };
        let err = ProbeOutcome {
            status: 502,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!err.is_success());
    }
}
