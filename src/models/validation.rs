use anyhow::{Result, anyhow};
use url::Url;

const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Parses a delivery URL and checks it may receive webhooks.
///
/// Only `https` is accepted, except plain `http` to a loopback host.
pub fn validate_endpoint_url(endpoint_url: &str) -> Result<Url> {
    let url = Url::parse(endpoint_url).map_err(|e| anyhow!("Malformed endpoint URL: {}", e))?;

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Endpoint URL has no host"))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if LOCAL_HOSTS.contains(&host) => Ok(url),
        "http" => Err(anyhow!(
            "Plain http is only allowed for localhost, got host '{}'",
            host
        )),
        other => Err(anyhow!("Unsupported endpoint scheme '{}'", other)),
    }
}

pub fn is_valid_endpoint(endpoint_url: &str) -> bool {
    validate_endpoint_url(endpoint_url).is_ok()
}
