//! Port-probing strategy
//!
//! A node's RPC may listen on any of several (scheme, port) pairs. Rather
//! than repeating a probe per pair, the list is interpreted in order and the
//! first success wins.

use std::future::Future;
use std::net::IpAddr;

use super::ProbeError;
use crate::config::{ProbeTarget, Scheme};

/// Base URL for `ip:port`, bracketing IPv6 literals
pub fn base_url(scheme: Scheme, ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}://{}:{}", scheme.as_str(), v4, port),
        IpAddr::V6(v6) => format!("{}://[{}]:{}", scheme.as_str(), v6, port),
    }
}

/// Candidate base URLs for `ip`, in probe order
pub fn candidate_urls(ip: IpAddr, targets: &[ProbeTarget]) -> Vec<String> {
    targets
        .iter()
        .map(|target| base_url(target.scheme, ip, target.port))
        .collect()
}

/// Join a base URL and an absolute path without doubling the slash
pub fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Run `attempt` on each base URL until one succeeds
pub async fn first_success<T, F, Fut>(
    host: &str,
    urls: Vec<String>,
    mut attempt: F,
) -> Result<T, ProbeError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let mut last = String::from("no targets");

    for url in urls {
        match attempt(url.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::trace!("Probe {} failed: {}", url, e);
                last = e.to_string();
            }
        }
    }

    Err(ProbeError::AllTargetsFailed {
        host: host.to_string(),
        last,
    })
}
