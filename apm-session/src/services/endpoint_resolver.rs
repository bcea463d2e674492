//! Endpoint resolver
//!
//! Picks the session's service base once, at startup. Candidates are probed
//! in list order with `GET {base}/test`; the first 2xx wins. When nothing
//! answers, the first candidate is used anyway and calls fail later with a
//! user-visible error.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-attempt probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

/// Liveness path exposed by the classifier service
pub const LIVENESS_PATH: &str = "/test";

/// Resolution errors
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("No service endpoint candidates configured")]
    NoCandidates,
}

/// Result of endpoint resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    /// Base URL without trailing slash
    pub base_url: String,
    /// False when no candidate answered and the first one was taken as fallback
    pub live: bool,
}

/// Liveness check against one candidate base
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_live(&self, base_url: &str) -> bool;
}

/// HTTP liveness probe
pub struct HttpProbe {
    http_client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn is_live(&self, base_url: &str) -> bool {
        let url = format!("{}{}", base_url, LIVENESS_PATH);
        match self.http_client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Probe returned non-success status");
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Build the ordered candidate list
///
/// Overrides come first, then defaults. Blank entries are dropped, trailing
/// slashes trimmed, and duplicates removed keeping the first occurrence.
pub fn candidate_list(overrides: &[String], defaults: &[&str]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let all = overrides
        .iter()
        .map(String::as_str)
        .chain(defaults.iter().copied());

    for raw in all {
        let base = raw.trim().trim_end_matches('/');
        if base.is_empty() || candidates.iter().any(|c| c == base) {
            continue;
        }
        candidates.push(base.to_string());
    }
    candidates
}

/// Probe candidates sequentially and return the first live one
pub async fn resolve_endpoint(
    candidates: &[String],
    probe: &dyn LivenessProbe,
) -> Result<ResolvedEndpoint, ResolveError> {
    let first = candidates.first().ok_or(ResolveError::NoCandidates)?;

    for candidate in candidates {
        if probe.is_live(candidate).await {
            info!(base_url = %candidate, "Resolved live service endpoint");
            return Ok(ResolvedEndpoint {
                base_url: candidate.clone(),
                live: true,
            });
        }
        debug!(base_url = %candidate, "Candidate not live");
    }

    warn!(
        base_url = %first,
        candidates = candidates.len(),
        "No candidate answered liveness probe, falling back to first"
    );
    Ok(ResolvedEndpoint {
        base_url: first.clone(),
        live: false,
    })
}
