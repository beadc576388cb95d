//! Single-hop HEAD probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use url::Url;

use crate::error_handling::{categorize_reqwest_error, ResolveError};

/// What one HEAD request told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Reason phrase, e.g. `Moved Permanently`.
    pub reason: String,
    pub location: Option<String>,
}

/// Issues a single header-only request without following redirects.
#[async_trait]
pub trait HeadProbe: Send + Sync {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<ProbeResponse, ResolveError>;
}

/// [`HeadProbe`] over a shared `reqwest` client built with redirects disabled.
#[derive(Clone)]
pub struct ReqwestProbe {
    client: Arc<reqwest::Client>,
}

impl ReqwestProbe {
    pub fn new(client: Arc<reqwest::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HeadProbe for ReqwestProbe {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<ProbeResponse, ResolveError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ResolveError::Upstream {
                url: url.to_string(),
                kind: categorize_reqwest_error(&e),
                message: e.to_string(),
            })?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(ProbeResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            location,
        })
    }
}

/// Scripted probe for unit tests: fixed responses per URL, counted calls.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error_handling::UpstreamKind;

    #[derive(Default)]
    pub(crate) struct ScriptedProbe {
        responses: Mutex<HashMap<String, ProbeResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(&self, url: &str, status: u16, location: Option<&str>) -> &Self {
            let reason = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string();
            self.responses.lock().unwrap().insert(
                url.to_string(),
                ProbeResponse {
                    status,
                    reason,
                    location: location.map(str::to_string),
                },
            );
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HeadProbe for ScriptedProbe {
        async fn head(&self, url: &Url, _timeout: Duration) -> Result<ProbeResponse, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| ResolveError::Upstream {
                    url: url.to_string(),
                    kind: UpstreamKind::Connect,
                    message: "connection refused".into(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::UpstreamKind;
    use crate::initialization::init_probe_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe() -> ReqwestProbe {
        ReqwestProbe::new(init_probe_client("LinkSentinel/test").expect("client"))
    }

    #[tokio::test]
    async fn test_head_reports_status_reason_and_location() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old/"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new/"))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/old/", server.uri())).unwrap();
        let response = probe().head(&url, Duration::from_secs(2)).await.unwrap();
        assert_eq!(response.status, 301);
        assert_eq!(response.reason, "Moved Permanently");
        assert_eq!(response.location.as_deref(), Some("/new/"));
    }

    #[tokio::test]
    async fn test_head_timeout_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow/", server.uri())).unwrap();
        let err = probe()
            .head(&url, Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            ResolveError::Upstream { kind, .. } => assert_eq!(kind, UpstreamKind::Timeout),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
