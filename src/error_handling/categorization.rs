//! Error categorization.

use super::types::UpstreamKind;

/// Categorizes a `reqwest::Error` into an `UpstreamKind`.
///
/// Status errors never reach here: probes never call `error_for_status`, so any
/// HTTP answer is a status, not an error.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> UpstreamKind {
    if error.is_timeout() {
        UpstreamKind::Timeout
    } else if error.is_connect() {
        UpstreamKind::Connect
    } else if error.is_builder() {
        UpstreamKind::Builder
    } else if error.is_body() || error.is_decode() {
        UpstreamKind::Body
    } else if error.is_request() {
        UpstreamKind::Request
    } else {
        UpstreamKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_connect() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .expect("client should build");
        let err = client
            .head("http://127.0.0.1:9/")
            .send()
            .await
            .expect_err("request to a closed port should fail");
        let kind = categorize_reqwest_error(&err);
        assert_ne!(kind, UpstreamKind::Builder);
    }

    #[test]
    fn test_builder_error() {
        let client = reqwest::Client::new();
        let err = client
            .head("not a url")
            .build()
            .expect_err("relative URL should not build");
        assert_eq!(categorize_reqwest_error(&err), UpstreamKind::Builder);
    }
}
