//! Shared `ureq` agents and error mapping.
//!
//! Release metadata and archive downloads use different timeout profiles:
//! metadata is small and should answer quickly, while archives may stream
//! for a long time once the server has started responding.

use std::sync::OnceLock;
use std::time::Duration;

/// Global timeout for the release metadata request.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for connecting and receiving response headers on downloads.
///
/// The body itself is streamed without a deadline.
pub const DOWNLOAD_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Agent for short, single-shot API requests.
pub(crate) fn metadata_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(METADATA_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Agent for streamed archive downloads.
pub(crate) fn download_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(DOWNLOAD_RESPONSE_TIMEOUT))
            .timeout_recv_response(Some(DOWNLOAD_RESPONSE_TIMEOUT))
            .timeout_recv_body(None)
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Describe a `ureq` failure for inclusion in an error message.
pub(crate) fn describe_ureq_error(err: &ureq::Error) -> String {
    match err {
        ureq::Error::StatusCode(code) => format!("server responded with HTTP {code}"),
        ureq::Error::Timeout(_) => format!("request timed out ({err})"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(404, "HTTP 404")]
    #[case::server_error(502, "HTTP 502")]
    fn status_errors_mention_the_code(#[case] code: u16, #[case] expected: &str) {
        let description = describe_ureq_error(&ureq::Error::StatusCode(code));
        assert!(description.contains(expected), "got: {description}");
    }

    #[test]
    fn download_timeout_outlasts_metadata_timeout() {
        assert!(DOWNLOAD_RESPONSE_TIMEOUT > METADATA_TIMEOUT);
    }
}
