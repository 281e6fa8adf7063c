//! Shared HTTP plumbing for the gateway clients.

use std::time::Duration;
use voicera_common::config::ClientConfig;
use voicera_common::logging::{generate_trace_id, TRACE_ID_HEADER};

/// Gateway paths the playground talks to.
pub mod endpoints {
    pub const CONTEXTS: &str = "/api/contexts";
    pub const SEARCH: &str = "/api/search";
    pub const UPLOAD: &str = "/api/uploadPdf";
}

/// Build a reqwest client honouring the configured timeout.
///
/// With no timeout configured the request waits on the transport's own limits.
pub fn build_http_client(config: &ClientConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

/// Join a base URL and an absolute path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Attach a fresh trace id to an outgoing request.
pub(crate) fn with_trace(builder: reqwest::RequestBuilder) -> (reqwest::RequestBuilder, String) {
    let trace_id = generate_trace_id();
    (builder.header(TRACE_ID_HEADER, trace_id.as_str()), trace_id)
}
