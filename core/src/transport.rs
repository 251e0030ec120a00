//! The seam between the gateway and the network.
//!
//! # Design
//! The gateway never performs I/O itself. It hands a fully built
//! `HttpRequest` to a `Transport` and processes whatever comes back. The
//! default transport is a blocking `ureq` agent; tests and hosts with their
//! own HTTP stack plug in a different implementation.

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse};

/// Executes one blocking HTTP exchange.
///
/// Implementations must return non-2xx responses as `Ok` data so the
/// response processor can map status codes itself. `Ok(None)` means the
/// exchange produced no response at all and is treated like a 204.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<Option<HttpResponse>>;
}

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "ureq")]
mod ureq_transport {
    use std::time::Duration;

    use tracing::debug;

    use super::Transport;
    use crate::error::{Error, Result};
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    /// Blocking transport backed by a shared `ureq::Agent`.
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new(timeout: Option<Duration>) -> Self {
            let agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .timeout_global(timeout)
                .build()
                .new_agent();
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new(None)
        }
    }

    impl std::fmt::Debug for UreqTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("UreqTransport").finish_non_exhaustive()
        }
    }

    impl Transport for UreqTransport {
        fn execute(&self, request: &HttpRequest) -> Result<Option<HttpResponse>> {
            let url = request.url.as_str();
            let body = request.body.as_deref();

            let result = match (request.method, body) {
                (HttpMethod::Get, _) => with_headers(self.agent.get(url), &request.headers).call(),
                (HttpMethod::Delete, _) => {
                    with_headers(self.agent.delete(url), &request.headers).call()
                }
                (HttpMethod::Post, Some(body)) => {
                    with_headers(self.agent.post(url), &request.headers).send(body.as_bytes())
                }
                (HttpMethod::Post, None) => {
                    with_headers(self.agent.post(url), &request.headers).send_empty()
                }
                (HttpMethod::Put, Some(body)) => {
                    with_headers(self.agent.put(url), &request.headers).send(body.as_bytes())
                }
                (HttpMethod::Put, None) => {
                    with_headers(self.agent.put(url), &request.headers).send_empty()
                }
            };

            let mut response = result.map_err(|err| {
                debug!(method = %request.method, url, error = %err, "HTTP exchange failed");
                Error::Transport(err.to_string())
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|err| Error::Transport(err.to_string()))?;

            Ok(Some(HttpResponse {
                status,
                headers,
                body,
            }))
        }
    }

    fn with_headers<B>(
        mut builder: ureq::RequestBuilder<B>,
        headers: &[(String, String)],
    ) -> ureq::RequestBuilder<B> {
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}
