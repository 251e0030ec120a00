//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::client::Gateway;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Replays scripted responses in order and records every request.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Transport for RecordingTransport {
    fn execute(&self, request: &HttpRequest) -> Result<Option<HttpResponse>> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .map(Some)
            .ok_or_else(|| Error::Transport("connection refused".into()))
    }
}

pub(crate) fn test_gateway_with(config: GatewayConfig) -> Gateway {
    Gateway::with_transport(config, Arc::new(RecordingTransport::default())).unwrap()
}

pub(crate) fn test_gateway() -> Gateway {
    test_gateway_with(GatewayConfig::new("user", "pass"))
}

/// Gateway answering with `responses`, plus a handle to inspect requests.
pub(crate) fn scripted_gateway(responses: Vec<HttpResponse>) -> (Gateway, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new(responses));
    let gateway =
        Gateway::with_transport(GatewayConfig::new("user", "pass"), transport.clone()).unwrap();
    (gateway, transport)
}
