//! Building `HttpRequest` values for the API.
//!
//! # Design
//! A `Request` names an endpoint relative to the API root plus its
//! parameters. `build` resolves it against the gateway's root URL and adds
//! the headers every call carries. Nothing here performs I/O.

use url::Url;

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::params::{flatten, form_encode, take_relayed_ip, Params, RELAYED_IP_HEADER};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Empty,
    Json(Params),
    Form(Params),
}

#[derive(Debug, Clone)]
pub(crate) struct Request {
    method: HttpMethod,
    path: String,
    id: Option<String>,
    action: Option<String>,
    query: Params,
    body: Body,
    headers: Vec<(String, String)>,
}

impl Request {
    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            id: None,
            action: None,
            query: Params::new(),
            body: Body::Empty,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Append the resource id as the last path segment.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sub-resource action after the id, e.g. `charges/{id}/void`.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn query(mut self, params: Params) -> Self {
        self.query = params;
        self
    }

    pub fn json(mut self, params: Params) -> Self {
        self.body = Body::Json(params);
        self
    }

    pub fn form(mut self, params: Params) -> Self {
        self.body = Body::Form(params);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Move `ip_address` out of `params` into the relay header.
    pub fn relay_ip(self, params: &mut Params) -> Self {
        match take_relayed_ip(params) {
            Some(ip) => self.header(RELAYED_IP_HEADER, ip),
            None => self,
        }
    }

    pub fn build(
        self,
        api_root: &Url,
        authorization: &str,
        user_agent: Option<&str>,
    ) -> Result<HttpRequest> {
        let mut url = api_root.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("`{api_root}` cannot be a base URL")))?;
            segments.pop_if_empty();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));
            if let Some(id) = self.id.as_deref() {
                if id.is_empty() {
                    return Err(Error::AttributeNotSet("id".into()));
                }
                segments.push(id);
            }
            if let Some(action) = self.action.as_deref() {
                segments.push(action);
            }
        }

        let pairs = flatten(&self.query);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let mut headers = vec![
            ("Authorization".to_string(), authorization.to_string()),
            ("Accept".to_string(), JSON_CONTENT_TYPE.to_string()),
        ];
        if let Some(agent) = user_agent {
            headers.push(("User-Agent".to_string(), agent.to_string()));
        }

        let body = match self.body {
            Body::Empty => None,
            Body::Json(params) => {
                headers.push(("content-type".to_string(), JSON_CONTENT_TYPE.to_string()));
                Some(serde_json::to_string(&params).map_err(|e| Error::Encode(e.to_string()))?)
            }
            Body::Form(params) => {
                headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
                Some(form_encode(&params))
            }
        };
        headers.extend(self.headers);

        Ok(HttpRequest {
            method: self.method,
            url: url.into(),
            headers,
            body,
        })
    }
}
