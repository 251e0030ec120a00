//! Gateway settings.
//!
//! `GatewayConfig` is plain serde data so hosts can load it from whatever
//! format they already use. Validation happens in `Gateway::new`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SITE: &str = "https://api.chargeio.com";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base site; `/v1/` is joined onto it. Defaults to `DEFAULT_SITE`.
    pub site: Option<String>,
    pub auth_user: Option<String>,
    pub auth_password: Option<String>,
    /// Overall timeout for one exchange on the default transport.
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    /// Fail with `InvalidRequest` on HTTP 400 instead of decoding the body.
    pub raise_on_bad_request: bool,
}

impl GatewayConfig {
    pub fn new(auth_user: impl Into<String>, auth_password: impl Into<String>) -> Self {
        Self {
            auth_user: Some(auth_user.into()),
            auth_password: Some(auth_password.into()),
            ..Self::default()
        }
    }

    pub fn site(&self) -> &str {
        self.site.as_deref().unwrap_or(DEFAULT_SITE)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("site", &self.site)
            .field("auth_user", &self.auth_user)
            .field("auth_password", &self.auth_password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("raise_on_bad_request", &self.raise_on_bad_request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"auth_user":"m_1","auth_password":"secret"}"#).unwrap();
        assert_eq!(config.site(), DEFAULT_SITE);
        assert_eq!(config.auth_user.as_deref(), Some("m_1"));
        assert!(config.timeout().is_none());
        assert!(!config.raise_on_bad_request);
    }

    #[test]
    fn timeout_converts_to_duration() {
        let config = GatewayConfig {
            timeout_secs: Some(30),
            ..GatewayConfig::new("u", "p")
        };
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn debug_hides_password() {
        let out = format!("{:?}", GatewayConfig::new("m_1", "E39rPZuZ"));
        assert!(out.contains("m_1"));
        assert!(!out.contains("E39rPZuZ"));
    }
}
