//! Blocking client for the ChargeIO payment API.
//!
//! # Overview
//! A [`Gateway`] holds the site and credentials and exposes one method per
//! API operation (authorize, charge, refund, transfer, ...). Each call
//! performs exactly one HTTP exchange through a [`Transport`] and returns a
//! typed resource such as [`Charge`] or [`Transfer`]. Resources keep a
//! handle to their gateway, so follow-on operations read naturally:
//!
//! ```no_run
//! use chargeio::{Gateway, GatewayConfig};
//! use serde_json::json;
//!
//! # fn main() -> chargeio::Result<()> {
//! let gateway = Gateway::new(GatewayConfig::new("m_user", "secret"))?;
//! let mut charge = gateway.authorize(1256, json!({"method": {"type": "card", "number": "4242424242424242"}}))?;
//! if charge.errors().is_empty() {
//!     charge.capture(1256, json!({"reference": "order 42"}))?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Failures come in two tiers. 401/404 responses return `Err`
//!   ([`Error::Unauthorized`], [`Error::ResourceNotFound`]). Declines and
//!   validation failures come back as a normal resource whose `errors()`
//!   map is non-empty; check it after every mutating call.
//! - Response fields are server-driven. Every resource derefs to a
//!   [`Record`], a JSON attribute bag with generic `get`/`set`, and adds
//!   typed accessors only for the fields it relies on.
//! - The gateway is immutable and `Send + Sync`; clone it freely.

pub mod amount;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod params;
pub mod record;
mod request;
pub mod response;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use amount::{Amount, Money};
pub use client::{Gateway, GatewayBuilder};
pub use collection::Collection;
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use message::{ErrorMap, Level, Message};
pub use params::Params;
pub use record::{Record, Resource};
pub use response::{process_list_response, process_response};
pub use transport::Transport;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{
    Account, AchAccount, Bank, BankAccount, Card, Charge, Credit, Event, Merchant, Refund,
    Signature, Token, Transaction, Transfer,
};
