//! The gateway: configuration plus one typed method per API operation.
//!
//! # Design
//! `Gateway` is an immutable, cheaply clonable handle (`Arc` inside). Every
//! record it returns keeps a clone so follow-on operations such as
//! `charge.capture(..)` reach the same site with the same credentials.
//!
//! Each operation builds a `Request`, executes it through the configured
//! `Transport`, and hands the response to the processor in `response`.
//! One call, one blocking exchange; there is no retry or locking here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::ser::SerializeStruct;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::amount::Amount;
use crate::collection::Collection;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::params::{merge_amount, to_params, Params};
use crate::record::Resource;
use crate::request::Request;
use crate::response::{process_list_response, process_response};
use crate::transport::Transport;
use crate::types::{
    Account, AchAccount, Bank, BankAccount, Card, Charge, Credit, Event, Merchant, Refund,
    Signature, Token, Transaction, Transfer,
};

/// Results key used by most list endpoints.
pub const RESULTS_KEY: &str = "results";

/// Results key of the events listing.
pub const EVENTS_KEY: &str = "events";

/// Default signature format for `sign`.
pub const DEFAULT_SIGNATURE_FORMAT: &str = "JSIGNATURE_NATIVE";

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    site: String,
    url: Url,
    auth_user: String,
    authorization: String,
    user_agent: Option<String>,
    raise_on_bad_request: bool,
    transport: Arc<dyn Transport>,
}

impl Gateway {
    /// Build a gateway using the default blocking transport.
    #[cfg(feature = "ureq")]
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let transport = Arc::new(crate::transport::UreqTransport::new(config.timeout()));
        Self::with_transport(config, transport)
    }

    /// Build a gateway that executes requests through `transport`.
    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let auth_user = config
            .auth_user
            .clone()
            .ok_or_else(|| Error::Config("auth_user not set".into()))?;
        let auth_password = config
            .auth_password
            .clone()
            .ok_or_else(|| Error::Config("auth_password not set".into()))?;

        let site = config.site().to_string();
        let url = Url::parse(&site)
            .and_then(|base| base.join("/v1/"))
            .map_err(|err| Error::Config(format!("invalid site `{site}`: {err}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid site `{site}`")));
        }

        let credentials = BASE64_STANDARD.encode(format!("{auth_user}:{auth_password}"));

        Ok(Self {
            inner: Arc::new(Inner {
                site,
                url,
                auth_user,
                authorization: format!("Basic {credentials}"),
                user_agent: config.user_agent,
                raise_on_bad_request: config.raise_on_bad_request,
                transport,
            }),
        })
    }

    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn site(&self) -> &str {
        &self.inner.site
    }

    /// Resolved API root, `{site}/v1/`.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn auth_user(&self) -> &str {
        &self.inner.auth_user
    }

    pub(crate) fn raises_on_bad_request(&self) -> bool {
        self.inner.raise_on_bad_request
    }

    pub(crate) fn prepare(&self, request: Request) -> Result<HttpRequest> {
        request.build(
            &self.inner.url,
            &self.inner.authorization,
            self.inner.user_agent.as_deref(),
        )
    }

    fn exchange(&self, request: Request) -> Result<Option<HttpResponse>> {
        let request = self.prepare(request)?;
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.inner.transport.execute(&request)?;
        match &response {
            Some(r) => debug!(method = %request.method, url = %request.url, status = r.status, "received response"),
            None => debug!(method = %request.method, url = %request.url, "no response"),
        }
        Ok(response)
    }

    fn single<R: Resource>(&self, request: Request) -> Result<R> {
        self.single_opt(request)?
            .ok_or_else(|| Error::Decode(format!("empty response for {}", R::NAME)))
    }

    fn single_opt<R: Resource>(&self, request: Request) -> Result<Option<R>> {
        let response = self.exchange(request)?;
        process_response(self, response)
    }

    fn list<R: Resource>(&self, request: Request, key: &str) -> Result<Collection<R>> {
        let response = self.exchange(request)?;
        Ok(process_list_response(self, response, key)?
            .unwrap_or_else(|| Collection::unpaged(Vec::new())))
    }

    fn find<R: Resource>(&self, path: &str, id: &str, params: impl Serialize) -> Result<R> {
        self.single(Request::get(path).id(id).query(to_params(params)?))
    }

    /// POST with an amount, relaying `ip_address` as a header.
    fn post_amount<R: Resource>(
        &self,
        request: Request,
        amount: &impl Amount,
        mut params: Params,
    ) -> Result<R> {
        let request = request.relay_ip(&mut params);
        merge_amount(&mut params, amount);
        self.single(request.json(params))
    }

    fn post_relayed<R: Resource>(&self, request: Request, mut params: Params) -> Result<R> {
        let request = request.relay_ip(&mut params);
        self.single(request.json(params))
    }

    // Merchant and accounts

    pub fn merchant(&self, params: impl Serialize) -> Result<Merchant> {
        self.single(Request::get("merchant").query(to_params(params)?))
    }

    pub fn update_merchant(&self, params: impl Serialize) -> Result<Merchant> {
        self.single(Request::put("merchant").json(to_params(params)?))
    }

    /// Card merchant accounts of the merchant.
    pub fn accounts(&self, params: impl Serialize) -> Result<Vec<Account>> {
        Ok(self.merchant(params)?.all_accounts())
    }

    pub fn primary_account(&self, params: impl Serialize) -> Result<Option<Account>> {
        Ok(self.merchant(params)?.primary_account())
    }

    pub fn update_account(&self, account_id: &str, params: impl Serialize) -> Result<Account> {
        self.single(Request::put("accounts").id(account_id).json(to_params(params)?))
    }

    pub fn update_bank_account(
        &self,
        account_id: &str,
        params: impl Serialize,
    ) -> Result<BankAccount> {
        self.single(
            Request::put("bank-accounts")
                .id(account_id)
                .json(to_params(params)?),
        )
    }

    pub fn update_ach_account(&self, account_id: &str, params: impl Serialize) -> Result<AchAccount> {
        self.single(
            Request::put("ach-accounts")
                .id(account_id)
                .json(to_params(params)?),
        )
    }

    // Tokens

    /// One-time token. Sent form-encoded rather than as JSON.
    pub fn create_token(&self, params: impl Serialize) -> Result<Token> {
        self.single(Request::post("tokens").form(to_params(params)?))
    }

    pub fn find_token(&self, token_id: &str, params: impl Serialize) -> Result<Token> {
        self.find("tokens", token_id, params)
    }

    // Saved cards

    pub fn create_card(&self, params: impl Serialize) -> Result<Card> {
        self.single(Request::post("cards").json(to_params(params)?))
    }

    pub fn find_card(&self, card_id: &str, params: impl Serialize) -> Result<Card> {
        self.find("cards", card_id, params)
    }

    pub fn cards(&self, params: impl Serialize) -> Result<Collection<Card>> {
        self.list(Request::get("cards").query(to_params(params)?), RESULTS_KEY)
    }

    /// `None` when the server answers 204.
    pub fn delete_card(&self, card_id: &str) -> Result<Option<Card>> {
        self.single_opt(Request::delete("cards").id(card_id))
    }

    // Saved banks

    pub fn create_bank(&self, params: impl Serialize) -> Result<Bank> {
        self.single(Request::post("banks").json(to_params(params)?))
    }

    pub fn find_bank(&self, bank_id: &str, params: impl Serialize) -> Result<Bank> {
        self.find("banks", bank_id, params)
    }

    pub fn banks(&self, params: impl Serialize) -> Result<Collection<Bank>> {
        self.list(Request::get("banks").query(to_params(params)?), RESULTS_KEY)
    }

    pub fn delete_bank(&self, bank_id: &str) -> Result<Option<Bank>> {
        self.single_opt(Request::delete("banks").id(bank_id))
    }

    // Charges

    /// Authorize only; capture later with `Charge::capture`.
    pub fn authorize(&self, amount: impl Amount, params: impl Serialize) -> Result<Charge> {
        let mut params = to_params(params)?;
        params.insert("auto_capture".into(), Value::Bool(false));
        self.post_amount(Request::post("charges"), &amount, params)
    }

    pub fn charge(&self, amount: impl Amount, params: impl Serialize) -> Result<Charge> {
        self.post_amount(Request::post("charges"), &amount, to_params(params)?)
    }

    pub fn void(&self, charge_id: &str, params: impl Serialize) -> Result<Charge> {
        self.post_relayed(
            Request::post("charges").id(charge_id).action("void"),
            to_params(params)?,
        )
    }

    pub fn capture(
        &self,
        charge_id: &str,
        amount: impl Amount,
        params: impl Serialize,
    ) -> Result<Charge> {
        self.post_amount(
            Request::post("charges").id(charge_id).action("capture"),
            &amount,
            to_params(params)?,
        )
    }

    /// Refund against a charge. Passing a `method` turns it into a credit to
    /// that payment method.
    pub fn refund(
        &self,
        charge_id: &str,
        amount: impl Amount,
        params: impl Serialize,
    ) -> Result<Refund> {
        self.post_amount(
            Request::post("charges").id(charge_id).action("refund"),
            &amount,
            to_params(params)?,
        )
    }

    /// Standalone credit to a payment method.
    pub fn credit(&self, amount: impl Amount, params: impl Serialize) -> Result<Credit> {
        self.post_amount(Request::post("credits"), &amount, to_params(params)?)
    }

    pub fn find_charge(&self, charge_id: &str, params: impl Serialize) -> Result<Charge> {
        self.find("charges", charge_id, params)
    }

    pub fn charges(&self, params: impl Serialize) -> Result<Collection<Charge>> {
        self.list(Request::get("charges").query(to_params(params)?), RESULTS_KEY)
    }

    pub fn find_refund(&self, refund_id: &str, params: impl Serialize) -> Result<Refund> {
        self.find("refunds", refund_id, params)
    }

    pub fn find_credit(&self, credit_id: &str, params: impl Serialize) -> Result<Credit> {
        self.find("credits", credit_id, params)
    }

    /// Every transaction kind (charges, refunds, credits) in one listing.
    pub fn transactions(&self, params: impl Serialize) -> Result<Collection<Transaction>> {
        self.list(
            Request::get("transactions").query(to_params(params)?),
            RESULTS_KEY,
        )
    }

    // Signatures

    /// Attach a captured signature (and optional gratuity) to a transaction.
    pub fn sign(
        &self,
        transaction_id: &str,
        data: &str,
        gratuity: Option<&dyn Amount>,
        format: &str,
        params: impl Serialize,
    ) -> Result<Charge> {
        let mut params = to_params(params)?;
        params.insert("data".into(), Value::from(data));
        params.insert("format".into(), Value::from(format));
        if let Some(gratuity) = gratuity {
            params.insert("gratuity".into(), Value::from(gratuity.minor_units()));
        }
        self.post_relayed(
            Request::post("transactions").id(transaction_id).action("sign"),
            params,
        )
    }

    pub fn find_signature(&self, signature_id: &str, params: impl Serialize) -> Result<Signature> {
        self.find("signatures", signature_id, params)
    }

    // ACH transfers

    pub fn transfer(&self, amount: impl Amount, params: impl Serialize) -> Result<Transfer> {
        self.post_amount(Request::post("transfers"), &amount, to_params(params)?)
    }

    pub fn find_transfer(&self, transfer_id: &str, params: impl Serialize) -> Result<Transfer> {
        self.find("transfers", transfer_id, params)
    }

    pub fn transfers(&self, params: impl Serialize) -> Result<Collection<Transfer>> {
        self.list(
            Request::get("transfers").query(to_params(params)?),
            RESULTS_KEY,
        )
    }

    pub fn cancel_transfer(&self, transfer_id: &str, params: impl Serialize) -> Result<Transfer> {
        self.post_relayed(
            Request::post("transfers").id(transfer_id).action("cancel"),
            to_params(params)?,
        )
    }

    // Events

    pub fn find_event(&self, event_id: &str, params: impl Serialize) -> Result<Event> {
        self.find("events", event_id, params)
    }

    pub fn events(&self, params: impl Serialize) -> Result<Collection<Event>> {
        self.list(Request::get("events").query(to_params(params)?), EVENTS_KEY)
    }

    // Test mode

    /// Delete every test-mode object of the merchant.
    pub fn purge_test_data(&self) -> Result<()> {
        let response = self.exchange(Request::delete("test-data"))?;
        process_response::<crate::record::Record>(self, response).map(|_| ())
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("site", &self.inner.site)
            .field("url", &self.inner.url.as_str())
            .field("auth_user", &self.inner.auth_user)
            .finish_non_exhaustive()
    }
}

/// Only `site` and `url` are ever serialized.
impl Serialize for Gateway {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Gateway", 2)?;
        state.serialize_field("site", &self.inner.site)?;
        state.serialize_field("url", self.inner.url.as_str())?;
        state.end()
    }
}

/// Fluent construction of a `Gateway`.
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl GatewayBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.config.site = Some(site.into());
        self
    }

    pub fn auth_user(mut self, user: impl Into<String>) -> Self {
        self.config.auth_user = Some(user.into());
        self
    }

    pub fn auth_password(mut self, password: impl Into<String>) -> Self {
        self.config.auth_password = Some(password.into());
        self
    }

    /// Only applies to the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(agent.into());
        self
    }

    pub fn raise_on_bad_request(mut self, enabled: bool) -> Self {
        self.config.raise_on_bad_request = enabled;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        match self.transport {
            Some(transport) => Gateway::with_transport(self.config, transport),
            None => self.default_transport(),
        }
    }

    #[cfg(feature = "ureq")]
    fn default_transport(self) -> Result<Gateway> {
        Gateway::new(self.config)
    }

    #[cfg(not(feature = "ureq"))]
    fn default_transport(self) -> Result<Gateway> {
        Err(Error::Config(
            "no transport configured and the `ureq` feature is disabled".into(),
        ))
    }
}
