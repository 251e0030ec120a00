//! In-memory stand-in for the ChargeIO API.
//!
//! Implements enough of `/v1` for client end-to-end tests: basic auth,
//! the merchant and its accounts, tokens, saved cards and banks, charges
//! with capture/void/refund, credits, signatures, ACH transfers, events and
//! the test-data purge. Field validation failures answer 400 and business
//! rule failures 422, both with a `messages` body like the real service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Form, Json, Router,
};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

pub const TEST_USER: &str = "m_test";
pub const TEST_PASSWORD: &str = "test_secret";
pub const MERCHANT_ID: &str = "m_test";
pub const PRIMARY_ACCOUNT_ID: &str = "acct_primary";
pub const SECONDARY_ACCOUNT_ID: &str = "acct_secondary";
pub const PRIMARY_BANK_ACCOUNT_ID: &str = "ba_primary";
pub const PRIMARY_ACH_ACCOUNT_ID: &str = "ach_primary";

/// Relayed client addresses with this prefix are refused with 401.
pub const BLOCKED_IP_PREFIX: &str = "95.";

const RELAYED_IP_HEADER: &str = "x-relayed-ip-address";
const DEFAULT_PAGE_SIZE: usize = 25;

pub type Entity = Map<String, Value>;

#[derive(Default)]
pub struct Store {
    merchant: Entity,
    tokens: Vec<Entity>,
    consumed_tokens: HashSet<String>,
    cards: Vec<Entity>,
    banks: Vec<Entity>,
    charges: Vec<Entity>,
    refunds: Vec<Entity>,
    credits: Vec<Entity>,
    transfers: Vec<Entity>,
    signatures: Vec<Entity>,
    events: Vec<Entity>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    credentials: Arc<String>,
}

pub fn app() -> Router {
    app_with_credentials(TEST_USER, TEST_PASSWORD)
}

pub fn app_with_credentials(user: &str, password: &str) -> Router {
    let store = Store {
        merchant: seed_merchant(),
        ..Store::default()
    };
    let state = AppState {
        db: Arc::new(RwLock::new(store)),
        credentials: Arc::new(format!("{user}:{password}")),
    };

    Router::new()
        .route("/v1/merchant", get(get_merchant).put(update_merchant))
        .route("/v1/accounts/{id}", put(update_account))
        .route("/v1/bank-accounts/{id}", put(update_bank_account))
        .route("/v1/ach-accounts/{id}", put(update_ach_account))
        .route("/v1/tokens", post(create_token))
        .route("/v1/tokens/{id}", get(get_token))
        .route("/v1/cards", get(list_cards).post(create_card))
        .route("/v1/cards/{id}", get(get_card).delete(delete_card))
        .route("/v1/banks", get(list_banks).post(create_bank))
        .route("/v1/banks/{id}", get(get_bank).delete(delete_bank))
        .route("/v1/charges", get(list_charges).post(create_charge))
        .route("/v1/charges/{id}", get(get_charge))
        .route("/v1/charges/{id}/capture", post(capture_charge))
        .route("/v1/charges/{id}/void", post(void_charge))
        .route("/v1/charges/{id}/refund", post(refund_charge))
        .route("/v1/refunds/{id}", get(get_refund))
        .route("/v1/credits", post(create_credit))
        .route("/v1/credits/{id}", get(get_credit))
        .route("/v1/transactions", get(list_transactions))
        .route("/v1/transactions/{id}/sign", post(sign_transaction))
        .route("/v1/signatures/{id}", get(get_signature))
        .route("/v1/transfers", get(list_transfers).post(create_transfer))
        .route("/v1/transfers/{id}", get(get_transfer))
        .route("/v1/transfers/{id}/cancel", post(cancel_transfer))
        .route("/v1/events", get(list_events))
        .route("/v1/events/{id}", get(get_event))
        .route("/v1/test-data", delete(purge_test_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64_STANDARD.decode(encoded).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .is_some_and(|credentials| credentials == *state.credentials);
    if !authorized {
        warn!(uri = %request.uri(), "rejected credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    debug!(method = %request.method(), uri = %request.uri(), "request");
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn ok(entity: Entity) -> Response {
    (StatusCode::OK, Json(Value::Object(entity))).into_response()
}

fn ok_with_messages(mut entity: Entity, messages: Vec<Value>) -> Response {
    entity.insert("messages".into(), Value::Array(messages));
    ok(entity)
}

fn message(level: &str, code: &str, context: Option<&str>, text: &str) -> Value {
    let mut msg = json!({"level": level, "code": code, "message": text});
    if let Some(context) = context {
        msg["context"] = Value::from(context);
    }
    msg
}

/// Field validation failure.
fn invalid(context: &str, code: &str, text: &str) -> Response {
    let body = json!({"messages": [message("error", code, Some(context), text)]});
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Business rule failure, not tied to a field.
fn rejected(code: &str, text: &str) -> Response {
    let body = json!({"messages": [message("error", code, None, text)]});
    (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
}

fn not_found(entity: &str, id: &str) -> Response {
    let body = json!({"messages": [message(
        "error",
        "resource_not_found",
        Some(&format!("{entity}[{id}]")),
        "Requested resource not found",
    )]});
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

fn unavailable() -> Response {
    rejected(
        "not_valid_for_auto_capture",
        "The operation is unavailable for the transaction",
    )
}

fn wrong_status() -> Response {
    rejected(
        "not_valid_for_transaction_status",
        "The operation cannot be completed in the current status",
    )
}

fn currency_mismatch() -> Response {
    rejected(
        "currency_mismatch",
        "Specified currency does not match the transaction's currency",
    )
}

// ---------------------------------------------------------------------------
// Entity helpers
// ---------------------------------------------------------------------------

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn str_field<'a>(entity: &'a Entity, key: &str) -> Option<&'a str> {
    entity.get(key).and_then(Value::as_str)
}

fn int_field(entity: &Entity, key: &str) -> Option<i64> {
    entity.get(key).and_then(Value::as_i64)
}

fn find<'a>(items: &'a [Entity], id: &str) -> Option<&'a Entity> {
    items.iter().find(|e| str_field(e, "id") == Some(id))
}

fn find_mut<'a>(items: &'a mut [Entity], id: &str) -> Option<&'a mut Entity> {
    items.iter_mut().find(|e| str_field(e, "id") == Some(id))
}

fn copy_optional(from: &Entity, to: &mut Entity, keys: &[&str]) {
    for key in keys {
        if let Some(value) = from.get(*key).filter(|v| !v.is_null()) {
            to.insert((*key).to_string(), value.clone());
        }
    }
}

fn tail(value: &str, count: usize) -> String {
    let skip = value.chars().count().saturating_sub(count);
    value.chars().skip(skip).collect()
}

fn mask(number: &str) -> String {
    let hidden = number.chars().count().saturating_sub(4);
    format!("{}{}", "*".repeat(hidden), tail(number, 4))
}

fn fingerprint(parts: &[&str]) -> String {
    let hash = parts
        .iter()
        .flat_map(|p| p.bytes())
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    format!("fp_{hash:016x}")
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn record_event(store: &mut Store, kind: &str, data: &Entity) {
    let mut event = Entity::new();
    event.insert("id".into(), Value::from(new_id("ev")));
    event.insert("type".into(), Value::from(kind));
    event.insert("data".into(), Value::Object(data.clone()));
    store.events.push(event);
}

fn seed_merchant() -> Entity {
    let merchant = json!({
        "id": MERCHANT_ID,
        "name": "Test Merchant",
        "status": "ACTIVE",
        "accounts": [
            {"id": PRIMARY_ACCOUNT_ID, "name": "Primary", "primary": true, "currency": "USD"},
            {"id": SECONDARY_ACCOUNT_ID, "name": "Secondary", "primary": false, "currency": "USD"}
        ],
        "bank_accounts": [
            {"id": PRIMARY_BANK_ACCOUNT_ID, "name": "Operating", "primary": true}
        ],
        "ach_accounts": [
            {"id": PRIMARY_ACH_ACCOUNT_ID, "name": "ACH", "primary": true}
        ]
    });
    match merchant {
        Value::Object(map) => map,
        _ => Entity::new(),
    }
}

/// Page a listing the way the API does.
fn page(items: Vec<Entity>, query: &HashMap<String, String>, key: &str) -> Response {
    let current = query
        .get("page")
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(1);
    let size = query
        .get("page_size")
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let total = items.len();
    let results: Vec<Value> = items
        .into_iter()
        .skip((current - 1).saturating_mul(size))
        .take(size)
        .map(Value::Object)
        .collect();
    let mut body = Entity::new();
    body.insert("page".into(), Value::from(current));
    body.insert("page_size".into(), Value::from(size));
    body.insert("total_entries".into(), Value::from(total));
    body.insert(key.into(), Value::Array(results));
    ok(body)
}

fn filter_account(items: &[Entity], query: &HashMap<String, String>) -> Vec<Entity> {
    items
        .iter()
        .filter(|e| match query.get("account_id") {
            Some(account) => str_field(e, "account_id") == Some(account.as_str()),
            None => true,
        })
        .cloned()
        .collect()
}

fn ip_blocked(headers: &HeaderMap) -> bool {
    headers
        .get(RELAYED_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ip| ip.starts_with(BLOCKED_IP_PREFIX))
}

// ---------------------------------------------------------------------------
// Payment methods
// ---------------------------------------------------------------------------

/// A validated payment method plus the informational messages it produced.
struct Method {
    public: Entity,
    messages: Vec<Value>,
}

fn is_bank(raw: &Entity) -> bool {
    str_field(raw, "type") == Some("bank") || raw.contains_key("routing_number")
}

/// Validate raw card or bank fields. `prefix` is the dotted context of the
/// parameter (`method`, `card`, or empty for top-level fields).
fn validate_method(raw: &Entity, prefix: &str) -> Result<Method, Response> {
    let ctx = |field: &str| {
        if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        }
    };

    if is_bank(raw) {
        let routing = as_text(raw.get("routing_number"));
        let account = as_text(raw.get("account_number"));
        if routing.is_empty() {
            return Err(invalid(&ctx("routing_number"), "bank_routing_number_blank", "Routing number cannot be blank"));
        }
        if account.is_empty() {
            return Err(invalid(&ctx("account_number"), "bank_account_number_blank", "Account number cannot be blank"));
        }
        let mut public = Entity::new();
        public.insert("type".into(), Value::from("bank"));
        public.insert("routing_number".into(), Value::from(format!("******{}", tail(&routing, 3))));
        public.insert("account_number".into(), Value::from(format!("******{}", tail(&account, 4))));
        copy_optional(raw, &mut public, &["account_type", "name"]);
        public.insert("fingerprint".into(), Value::from(fingerprint(&[&routing, &account])));
        return Ok(Method { public, messages: Vec::new() });
    }

    let number = as_text(raw.get("number"));
    if number.is_empty() {
        return Err(invalid(&ctx("number"), "card_number_blank", "Card number cannot be blank"));
    }
    if number.len() < 12 || number.len() > 19 || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(&ctx("number"), "card_number_invalid", "Card number is invalid"));
    }
    if let Some(month) = raw.get("exp_month") {
        let valid = as_text(Some(month))
            .parse::<u32>()
            .is_ok_and(|m| (1..=12).contains(&m));
        if !valid {
            return Err(invalid(&ctx("exp_month"), "card_exp_month_invalid", "Expiration month is invalid"));
        }
    }

    let mut messages = Vec::new();
    if raw.contains_key("cvv") {
        messages.push(message("info", "card_cvv_matched", None, "CVV matched"));
    }
    if raw.contains_key("address1") {
        messages.push(message("info", "card_avs_address_matched", None, "Address matched"));
    }
    if raw.contains_key("postal_code") {
        messages.push(message("info", "card_avs_postal_code_matched", None, "Postal code matched"));
    }

    let mut public = Entity::new();
    public.insert("type".into(), Value::from("card"));
    public.insert("number".into(), Value::from(mask(&number)));
    copy_optional(raw, &mut public, &["card_type", "exp_month", "exp_year", "name", "postal_code", "email_address"]);
    public.insert("fingerprint".into(), Value::from(fingerprint(&[&number])));
    Ok(Method { public, messages })
}

/// Resolve a payment method reference: a one-time token, a saved card or
/// bank, or raw fields.
fn resolve_method(store: &mut Store, params: &Entity) -> Result<Option<Method>, Response> {
    let (key, value) = match ["method", "card", "card_id", "bank_id"]
        .iter()
        .find_map(|k| params.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
    {
        Some(found) => found,
        None => return Ok(None),
    };

    match value {
        Value::Object(raw) => validate_method(raw, key).map(Some),
        Value::String(id) => {
            if let Some(token) = find(&store.tokens, id) {
                if !store.consumed_tokens.insert(id.clone()) {
                    return Err(not_found("TokenEntity", id));
                }
                let public = token
                    .get("method")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                return Ok(Some(Method { public, messages: Vec::new() }));
            }
            if let Some(saved) = find(&store.cards, id).or_else(|| find(&store.banks, id)) {
                let mut public = saved.clone();
                public.remove("id");
                return Ok(Some(Method { public, messages: Vec::new() }));
            }
            Err(not_found("PaymentMethodEntity", id))
        }
        _ => Err(invalid(key, "method_invalid", "Payment method is invalid")),
    }
}

// ---------------------------------------------------------------------------
// Merchant and accounts
// ---------------------------------------------------------------------------

async fn get_merchant(State(state): State<AppState>) -> Response {
    ok(state.db.read().await.merchant.clone())
}

const READ_ONLY: &[&str] = &["id", "accounts", "bank_accounts", "ach_accounts", "messages"];

async fn update_merchant(State(state): State<AppState>, Json(params): Json<Entity>) -> Response {
    let mut store = state.db.write().await;
    for (key, value) in params {
        if !READ_ONLY.contains(&key.as_str()) {
            store.merchant.insert(key, value);
        }
    }
    ok(store.merchant.clone())
}

async fn update_nested_account(state: AppState, key: &str, entity: &str, id: String, params: Entity) -> Response {
    let mut store = state.db.write().await;
    let Some(Value::Array(accounts)) = store.merchant.get_mut(key) else {
        return not_found(entity, &id);
    };
    let Some(account) = accounts
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|a| str_field(a, "id") == Some(id.as_str()))
    else {
        return not_found(entity, &id);
    };
    for (k, v) in params {
        if !matches!(k.as_str(), "id" | "merchant_id" | "messages") {
            account.insert(k, v);
        }
    }
    ok(account.clone())
}

async fn update_account(State(state): State<AppState>, Path(id): Path<String>, Json(params): Json<Entity>) -> Response {
    update_nested_account(state, "accounts", "MerchantAccountEntity", id, params).await
}

async fn update_bank_account(State(state): State<AppState>, Path(id): Path<String>, Json(params): Json<Entity>) -> Response {
    update_nested_account(state, "bank_accounts", "BankAccountEntity", id, params).await
}

async fn update_ach_account(State(state): State<AppState>, Path(id): Path<String>, Json(params): Json<Entity>) -> Response {
    update_nested_account(state, "ach_accounts", "AchAccountEntity", id, params).await
}

// ---------------------------------------------------------------------------
// Tokens, cards, banks
// ---------------------------------------------------------------------------

async fn create_token(State(state): State<AppState>, Form(form): Form<HashMap<String, String>>) -> Response {
    let raw: Entity = form.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
    let method = match validate_method(&raw, "") {
        Ok(method) => method,
        Err(response) => return response,
    };
    let mut token = Entity::new();
    token.insert("id".into(), Value::from(new_id("tok")));
    token.insert("type".into(), method.public.get("type").cloned().unwrap_or(Value::Null));
    token.insert("method".into(), Value::Object(method.public));
    state.db.write().await.tokens.push(token.clone());
    ok(token)
}

async fn get_token(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.tokens, &id) {
        Some(token) => ok(token.clone()),
        None => not_found("TokenEntity", &id),
    }
}

/// Save a card or bank from raw fields or a one-time `token_id`.
async fn save_method(state: AppState, params: Entity, prefix: &str) -> Response {
    let mut store = state.db.write().await;
    let method = match params.get("token_id").and_then(Value::as_str) {
        Some(token_id) => {
            let mut by_token = Entity::new();
            by_token.insert("method".into(), Value::from(token_id));
            match resolve_method(&mut store, &by_token) {
                Ok(Some(method)) => method,
                Ok(None) => return invalid("token_id", "token_invalid", "Token is invalid"),
                Err(response) => return response,
            }
        }
        None => match validate_method(&params, "") {
            Ok(method) => method,
            Err(response) => return response,
        },
    };
    let mut saved = method.public;
    saved.insert("id".into(), Value::from(new_id(prefix)));
    if prefix == "card" {
        store.cards.push(saved.clone());
    } else {
        store.banks.push(saved.clone());
    }
    ok(saved)
}

async fn create_card(State(state): State<AppState>, Json(params): Json<Entity>) -> Response {
    save_method(state, params, "card").await
}

async fn get_card(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.cards, &id) {
        Some(card) => ok(card.clone()),
        None => not_found("CardEntity", &id),
    }
}

async fn list_cards(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    page(store.cards.clone(), &query, "results")
}

async fn delete_card(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut store = state.db.write().await;
    let before = store.cards.len();
    store.cards.retain(|c| str_field(c, "id") != Some(id.as_str()));
    if store.cards.len() == before {
        return not_found("CardEntity", &id);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn create_bank(State(state): State<AppState>, Json(params): Json<Entity>) -> Response {
    save_method(state, params, "bank").await
}

async fn get_bank(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.banks, &id) {
        Some(bank) => ok(bank.clone()),
        None => not_found("BankEntity", &id),
    }
}

async fn list_banks(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    page(store.banks.clone(), &query, "results")
}

/// Unlike cards, a deleted bank is echoed back.
async fn delete_bank(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut store = state.db.write().await;
    match store.banks.iter().position(|b| str_field(b, "id") == Some(id.as_str())) {
        Some(index) => ok(store.banks.remove(index)),
        None => not_found("BankEntity", &id),
    }
}

// ---------------------------------------------------------------------------
// Charges, refunds, credits
// ---------------------------------------------------------------------------

fn currency_of(params: &Entity) -> String {
    str_field(params, "currency").unwrap_or("USD").to_string()
}

async fn create_charge(State(state): State<AppState>, headers: HeaderMap, Json(params): Json<Entity>) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let amount = int_field(&params, "amount").unwrap_or(0);
    if amount <= 0 {
        return invalid("amount", "amount_invalid", "Amount must be greater than zero");
    }

    let mut store = state.db.write().await;
    let method = match resolve_method(&mut store, &params) {
        Ok(Some(method)) => method,
        Ok(None) => return invalid("method", "method_blank", "Payment method cannot be blank"),
        Err(response) => return response,
    };

    let mut charge = Entity::new();
    charge.insert("id".into(), Value::from(new_id("ch")));
    charge.insert("type".into(), Value::from("CHARGE"));
    charge.insert("status".into(), Value::from("AUTHORIZED"));
    charge.insert("amount".into(), Value::from(amount));
    charge.insert("currency".into(), Value::from(currency_of(&params)));
    charge.insert(
        "auto_capture".into(),
        Value::from(params.get("auto_capture").and_then(Value::as_bool).unwrap_or(true)),
    );
    charge.insert("amount_refunded".into(), Value::from(0));
    charge.insert("refunds".into(), Value::Array(Vec::new()));
    charge.insert(
        "account_id".into(),
        Value::from(str_field(&params, "account_id").unwrap_or(PRIMARY_ACCOUNT_ID)),
    );
    copy_optional(&params, &mut charge, &["reference"]);
    charge.insert("method".into(), Value::Object(method.public));

    store.charges.push(charge.clone());
    record_event(&mut store, "charge.created", &charge);
    ok_with_messages(charge, method.messages)
}

async fn get_charge(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.charges, &id) {
        Some(charge) => ok(charge.clone()),
        None => not_found("TransactionEntity", &id),
    }
}

async fn list_charges(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    page(filter_account(&store.charges, &query), &query, "results")
}

async fn capture_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Entity>,
) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut store = state.db.write().await;
    let Some(charge) = find_mut(&mut store.charges, &id) else {
        return not_found("TransactionEntity", &id);
    };
    if charge.get("auto_capture").and_then(Value::as_bool) == Some(true) {
        return unavailable();
    }
    if str_field(charge, "status") != Some("AUTHORIZED") {
        return wrong_status();
    }
    if params.contains_key("currency") && str_field(charge, "currency") != Some(currency_of(&params).as_str()) {
        return currency_mismatch();
    }
    let authorized = int_field(charge, "amount").unwrap_or(0);
    let amount = int_field(&params, "amount").unwrap_or(authorized);
    if amount > authorized {
        return rejected("exceeds_authorized_amount", "Amount to capture exceeds the authorized amount");
    }
    charge.insert("status".into(), Value::from("SETTLED"));
    charge.insert("amount".into(), Value::from(amount));
    if let Some(reference) = params.get("reference") {
        charge.insert("capture_reference".into(), reference.clone());
    }
    let charge = charge.clone();
    record_event(&mut store, "charge.captured", &charge);
    ok(charge)
}

async fn void_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Entity>,
) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut store = state.db.write().await;
    let Some(charge) = find_mut(&mut store.charges, &id) else {
        return not_found("TransactionEntity", &id);
    };
    if charge.get("auto_capture").and_then(Value::as_bool) == Some(true) {
        return unavailable();
    }
    if str_field(charge, "status") != Some("AUTHORIZED") {
        return wrong_status();
    }
    charge.insert("status".into(), Value::from("VOIDED"));
    if let Some(reference) = params.get("reference") {
        charge.insert("void_reference".into(), reference.clone());
    }
    let charge = charge.clone();
    record_event(&mut store, "charge.voided", &charge);
    ok(charge)
}

async fn refund_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Entity>,
) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut store = state.db.write().await;
    let Some(charge) = find(&store.charges, &id).cloned() else {
        return not_found("TransactionEntity", &id);
    };
    if str_field(&charge, "currency") != Some(currency_of(&params).as_str()) {
        return currency_mismatch();
    }
    let remaining = int_field(&charge, "amount").unwrap_or(0) - int_field(&charge, "amount_refunded").unwrap_or(0);
    let amount = int_field(&params, "amount").unwrap_or(remaining);
    if amount > remaining {
        return rejected("refund_exceeds_transaction", "Amount of refund exceeds remaining transaction balance");
    }

    let credit_method = if params.contains_key("method") {
        match resolve_method(&mut store, &params) {
            Ok(method) => method,
            Err(response) => return response,
        }
    } else {
        None
    };

    let mut refund = Entity::new();
    refund.insert("id".into(), Value::from(new_id("rf")));
    refund.insert(
        "type".into(),
        Value::from(if credit_method.is_some() { "CREDIT" } else { "REFUND" }),
    );
    refund.insert("status".into(), Value::from("COMPLETED"));
    refund.insert("amount".into(), Value::from(amount));
    refund.insert("currency".into(), Value::from(currency_of(&params)));
    refund.insert("charge_id".into(), Value::from(id.clone()));
    copy_optional(&charge, &mut refund, &["account_id"]);
    copy_optional(&params, &mut refund, &["reference"]);
    if let Some(method) = credit_method {
        refund.insert("method".into(), Value::Object(method.public));
    }

    if let Some(charge) = find_mut(&mut store.charges, &id) {
        let refunded = int_field(charge, "amount_refunded").unwrap_or(0) + amount;
        charge.insert("amount_refunded".into(), Value::from(refunded));
        if let Some(Value::Array(refunds)) = charge.get_mut("refunds") {
            refunds.push(Value::Object(refund.clone()));
        }
    }
    store.refunds.push(refund.clone());
    record_event(&mut store, "charge.refunded", &refund);
    ok(refund)
}

async fn get_refund(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.refunds, &id) {
        Some(refund) => ok(refund.clone()),
        None => not_found("RefundEntity", &id),
    }
}

async fn create_credit(State(state): State<AppState>, headers: HeaderMap, Json(params): Json<Entity>) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let amount = int_field(&params, "amount").unwrap_or(0);
    if amount <= 0 {
        return invalid("amount", "amount_invalid", "Amount must be greater than zero");
    }
    let mut store = state.db.write().await;
    let method = match resolve_method(&mut store, &params) {
        Ok(Some(method)) => method,
        Ok(None) => return invalid("method", "method_blank", "Payment method cannot be blank"),
        Err(response) => return response,
    };
    let mut credit = Entity::new();
    credit.insert("id".into(), Value::from(new_id("cr")));
    credit.insert("type".into(), Value::from("CREDIT"));
    credit.insert("status".into(), Value::from("COMPLETED"));
    credit.insert("amount".into(), Value::from(amount));
    credit.insert("currency".into(), Value::from(currency_of(&params)));
    credit.insert(
        "account_id".into(),
        Value::from(str_field(&params, "account_id").unwrap_or(PRIMARY_ACCOUNT_ID)),
    );
    copy_optional(&params, &mut credit, &["reference"]);
    credit.insert("method".into(), Value::Object(method.public));
    store.credits.push(credit.clone());
    record_event(&mut store, "credit.created", &credit);
    ok(credit)
}

async fn get_credit(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.credits, &id) {
        Some(credit) => ok(credit.clone()),
        None => not_found("CreditEntity", &id),
    }
}

async fn list_transactions(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    let mut all = filter_account(&store.charges, &query);
    all.extend(filter_account(&store.refunds, &query));
    all.extend(filter_account(&store.credits, &query));
    page(all, &query, "results")
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

async fn sign_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<Entity>,
) -> Response {
    let data = str_field(&params, "data").unwrap_or_default().to_string();
    if data.is_empty() {
        return invalid("data", "signature_data_blank", "Signature data cannot be blank");
    }
    let mut store = state.db.write().await;
    let mut signature = Entity::new();
    signature.insert("id".into(), Value::from(new_id("sig")));
    signature.insert("transaction_id".into(), Value::from(id.clone()));
    signature.insert("data".into(), Value::from(data));
    copy_optional(&params, &mut signature, &["format"]);
    let signature_id = signature.get("id").cloned().unwrap_or(Value::Null);

    let Some(charge) = find_mut(&mut store.charges, &id) else {
        return not_found("TransactionEntity", &id);
    };
    charge.insert("signature_id".into(), signature_id);
    copy_optional(&params, charge, &["gratuity"]);
    let charge = charge.clone();
    store.signatures.push(signature);
    ok(charge)
}

async fn get_signature(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.signatures, &id) {
        Some(signature) => ok(signature.clone()),
        None => not_found("SignatureEntity", &id),
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

async fn create_transfer(State(state): State<AppState>, headers: HeaderMap, Json(params): Json<Entity>) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let amount = int_field(&params, "amount").unwrap_or(0);
    if amount <= 0 {
        return invalid("amount", "amount_invalid", "Amount must be greater than zero");
    }
    let kind = str_field(&params, "type").unwrap_or("DEBIT").to_ascii_uppercase();
    if kind != "DEBIT" && kind != "CREDIT" {
        return invalid("type", "transfer_type_invalid", "Transfer type is invalid");
    }
    let mut store = state.db.write().await;
    let method = match resolve_method(&mut store, &params) {
        Ok(Some(method)) => method,
        Ok(None) => return invalid("method", "method_blank", "Payment method cannot be blank"),
        Err(response) => return response,
    };

    let mut transfer = Entity::new();
    transfer.insert("id".into(), Value::from(new_id("tr")));
    transfer.insert("type".into(), Value::from(kind));
    transfer.insert("status".into(), Value::from("CAPTURED"));
    transfer.insert("amount".into(), Value::from(amount));
    transfer.insert("currency".into(), Value::from(currency_of(&params)));
    transfer.insert(
        "account_id".into(),
        Value::from(str_field(&params, "account_id").unwrap_or(PRIMARY_BANK_ACCOUNT_ID)),
    );
    copy_optional(&params, &mut transfer, &["reference"]);
    transfer.insert("method".into(), Value::Object(method.public));
    store.transfers.push(transfer.clone());
    record_event(&mut store, "transfer.created", &transfer);
    ok(transfer)
}

async fn get_transfer(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.transfers, &id) {
        Some(transfer) => ok(transfer.clone()),
        None => not_found("TransferEntity", &id),
    }
}

async fn list_transfers(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    page(filter_account(&store.transfers, &query), &query, "results")
}

async fn cancel_transfer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Entity>,
) -> Response {
    if ip_blocked(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut store = state.db.write().await;
    let Some(transfer) = find_mut(&mut store.transfers, &id) else {
        return not_found("TransferEntity", &id);
    };
    if str_field(transfer, "status") != Some("CAPTURED") {
        return wrong_status();
    }
    transfer.insert("status".into(), Value::from("CANCELED"));
    if let Some(reference) = params.get("reference") {
        transfer.insert("cancel_reference".into(), reference.clone());
    }
    let transfer = transfer.clone();
    record_event(&mut store, "transfer.canceled", &transfer);
    ok(transfer)
}

// ---------------------------------------------------------------------------
// Events and test data
// ---------------------------------------------------------------------------

async fn list_events(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = state.db.read().await;
    page(store.events.clone(), &query, "events")
}

async fn get_event(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let store = state.db.read().await;
    match find(&store.events, &id) {
        Some(event) => ok(event.clone()),
        None => not_found("EventEntity", &id),
    }
}

async fn purge_test_data(State(state): State<AppState>) -> Response {
    let mut store = state.db.write().await;
    let merchant = std::mem::take(&mut store.merchant);
    *store = Store {
        merchant,
        ..Store::default()
    };
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(mask("4242424242424242"), "************4242");
        assert_eq!(mask("12"), "12");
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(&["4242"]), fingerprint(&["4242"]));
        assert_ne!(fingerprint(&["4242"]), fingerprint(&["4243"]));
    }

    #[test]
    fn card_validation_reports_context() {
        let raw = entity(json!({"number": ""}));
        assert!(validate_method(&raw, "method").is_err());

        let raw = entity(json!({"number": "4242424242424242", "cvv": 123, "address1": "123 Main St"}));
        let method = validate_method(&raw, "method").ok().unwrap();
        assert_eq!(method.public["number"], "************4242");
        assert_eq!(method.messages.len(), 2);
        assert!(method.public.get("cvv").is_none());
    }

    #[test]
    fn bank_validation_masks_numbers() {
        let raw = entity(json!({"type": "bank", "routing_number": "111000025", "account_number": "1234567890", "account_type": "CHECKING"}));
        let method = validate_method(&raw, "").ok().unwrap();
        assert_eq!(method.public["routing_number"], "******025");
        assert_eq!(method.public["account_number"], "******7890");
        assert_eq!(method.public["account_type"], "CHECKING");
    }

    #[test]
    fn tokens_are_single_use() {
        let mut store = Store::default();
        store.tokens.push(entity(json!({"id": "tok_1", "method": {"type": "card"}})));
        let params = entity(json!({"method": "tok_1"}));
        assert!(resolve_method(&mut store, &params).is_ok());
        assert!(resolve_method(&mut store, &params).is_err());
    }

    #[test]
    fn seeded_merchant_has_primary_accounts() {
        let merchant = seed_merchant();
        assert_eq!(merchant["accounts"][0]["primary"], true);
        assert_eq!(merchant["bank_accounts"][0]["id"], PRIMARY_BANK_ACCOUNT_ID);
    }
}
