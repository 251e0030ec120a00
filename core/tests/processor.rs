//! Response processing properties, driven through the public API with a
//! scripted transport instead of a server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chargeio::{
    process_list_response, process_response, Charge, Error, Gateway, GatewayConfig, HttpRequest,
    HttpResponse, Level, Record, Transport,
};
use rstest::rstest;
use serde_json::{json, Value};

/// Answers each request with the next scripted response.
struct Scripted(Mutex<VecDeque<HttpResponse>>);

impl Transport for Scripted {
    fn execute(&self, _request: &HttpRequest) -> chargeio::Result<Option<HttpResponse>> {
        Ok(self.0.lock().unwrap().pop_front())
    }
}

fn gateway_with(responses: Vec<HttpResponse>) -> Gateway {
    let transport = Arc::new(Scripted(Mutex::new(responses.into())));
    Gateway::with_transport(GatewayConfig::new("m_test", "secret"), transport).unwrap()
}

fn gateway() -> Gateway {
    gateway_with(Vec::new())
}

fn single(status: u16, body: &str) -> chargeio::Result<Option<Record>> {
    process_response(&gateway(), Some(HttpResponse::new(status, body)))
}

fn list(status: u16, body: Value) -> chargeio::Result<Option<chargeio::Collection<Record>>> {
    process_list_response(&gateway(), Some(HttpResponse::new(status, body.to_string())), "results")
}

#[rstest]
#[case::absent(None)]
#[case::no_content(Some(HttpResponse::new(204, "")))]
#[case::no_content_with_body(Some(HttpResponse::new(204, r#"{"id":"ignored"}"#)))]
fn no_content_yields_nothing(#[case] response: Option<HttpResponse>) {
    let gw = gateway();
    assert!(process_response::<Record>(&gw, response.clone()).unwrap().is_none());
    assert!(process_list_response::<Record>(&gw, response, "results").unwrap().is_none());
}

#[rstest]
#[case::empty("")]
#[case::malformed("{not json")]
#[case::with_messages(r#"{"messages":[{"level":"error","context":"x","message":"y"}]}"#)]
fn unauthorized_ignores_the_body(#[case] body: &str) {
    let err = single(401, body).unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(
        err.api_message(),
        Some("You do not have permissions to access this resource. Please contact ChargeIO for more information")
    );
}

#[test]
fn not_found_carries_first_message_context() {
    let body = json!({"messages": [
        {"level": "error", "code": "resource_not_found", "context": "TokenEntity[tok_1]", "message": "gone"},
        {"level": "error", "context": "second", "message": "ignored"}
    ]});
    let err = single(404, &body.to_string()).unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound(ref m) if m == "TokenEntity[tok_1]"));
}

#[rstest]
#[case::empty("")]
#[case::html("<html>Not Found</html>")]
#[case::no_messages(r#"{"error":"nope"}"#)]
#[case::empty_messages(r#"{"messages":[]}"#)]
fn not_found_without_messages_is_generic(#[case] body: &str) {
    let err = single(404, body).unwrap_err();
    assert_eq!(
        err.api_message(),
        Some("An error occurred. Please contact ChargeIO for more information")
    );
}

#[test]
fn single_response_exposes_fields_and_messages() {
    let body = json!({
        "id": "ch_1",
        "amount": 1256,
        "status": "AUTHORIZED",
        "messages": [{"level": "info", "code": "card_cvv_matched", "context": "", "message": "CVV matched"}]
    });
    let mut record = single(200, &body.to_string()).unwrap().unwrap();

    assert_eq!(record.id().as_deref(), Some("ch_1"));
    assert_eq!(record.amount(), Some(1256));
    assert_eq!(record.status().as_deref(), Some("AUTHORIZED"));

    record.set("amount", 96).unwrap();
    assert_eq!(record.get::<i64>("amount"), Some(96));

    assert_eq!(record.messages().len(), 1);
    assert_eq!(record.messages()[0].code(), "card_cvv_matched");
    assert_eq!(record.messages()[0].level(), &Level::Info);

    assert!(record.value("messages").is_none());
    assert!(matches!(record.set("messages", json!([])), Err(Error::ReservedAttribute(_))));
    assert!(matches!(record.attribute("missing"), Err(Error::AttributeNotSet(_))));
}

#[test]
fn validation_failures_are_data() {
    let body = json!({"messages": [
        {"level": "error", "context": "card.number", "message": "Card number cannot be blank"},
        {"level": "error", "context": "card.number", "message": "extra"},
        {"level": "warning", "context": "x", "message": "ignored"}
    ]});
    for status in [200, 400, 422] {
        let record = single(status, &body.to_string()).unwrap().unwrap();
        let errors = record.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("card.number").unwrap(),
            ["Card number cannot be blank", "extra"]
        );
        assert!(!errors.contains("x"));
    }
}

#[test]
fn non_error_messages_leave_errors_empty() {
    let body = json!({"id": "ch_1", "messages": [
        {"level": "info", "context": "", "message": "CVV matched"},
        {"level": "warning", "context": "", "message": "AVS unavailable"}
    ]});
    let record = single(200, &body.to_string()).unwrap().unwrap();
    assert!(record.has_messages());
    assert!(record.errors().is_empty());
}

#[test]
fn list_with_object_page_still_paginates() {
    let body = json!({
        "page": {},
        "page_size": 25,
        "total_entries": 53,
        "results": [{"id": "a"}, {"id": "b"}, {"id": "c"}]
    });
    let collection = list(200, body).unwrap().unwrap();
    assert_eq!(collection.total_pages(), 3);
    assert_eq!(collection.len(), 3);
    assert_eq!(
        collection.iter().map(|r| r.id().unwrap()).collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
    assert!(collection.find(|r| r.id().as_deref() == Some("b")).is_some());
}

#[rstest]
#[case::zero_page_size(json!({"page": 1, "page_size": 0, "total_entries": 10, "results": []}), 1)]
#[case::exact(json!({"page": 1, "page_size": 10, "total_entries": 20, "results": []}), 2)]
#[case::unpaged(json!({"results": [{"id": "a"}]}), 1)]
fn total_pages(#[case] body: Value, #[case] expected: u64) {
    assert_eq!(list(200, body).unwrap().unwrap().total_pages(), expected);
}

#[test]
fn list_without_results_key_is_empty() {
    let collection = list(200, json!({"page": 1, "page_size": 25, "total_entries": 0})).unwrap().unwrap();
    assert!(collection.is_empty());
    assert!(collection.is_paginated());
}

#[test]
fn replace_swaps_every_field() {
    let mut charge = gateway_with(vec![HttpResponse::new(200, r#"{"id":"ch_1","status":"AUTHORIZED","amount":100}"#)])
        .find_charge("ch_1", ())
        .unwrap();
    let other = single(200, r#"{"id":"ch_1","status":"SETTLED","captured":true}"#)
        .unwrap()
        .unwrap();

    charge.replace(other);
    assert_eq!(charge.status().as_deref(), Some("SETTLED"));
    assert_eq!(charge.get::<bool>("captured"), Some(true));
    assert!(charge.amount().is_none());
    assert_eq!(charge.gateway().auth_user(), "m_test");
}

#[test]
fn attributes_round_trip() {
    let body = json!({
        "id": "ch_1",
        "amount": 1256,
        "method": {"type": "card", "number": "************4242"},
        "refunds": [],
        "reference": null
    });
    let record = single(200, &body.to_string()).unwrap().unwrap();
    assert_eq!(record.to_json(), body);
    assert_eq!(serde_json::to_value(&record).unwrap(), body);

    let charge: Charge = process_response(&gateway(), Some(HttpResponse::new(200, body.to_string())))
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::to_value(&charge).unwrap(), body);
}

#[rstest]
#[case::array("[1,2]")]
#[case::scalar("42")]
#[case::malformed("{")]
fn non_object_bodies_fail_to_decode(#[case] body: &str) {
    assert!(matches!(single(200, body), Err(Error::Decode(_))));
}
