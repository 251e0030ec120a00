//! Turning one HTTP exchange into a typed error or a live record.
//!
//! # Design
//! The processor owns the two-tier failure model:
//! - 401 and 404 (and 400 when the gateway opts in) become `Err`.
//! - Every other status is decoded. Validation and business-rule failures
//!   arrive as a normal body whose `messages` contain error-level entries,
//!   and surface through `Record::errors`.
//!
//! An absent response, a 204, or an empty body means "nothing to return"
//! and yields `Ok(None)`.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::Gateway;
use crate::collection::Collection;
use crate::error::{Error, Result, GENERIC_ERROR_MESSAGE, UNAUTHORIZED_MESSAGE};
use crate::http::HttpResponse;
use crate::message::Message;
use crate::record::{Record, Resource, MESSAGES_KEY};

/// Process a single-object response into `R`.
pub fn process_response<R: Resource>(
    gateway: &Gateway,
    response: Option<HttpResponse>,
) -> Result<Option<R>> {
    let Some(body) = checked_body(gateway, response)? else {
        return Ok(None);
    };
    let attributes = decode_object(&body)?;
    let record = Record::from_response(attributes, gateway.clone())?;
    if record.has_errors() {
        debug!(resource = R::NAME, errors = ?record.errors(), "response carries errors");
    }
    Ok(Some(R::from_record(record)))
}

/// Process a list response, reading entries from `results_key`.
///
/// Page metadata (`page`, `page_size`, `total_entries`) is used when the
/// body has a `page` key; otherwise the collection is unpaged.
pub fn process_list_response<R: Resource>(
    gateway: &Gateway,
    response: Option<HttpResponse>,
    results_key: &str,
) -> Result<Option<Collection<R>>> {
    let Some(body) = checked_body(gateway, response)? else {
        return Ok(None);
    };
    let attributes = decode_object(&body)?;

    let mut list = match attributes.get("page") {
        Some(page) if !page.is_null() => Collection::new(
            page.as_u64().unwrap_or(1),
            count(&attributes, "page_size"),
            count(&attributes, "total_entries"),
        ),
        _ => Collection::unpaged(Vec::new()),
    };

    match attributes.get(results_key) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let Value::Object(attrs) = item else {
                    return Err(Error::Decode(format!(
                        "`{results_key}` entry is not an object: {item}"
                    )));
                };
                let record = Record::from_response(attrs.clone(), gateway.clone())?;
                list.push(R::from_record(record));
            }
        }
        Some(other) => {
            return Err(Error::Decode(format!(
                "`{results_key}` must be an array, got {other}"
            )))
        }
    }

    Ok(Some(list))
}

/// Apply the status rules and hand back the body when there is one to
/// decode.
fn checked_body(gateway: &Gateway, response: Option<HttpResponse>) -> Result<Option<String>> {
    let Some(response) = response else {
        return Ok(None);
    };
    match response.status {
        204 => Ok(None),
        401 => {
            warn!(status = 401, "request unauthorized");
            Err(Error::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()))
        }
        404 => {
            let err = not_found(&response);
            warn!(status = 404, error = %err, "resource not found");
            Err(err)
        }
        400 if gateway.raises_on_bad_request() => {
            let err = invalid_request(&response);
            warn!(status = 400, error = %err, "invalid request");
            Err(err)
        }
        _ if response.has_empty_body() => Ok(None),
        _ => Ok(Some(response.body)),
    }
}

fn decode_object(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Decode(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
    }
}

fn count(attributes: &Map<String, Value>, key: &str) -> u64 {
    attributes.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First message of an error body, if the body has one.
fn first_message(response: &HttpResponse) -> Option<Message> {
    let body: Value = serde_json::from_str(&response.body).ok()?;
    let first = body.get(MESSAGES_KEY)?.as_array()?.first()?;
    Message::from_value(first).ok()
}

fn not_found(response: &HttpResponse) -> Error {
    let payload = first_message(response)
        .and_then(|msg| msg.context().map(str::to_string))
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
    Error::ResourceNotFound(payload)
}

fn invalid_request(response: &HttpResponse) -> Error {
    let payload = first_message(response)
        .map(|msg| msg.message().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
    Error::InvalidRequest(payload)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::testing::{test_gateway, test_gateway_with};

    fn respond(status: u16, body: Value) -> Option<HttpResponse> {
        Some(HttpResponse::new(status, body.to_string()))
    }

    #[rstest]
    #[case(None)]
    #[case(Some(HttpResponse::new(204, "")))]
    #[case(Some(HttpResponse::new(200, "")))]
    #[case(Some(HttpResponse::new(204, r#"{"id":"ignored"}"#)))]
    fn nothing_to_decode_yields_none(#[case] response: Option<HttpResponse>) {
        let gw = test_gateway();
        assert!(process_response::<Record>(&gw, response.clone())
            .unwrap()
            .is_none());
        assert!(process_list_response::<Record>(&gw, response, "results")
            .unwrap()
            .is_none());
    }

    #[rstest]
    #[case("")]
    #[case("not json")]
    #[case(r#"{"messages":[{"context":"x"}]}"#)]
    fn unauthorized_ignores_body(#[case] body: &str) {
        let gw = test_gateway();
        let err = process_response::<Record>(&gw, Some(HttpResponse::new(401, body))).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(ref m) if m == UNAUTHORIZED_MESSAGE));
        let err = process_list_response::<Record>(&gw, Some(HttpResponse::new(401, body)), "results")
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn not_found_carries_first_context() {
        let body = json!({"messages": [
            {"context": "TransactionEntity[EnqVCIdWEeKekHS8VXVKFg]", "code": "resource_not_found",
             "level": "error", "message": "Requested resource not found"},
            {"context": "second", "level": "error", "message": "ignored"}
        ]});
        let err = process_response::<Record>(&test_gateway(), respond(404, body)).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceNotFound(ref ctx) if ctx == "TransactionEntity[EnqVCIdWEeKekHS8VXVKFg]"
        ));
    }

    #[rstest]
    #[case("")]
    #[case("<html>not found</html>")]
    #[case(r#"{"error":"gone"}"#)]
    #[case(r#"{"messages":[]}"#)]
    #[case(r#"{"messages":[{"level":"error","message":"no context"}]}"#)]
    fn not_found_falls_back_to_generic(#[case] body: &str) {
        let err = process_response::<Record>(&test_gateway(), Some(HttpResponse::new(404, body)))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(ref m) if m == GENERIC_ERROR_MESSAGE));
    }

    #[test]
    fn success_builds_record_with_messages() {
        let body = json!({
            "id": "ch_1", "amount": 1256, "status": "AUTHORIZED",
            "messages": [
                {"level": "info", "code": "card_cvv_matched", "message": "CVV matched"},
                {"level": "info", "code": "card_avs_address_matched", "message": "Address matched"}
            ]
        });
        let record = process_response::<Record>(&test_gateway(), respond(200, body))
            .unwrap()
            .unwrap();
        assert_eq!(record.id().as_deref(), Some("ch_1"));
        assert_eq!(record.messages().len(), 2);
        assert_eq!(record.messages()[1].code(), "card_avs_address_matched");
        assert!(record.errors().is_empty());
    }

    #[rstest]
    #[case(200)]
    #[case(201)]
    #[case(400)]
    #[case(422)]
    fn validation_failures_are_data(#[case] status: u16) {
        let body = json!({"messages": [
            {"level": "error", "context": "card.number", "code": "card_number_blank",
             "message": "Card number cannot be blank"}
        ]});
        let record = process_response::<Record>(&test_gateway(), respond(status, body))
            .unwrap()
            .unwrap();
        assert!(record.has_errors());
        assert_eq!(
            record.errors().get("card.number").unwrap(),
            ["Card number cannot be blank"]
        );
    }

    #[rstest]
    #[case(200)]
    #[case(400)]
    fn null_message_fields_stay_data(#[case] status: u16) {
        let body = json!({"messages": [
            {"level": "error", "code": null, "context": "card.number",
             "message": "Card number cannot be blank"}
        ]});
        let record = process_response::<Record>(&test_gateway(), respond(status, body))
            .unwrap()
            .unwrap();
        assert_eq!(record.messages()[0].code(), "");
        assert_eq!(
            record.errors().get("card.number").unwrap(),
            ["Card number cannot be blank"]
        );
    }

    #[test]
    fn not_found_with_null_code_keeps_context() {
        let body = json!({"messages": [
            {"level": "error", "code": null, "context": "TokenEntity[abc]", "message": null}
        ]});
        let err = process_response::<Record>(&test_gateway(), respond(404, body)).unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(ref ctx) if ctx == "TokenEntity[abc]"));
    }

    #[test]
    fn bad_request_raises_when_enabled() {
        let gw = test_gateway_with(GatewayConfig {
            raise_on_bad_request: true,
            ..GatewayConfig::new("user", "pass")
        });
        let body = json!({"messages": [{"level": "error", "message": "Malformed JSON"}]});
        let err = process_response::<Record>(&gw, respond(400, body)).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(ref m) if m == "Malformed JSON"));

        let err = process_response::<Record>(&gw, Some(HttpResponse::new(400, "garbage"))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(ref m) if m == GENERIC_ERROR_MESSAGE));
    }

    #[rstest]
    #[case("not json")]
    #[case("[1,2]")]
    #[case("\"text\"")]
    fn non_object_bodies_fail_to_decode(#[case] body: &str) {
        let err = process_response::<Record>(&test_gateway(), Some(HttpResponse::new(200, body)))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn list_with_page_metadata() {
        let body = json!({
            "page": 1, "page_size": 25, "total_entries": 53,
            "results": [{"id": "a"}, {"id": "b"}, {"id": "c"}]
        });
        let list = process_list_response::<Record>(&test_gateway(), respond(200, body), "results")
            .unwrap()
            .unwrap();
        assert!(list.is_paginated());
        assert_eq!(list.current_page(), 1);
        assert_eq!(list.total_pages(), 3);
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].id().as_deref(), Some("c"));
    }

    #[test]
    fn list_page_object_still_counts_as_paginated() {
        let body = json!({
            "page": {}, "page_size": 25, "total_entries": 53,
            "results": [{"id": "a"}, {"id": "b"}, {"id": "c"}]
        });
        let list = process_list_response::<Record>(&test_gateway(), respond(200, body), "results")
            .unwrap()
            .unwrap();
        assert_eq!(list.current_page(), 1);
        assert_eq!(list.total_pages(), 3);
        assert_eq!(list.iter().count(), 3);
    }

    #[test]
    fn list_without_page_is_plain_sequence() {
        let body = json!({"events": [{"id": "ev_1"}], "results": [{"id": "x"}]});
        let list = process_list_response::<Record>(&test_gateway(), respond(200, body), "events")
            .unwrap()
            .unwrap();
        assert!(!list.is_paginated());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id().as_deref(), Some("ev_1"));
    }

    #[test]
    fn list_missing_results_key_is_empty() {
        let body = json!({"page": 4, "page_size": 25, "total_entries": 53});
        let list = process_list_response::<Record>(&test_gateway(), respond(200, body), "results")
            .unwrap()
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(list.current_page(), 4);
    }

    #[test]
    fn list_entries_must_be_objects() {
        let body = json!({"results": [1]});
        let err = process_list_response::<Record>(&test_gateway(), respond(200, body), "results")
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
