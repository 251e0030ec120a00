//! Request parameter handling.
//!
//! Callers pass parameters as anything that serializes to a JSON object
//! (`serde_json::json!` literals, a `Params` map, or their own structs).
//! Mutation endpoints send them as a JSON body; GET endpoints and token
//! creation flatten them into `key[child]=value` pairs.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::amount::Amount;
use crate::error::{Error, Result};

pub type Params = Map<String, Value>;

/// Parameter promoted to the relay header instead of being sent in the body.
pub const IP_ADDRESS_PARAM: &str = "ip_address";

/// Header carrying the end customer's address on transaction calls.
pub const RELAYED_IP_HEADER: &str = "X-Relayed-IP-Address";

/// Serialize caller parameters. `null` (e.g. `()` or `None`) means no
/// parameters.
pub fn to_params(params: impl Serialize) -> Result<Params> {
    match serde_json::to_value(params).map_err(|e| Error::Encode(e.to_string()))? {
        Value::Null => Ok(Params::new()),
        Value::Object(map) => Ok(map),
        other => Err(Error::Encode(format!(
            "parameters must serialize to an object, got {other}"
        ))),
    }
}

/// Remove `ip_address` so it can travel as a header.
pub(crate) fn take_relayed_ip(params: &mut Params) -> Option<String> {
    match params.shift_remove(IP_ADDRESS_PARAM)? {
        Value::Null => None,
        Value::String(ip) => Some(ip),
        other => Some(other.to_string()),
    }
}

/// Merge `amount` and `currency`, overriding caller-supplied values.
pub(crate) fn merge_amount(params: &mut Params, amount: &impl Amount) {
    params.insert("amount".into(), Value::from(amount.minor_units()));
    params.insert("currency".into(), Value::from(amount.currency()));
}

/// Flatten to form pairs: nested objects become `parent[child]`, arrays
/// `key[]`, nulls are dropped.
pub(crate) fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((key, b.to_string())),
        Value::Number(n) => out.push((key, n.to_string())),
        Value::String(s) => out.push((key, s.clone())),
        Value::Array(items) => {
            for item in items {
                flatten_into(format!("{key}[]"), item, out);
            }
        }
        Value::Object(map) => {
            for (child, item) in map {
                flatten_into(format!("{key}[{child}]"), item, out);
            }
        }
    }
}

/// `application/x-www-form-urlencoded` body.
pub(crate) fn form_encode(params: &Params) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(flatten(params))
        .finish()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::amount::Money;

    #[test]
    fn unit_and_none_mean_no_params() {
        assert!(to_params(()).unwrap().is_empty());
        assert!(to_params(None::<Params>).unwrap().is_empty());
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(matches!(to_params(vec![1, 2]).unwrap_err(), Error::Encode(_)));
        assert!(matches!(to_params("x").unwrap_err(), Error::Encode(_)));
    }

    #[test]
    fn structs_serialize_to_params() {
        #[derive(Serialize)]
        struct Page {
            page: u32,
            page_size: u32,
        }
        let params = to_params(Page { page: 2, page_size: 10 }).unwrap();
        assert_eq!(params["page"], 2);
        assert_eq!(params["page_size"], 10);
    }

    #[test]
    fn relayed_ip_is_removed() {
        let mut params = to_params(json!({"ip_address": "216.239.32.4", "reference": "r"})).unwrap();
        assert_eq!(take_relayed_ip(&mut params).as_deref(), Some("216.239.32.4"));
        assert!(!params.contains_key("ip_address"));
        assert_eq!(take_relayed_ip(&mut params), None);
    }

    #[test]
    fn amount_overrides_caller_values() {
        let mut params = to_params(json!({"amount": 1, "currency": "EUR"})).unwrap();
        merge_amount(&mut params, &Money::new(90, "GBP"));
        assert_eq!(params["amount"], 90);
        assert_eq!(params["currency"], "GBP");

        merge_amount(&mut params, &100);
        assert_eq!(params["currency"], "USD");
    }

    #[test]
    fn flatten_nests_with_brackets() {
        let params = to_params(json!({
            "type": "card",
            "number": "4242424242424242",
            "exp_month": 10,
            "card": {"cvv": 123},
            "tags": ["a", "b"],
            "skip": null
        }))
        .unwrap();
        assert_eq!(
            flatten(&params),
            vec![
                ("type".to_string(), "card".to_string()),
                ("number".to_string(), "4242424242424242".to_string()),
                ("exp_month".to_string(), "10".to_string()),
                ("card[cvv]".to_string(), "123".to_string()),
                ("tags[]".to_string(), "a".to_string()),
                ("tags[]".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn form_encoding_escapes_values() {
        let params = to_params(json!({"name": "Some Customer", "email_address": "a@b.com"})).unwrap();
        assert_eq!(form_encode(&params), "name=Some+Customer&email_address=a%40b.com");
    }
}
