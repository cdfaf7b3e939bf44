//! JSON-RPC command handlers.
//!
//! Each submodule implements the commands for one category. Identities are
//! 64-char hex strings; amounts are decimal strings (bare JSON integers are
//! accepted when they fit in a u64).

pub mod admin;
pub mod queries;
pub mod staking;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tea_types::{address, Address, Amount};

use crate::rpc::RpcError;

/// Deserialize a required parameter.
pub(crate) fn param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, RpcError> {
    let value = params
        .get(key)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

/// Deserialize an optional parameter. `null` counts as absent.
pub(crate) fn optional_param<T: DeserializeOwned>(
    params: &Value,
    key: &str,
) -> Result<Option<T>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => param(params, key).map(Some),
    }
}

pub(crate) fn address_param(params: &Value, key: &str) -> Result<Address, RpcError> {
    let raw: String = param(params, key)?;
    parse_address(&raw, key)
}

pub(crate) fn address_list_param(params: &Value, key: &str) -> Result<Vec<Address>, RpcError> {
    let raw: Vec<String> = param(params, key)?;
    raw.iter().map(|s| parse_address(s, key)).collect()
}

pub(crate) fn amount_param(params: &Value, key: &str) -> Result<Amount, RpcError> {
    let value = params
        .get(key)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    parse_amount(value, key)
}

pub(crate) fn amount_list_param(params: &Value, key: &str) -> Result<Vec<Amount>, RpcError> {
    let values: Vec<Value> = param(params, key)?;
    values.iter().map(|v| parse_amount(v, key)).collect()
}

/// Amounts go out as decimal strings so u128 survives JSON.
pub(crate) fn amount_json(amount: Amount) -> Value {
    Value::String(amount.to_string())
}

fn parse_address(raw: &str, key: &str) -> Result<Address, RpcError> {
    address::parse(raw).map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

fn parse_amount(value: &Value, key: &str) -> Result<Amount, RpcError> {
    match value {
        Value::String(s) => s
            .parse::<Amount>()
            .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}"))),
        Value::Number(n) => n
            .as_u64()
            .map(Amount::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key}: not a non-negative integer"))),
        _ => Err(RpcError::invalid_params(&format!(
            "{key}: expected decimal string"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_forms() {
        let params = json!({"a": "340282366920938463463374607431768211455", "b": 12, "c": -1, "d": true});
        assert_eq!(amount_param(&params, "a").expect("string"), u128::MAX);
        assert_eq!(amount_param(&params, "b").expect("number"), 12);
        assert_eq!(amount_param(&params, "c").unwrap_err().code, -32602);
        assert_eq!(amount_param(&params, "d").unwrap_err().code, -32602);
        assert_eq!(amount_param(&params, "missing").unwrap_err().code, -32602);
    }

    #[test]
    fn test_address_params() {
        let hex = "ab".repeat(32);
        let params = json!({"who": hex, "list": [hex, "zz"]});
        assert_eq!(address_param(&params, "who").expect("address"), [0xab; 32]);
        assert!(address_list_param(&params, "list").is_err());
    }

    #[test]
    fn test_optional_param() {
        let params = json!({"x": null, "y": 5});
        assert_eq!(optional_param::<u64>(&params, "x").expect("null"), None);
        assert_eq!(optional_param::<u64>(&params, "y").expect("value"), Some(5));
        assert_eq!(optional_param::<u64>(&params, "z").expect("absent"), None);
    }
}
