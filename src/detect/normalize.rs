//! Trade normalization boundary.
//!
//! Raw records are coerced into canonical [`Trade`]s with missing fields
//! already defaulted by the serde layer (see [`RawTrade`]). The only fatal
//! condition is a payload that is not a trade sequence at all.

use serde_json::Value;

use crate::detect::EngineError;
use crate::models::{RawTrade, Trade};

/// Parse an untyped JSON payload into raw trades.
///
/// Returns [`EngineError::InvalidInput`] when the payload is not an array of
/// objects. Missing or malformed fields inside a record are defaulted, never
/// rejected.
pub fn parse_raw(payload: &Value) -> Result<Vec<RawTrade>, EngineError> {
    if !payload.is_array() {
        return Err(EngineError::InvalidInput(format!(
            "expected a trade array, got {}",
            json_type_name(payload)
        )));
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| EngineError::InvalidInput(e.to_string()))
}

/// Coerce raw trades into canonical form and sort ascending by timestamp.
///
/// The sort is stable: trades sharing a timestamp keep their input order.
pub fn normalize(raw: Vec<RawTrade>) -> Vec<Trade> {
    let mut trades: Vec<Trade> = raw.into_iter().map(Trade::from).collect();
    trades.sort_by_key(|t| t.timestamp);
    trades
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
