//! Alias-tolerant field accessors.
//!
//! Upstream gateways are inconsistent about key spelling (space-separated,
//! snake_case, camelCase), so every logical field is read through an ordered
//! alias list. The first present key wins; absence yields `None`, never a
//! zero default, so later merges are not corrupted by fabricated values.
//! Numeric accessors accept both JSON numbers and numeric strings (battery
//! arrives as `"battery level": "86"`).

use serde_json::Value;

/// MAC address spellings.
pub const MAC_KEYS: &[&str] = &["MAC", "mac address", "mac_address", "macAddress"];
/// Device/node numeric id spellings.
pub const DEVICE_ID_KEYS: &[&str] = &["id", "device id", "device_id", "deviceId"];
/// Gateway id spellings.
pub const GATEWAY_ID_KEYS: &[&str] = &["gateway id", "gateway_id", "gatewayId"];
/// Battery level spellings.
pub const BATTERY_KEYS: &[&str] = &["battery level", "battery_level", "battery"];
/// Signal strength spellings.
pub const SIGNAL_KEYS: &[&str] = &["signal strength", "signal_strength", "signalStrength"];
/// Firmware version spellings.
pub const FIRMWARE_KEYS: &[&str] = &["fw ver", "fw_ver", "fw update", "fw_update"];
/// Reported name spellings.
pub const NAME_KEYS: &[&str] = &["name", "device_name"];
/// Command serial spellings.
pub const SERIAL_KEYS: &[&str] = &["serial no", "serial_no"];

/// First value present under any of the aliases.
pub fn first_value<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = payload.as_object()?;
    keys.iter()
        .find_map(|key| object.get(*key))
        .filter(|v| !v.is_null())
}

/// String value; numbers are rendered to their decimal form.
pub fn get_str(payload: &Value, keys: &[&str]) -> Option<String> {
    match first_value(payload, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unsigned integer value, from a number or a numeric string.
pub fn get_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    match first_value(payload, keys)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Float value, from a number or a numeric string.
pub fn get_f64(payload: &Value, keys: &[&str]) -> Option<f64> {
    match first_value(payload, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// MAC address, if the payload carries one.
pub fn mac(payload: &Value) -> Option<String> {
    get_str(payload, MAC_KEYS)
}

/// Numeric node id.
pub fn device_id(payload: &Value) -> Option<u64> {
    get_u64(payload, DEVICE_ID_KEYS)
}

/// Gateway id, rendered as a string.
pub fn gateway_id(payload: &Value) -> Option<String> {
    get_str(payload, GATEWAY_ID_KEYS)
}

/// Battery percentage, clamped to 0-100.
pub fn battery_level(payload: &Value) -> Option<u8> {
    let raw = get_f64(payload, BATTERY_KEYS)?;
    Some(raw.clamp(0.0, 100.0).round() as u8)
}

/// Signal strength reading.
pub fn signal_strength(payload: &Value) -> Option<f64> {
    get_f64(payload, SIGNAL_KEYS)
}

/// Reported device name.
pub fn name(payload: &Value) -> Option<String> {
    get_str(payload, NAME_KEYS)
}

/// The content marker, when present.
pub fn content(payload: &Value) -> Option<&str> {
    payload.get("content").and_then(Value::as_str)
}

/// The node-kind marker ("TAG" / "ANCHOR"), when present.
pub fn node_kind(payload: &Value) -> Option<&str> {
    payload.get("node").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_order_first_wins() {
        let payload = json!({"MAC": "AA:BB", "mac_address": "CC:DD"});
        assert_eq!(mac(&payload), Some("AA:BB".to_string()));
    }

    #[test]
    fn test_each_spelling_accepted() {
        for key in MAC_KEYS {
            let payload = json!({ *key: "AA:BB" });
            assert_eq!(mac(&payload), Some("AA:BB".to_string()), "key {}", key);
        }
    }

    #[test]
    fn test_absent_is_none_not_zero() {
        let payload = json!({"content": "300B"});
        assert_eq!(battery_level(&payload), None);
        assert_eq!(device_id(&payload), None);
        assert_eq!(mac(&payload), None);
    }

    #[test]
    fn test_battery_from_numeric_string() {
        assert_eq!(battery_level(&json!({"battery level": "86"})), Some(86));
        assert_eq!(battery_level(&json!({"battery": 42})), Some(42));
    }

    #[test]
    fn test_battery_clamped() {
        assert_eq!(battery_level(&json!({"battery": 150})), Some(100));
        assert_eq!(battery_level(&json!({"battery": -5})), Some(0));
    }

    #[test]
    fn test_gateway_id_number_rendered_as_string() {
        assert_eq!(
            gateway_id(&json!({"gateway id": 137205})),
            Some("137205".to_string())
        );
    }

    #[test]
    fn test_null_treated_as_absent() {
        assert_eq!(mac(&json!({"MAC": null, "mac_address": "CC:DD"})), Some("CC:DD".to_string()));
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(mac(&json!("just a string")), None);
        assert_eq!(device_id(&json!(42)), None);
    }
}
