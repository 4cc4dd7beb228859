//! Identity resolution from payload content markers.
//!
//! Multiple device classes can share a topic prefix, so identification keys
//! on payload *content*, not the topic. The rules run in a fixed priority
//! order and the first match wins; a message matching none of them is normal
//! noise and resolves to `None`.

use serde_json::Value;

use wardlink_core::{DeviceType, DeviceUid, Identity};

use crate::fields;

/// One identification rule.
pub struct IdentityRule {
    /// Stable name, used in logs.
    pub name: &'static str,
    /// Attempt to build an identity from the payload.
    pub resolve: fn(&Value) -> Option<Identity>,
}

fn mac_identity(payload: &Value, device_type: DeviceType) -> Option<Identity> {
    let mac = fields::mac(payload)?;
    Some(Identity {
        device_type,
        uid: DeviceUid::new(device_type, &mac),
        hardware_id: mac.clone(),
        mac: Some(mac),
        gateway_id: fields::gateway_id(payload),
    })
}

fn numeric_identity(payload: &Value, device_type: DeviceType) -> Option<Identity> {
    let id = fields::device_id(payload)?;
    Some(Identity {
        device_type,
        uid: DeviceUid::new(device_type, id.to_string()),
        hardware_id: id.to_string(),
        // Some nodes report a MAC alongside the numeric id; carry it for the
        // dedup matcher.
        mac: fields::mac(payload),
        gateway_id: fields::gateway_id(payload),
    })
}

/// Ordered rule table. Content markers are checked before node-kind markers
/// so the wearable classes are never misfiled as generic nodes.
pub const IDENTITY_RULES: &[IdentityRule] = &[
    IdentityRule {
        name: "smartwatch",
        resolve: |payload| {
            (fields::content(payload) == Some("300B"))
                .then(|| mac_identity(payload, DeviceType::Smartwatch))
                .flatten()
        },
    },
    IdentityRule {
        name: "diaper-sensor",
        resolve: |payload| {
            (fields::content(payload) == Some("diaper DV1"))
                .then(|| mac_identity(payload, DeviceType::DiaperSensor))
                .flatten()
        },
    },
    IdentityRule {
        name: "pedometer",
        resolve: |payload| {
            fields::content(payload)
                .is_some_and(|c| c.starts_with("motion info"))
                .then(|| numeric_identity(payload, DeviceType::Pedometer))
                .flatten()
        },
    },
    IdentityRule {
        name: "positioning-tag",
        resolve: |payload| {
            (fields::node_kind(payload) == Some("TAG"))
                .then(|| numeric_identity(payload, DeviceType::PositioningTag))
                .flatten()
        },
    },
    IdentityRule {
        name: "positioning-anchor",
        resolve: |payload| {
            (fields::node_kind(payload) == Some("ANCHOR"))
                .then(|| numeric_identity(payload, DeviceType::PositioningAnchor))
                .flatten()
        },
    },
];

/// Resolve a payload to an identity, or `None` for unidentifiable noise.
///
/// `envelope_gateway` supplies the owning gateway when the payload itself
/// does not carry one.
pub fn resolve(payload: &Value, envelope_gateway: Option<&str>) -> Option<Identity> {
    for rule in IDENTITY_RULES {
        if let Some(mut identity) = (rule.resolve)(payload) {
            if identity.gateway_id.is_none() {
                identity.gateway_id = envelope_gateway.map(str::to_string);
            }
            tracing::trace!(rule = rule.name, uid = %identity.uid, "identity resolved");
            return Some(identity);
        }
    }
    None
}
