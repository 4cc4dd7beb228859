//! Equivalence rules deciding whether an identity refers to a known device.
//!
//! Physical devices are sometimes re-observed through a different attribute
//! than the one that created them (discovered first by MAC, later reported
//! with a composite UID embedding that MAC). The rules below are evaluated in
//! a fixed order and the first hit wins; exact identity must never be
//! shadowed by a looser heuristic, so the order itself is part of the
//! contract.

use wardlink_core::{Device, Identity};

/// One equivalence rule.
pub struct MatchRule {
    /// Stable name, used in logs.
    pub name: &'static str,
    /// Whether `device` and the candidate identity denote the same unit.
    pub matches: fn(&Device, &Identity) -> bool,
}

/// Ordered rule table, strongest first.
///
/// `mac-in-uid` is the broadest rule: it can in principle match two unrelated
/// devices whose identifiers merely overlap as strings. That looseness is
/// intentional and kept as-is; callers should not reorder or tighten it
/// without revisiting every producer of composite UIDs.
pub const MATCH_RULES: &[MatchRule] = &[
    MatchRule {
        name: "uid-equal",
        matches: |device, identity| device.device_uid == identity.uid,
    },
    MatchRule {
        name: "hardware-id-equal",
        matches: |device, identity| {
            device.hardware_id == identity.hardware_id
                || identity
                    .mac
                    .as_deref()
                    .is_some_and(|mac| device.hardware_id == mac)
        },
    },
    MatchRule {
        name: "mac-in-uid",
        matches: |device, identity| {
            identity
                .mac
                .as_deref()
                .is_some_and(|mac| device.device_uid.as_str().contains(mac))
        },
    },
    MatchRule {
        name: "uid-suffix-equal",
        matches: |device, identity| {
            match (device.device_uid.identifier(), identity.mac.as_deref()) {
                (Some(suffix), Some(mac)) => suffix == mac,
                _ => false,
            }
        },
    },
];

/// Find the first known device equivalent to `identity`, along with the name
/// of the rule that matched.
pub fn find_match<'a, I>(devices: I, identity: &Identity) -> Option<(&'a Device, &'static str)>
where
    I: IntoIterator<Item = &'a Device> + Clone,
{
    for rule in MATCH_RULES {
        for device in devices.clone() {
            if (rule.matches)(device, identity) {
                return Some((device, rule.name));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wardlink_core::{DeviceType, DeviceUid};

    fn watch(uid_id: &str, hardware_id: &str) -> Device {
        Device::new(
            "d-1",
            DeviceUid::new(DeviceType::Smartwatch, uid_id),
            DeviceType::Smartwatch,
            hardware_id,
            Utc::now(),
        )
    }

    fn candidate(mac: &str) -> Identity {
        Identity {
            device_type: DeviceType::Smartwatch,
            uid: DeviceUid::new(DeviceType::Smartwatch, mac),
            hardware_id: mac.to_string(),
            mac: Some(mac.to_string()),
            gateway_id: None,
        }
    }

    #[test]
    fn test_uid_exact_match_wins_first() {
        let device = watch("AA:BB:CC:DD:EE:FF", "HWID-1");
        let identity = candidate("AA:BB:CC:DD:EE:FF");

        let (_, rule) = find_match([&device], &identity).unwrap();
        assert_eq!(rule, "uid-equal");
    }

    #[test]
    fn test_hardware_id_match() {
        // Created with an opaque hardware id, re-observed by MAC
        let device = watch("OLD-LABEL", "AA:BB:CC:DD:EE:FF");
        let identity = candidate("AA:BB:CC:DD:EE:FF");

        let (_, rule) = find_match([&device], &identity).unwrap();
        assert_eq!(rule, "hardware-id-equal");
    }

    #[test]
    fn test_mac_embedded_in_composite_uid() {
        let device = Device::new(
            "d-2",
            DeviceUid::from("WATCH:ROOM7-AA:BB:CC:DD:EE:FF".to_string()),
            DeviceType::Smartwatch,
            "HWID-2",
            Utc::now(),
        );
        let identity = candidate("AA:BB:CC:DD:EE:FF");

        let (_, rule) = find_match([&device], &identity).unwrap();
        assert_eq!(rule, "mac-in-uid");
    }

    #[test]
    fn test_no_match_for_unrelated() {
        let device = watch("11:22:33:44:55:66", "11:22:33:44:55:66");
        let identity = candidate("AA:BB:CC:DD:EE:FF");

        assert!(find_match([&device], &identity).is_none());
    }

    #[test]
    fn test_rule_order_exact_before_loose() {
        // Two devices: one exact UID match, one that only matches via the
        // loose substring rule. The exact match must win.
        let exact = watch("AA:BB:CC:DD:EE:FF", "HWID-EXACT");
        let loose = Device::new(
            "d-3",
            DeviceUid::from("WATCH:X-AA:BB:CC:DD:EE:FF".to_string()),
            DeviceType::Smartwatch,
            "HWID-LOOSE",
            Utc::now(),
        );
        let identity = candidate("AA:BB:CC:DD:EE:FF");

        let (device, rule) = find_match([&loose, &exact], &identity).unwrap();
        assert_eq!(rule, "uid-equal");
        assert_eq!(device.hardware_id, "HWID-EXACT");
    }

    #[test]
    fn test_numeric_id_no_mac() {
        // Numeric-keyed candidates never trip the MAC rules
        let device = watch("AA:BB:CC:DD:EE:FF", "AA:BB:CC:DD:EE:FF");
        let identity = Identity {
            device_type: DeviceType::PositioningTag,
            uid: DeviceUid::new(DeviceType::PositioningTag, "23349"),
            hardware_id: "23349".to_string(),
            mac: None,
            gateway_id: None,
        };

        assert!(find_match([&device], &identity).is_none());
    }
}
