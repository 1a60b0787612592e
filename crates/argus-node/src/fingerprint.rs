//! Structural device identity: GATT table digest and the identity verdict
//! computed once service discovery completes.

use argus_core::hash::blake3_hex;
use argus_core::{Classification, GattService, IntegritySignals};
use serde::Serialize;

use crate::oui::{is_host_adapter_vendor, is_trainer_vendor, vendor_from_mac};

/// Latency above which an ATT responder is unlikely to be embedded firmware.
pub const MAX_EMBEDDED_LATENCY_MS: f64 = 80.0;
pub const MAX_EMBEDDED_JITTER_MS: f64 = 15.0;

/// Digest of a discovered GATT table, independent of discovery order.
///
/// Each service contributes `uuid|` followed by `uuid:props;` for every
/// characteristic, services and characteristics sorted by UUID. UUIDs are
/// lowercased first. The caller's slice is left untouched.
pub fn compute_gatt_hash(services: &[GattService]) -> String {
    let mut segments: Vec<(String, String)> = services
        .iter()
        .map(|service| {
            let uuid = service.uuid.to_ascii_lowercase();
            let mut chars: Vec<(String, &str)> = service
                .characteristics
                .iter()
                .map(|c| (c.uuid.to_ascii_lowercase(), c.properties.as_str()))
                .collect();
            chars.sort();
            let mut segment = format!("{uuid}|");
            for (char_uuid, props) in chars {
                segment.push_str(&char_uuid);
                segment.push(':');
                segment.push_str(props);
                segment.push(';');
            }
            (uuid, segment)
        })
        .collect();
    segments.sort();

    let canonical: String = segments.into_iter().map(|(_, segment)| segment).collect();
    blake3_hex(canonical.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFingerprint {
    pub address: String,
    pub name: String,
    pub manufacturer_data: Option<String>,
    pub services: Vec<GattService>,
    pub gatt_hash: String,
}

impl DeviceFingerprint {
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        manufacturer_data: Option<String>,
        services: Vec<GattService>,
    ) -> Self {
        let gatt_hash = compute_gatt_hash(&services);
        Self {
            address: address.into(),
            name: name.into(),
            manufacturer_data,
            services,
            gatt_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityVerdict {
    pub score: u8,
    pub classification: Classification,
    pub reasons: Vec<String>,
}

/// Merges the structural fingerprint with behavioral signals.
pub fn evaluate_identity(
    fingerprint: &DeviceFingerprint,
    signals: &IntegritySignals,
    self_signature: &str,
) -> IdentityVerdict {
    let mut score: i32 = 100;
    let mut reasons = Vec::new();

    let vendor = vendor_from_mac(&fingerprint.address);
    if is_trainer_vendor(vendor) {
        reasons.push(format!("[+] Dedicated trainer hardware OUI ({vendor})."));
    } else if is_host_adapter_vendor(vendor) {
        score -= 30;
        reasons.push(format!(
            "[-] Computer adapter OUI ({vendor}); possible emulator or relay."
        ));
    }

    if signals.latency_mean_ms > MAX_EMBEDDED_LATENCY_MS
        || signals.latency_jitter_ms > MAX_EMBEDDED_JITTER_MS
    {
        score -= 25;
        reasons.push("[-] ATT response latency does not match embedded firmware.".to_string());
    }

    if fingerprint.manufacturer_data.is_none() {
        score -= 10;
        reasons.push("[!] Advertising carries no manufacturer specific data.".to_string());
    }

    let mut classification = match score {
        s if s >= 80 => Classification::Genuine,
        s if s >= 50 => Classification::Suspect,
        _ => Classification::Emulator,
    };

    if name_carries_signature(&fingerprint.name, self_signature) {
        score = 10;
        classification = Classification::Emulator;
        reasons.push("[!] Name carries this bridge's own signature; virtual identity.".to_string());
    }

    if reasons.is_empty() {
        reasons.push("[+] Structural fingerprint consistent with dedicated hardware.".to_string());
    }

    IdentityVerdict {
        score: score.clamp(0, 100) as u8,
        classification,
        reasons,
    }
}

/// Case-insensitive substring match against the configured self signature.
pub fn name_carries_signature(name: &str, signature: &str) -> bool {
    !signature.is_empty() && name.to_lowercase().contains(&signature.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_service() -> GattService {
        GattService::new("00001818-0000-1000-8000-00805f9b34fb")
            .with_characteristic("00002a63-0000-1000-8000-00805f9b34fb", "notify,read")
            .with_characteristic("00002a65-0000-1000-8000-00805f9b34fb", "read")
    }

    fn hr_service() -> GattService {
        GattService::new("0000180d-0000-1000-8000-00805f9b34fb")
            .with_characteristic("00002a37-0000-1000-8000-00805f9b34fb", "notify")
    }

    #[test]
    fn hash_ignores_discovery_order() {
        let a = vec![power_service(), hr_service()];
        let mut reversed_chars = power_service();
        reversed_chars.characteristics.reverse();
        let b = vec![hr_service(), reversed_chars];
        assert_eq!(compute_gatt_hash(&a), compute_gatt_hash(&b));
    }

    #[test]
    fn hash_ignores_uuid_case_and_keeps_input() {
        let lower = vec![hr_service()];
        let upper = vec![GattService::new("0000180D-0000-1000-8000-00805F9B34FB")
            .with_characteristic("00002A37-0000-1000-8000-00805F9B34FB", "notify")];
        assert_eq!(compute_gatt_hash(&lower), compute_gatt_hash(&upper));
        assert_eq!(upper[0].uuid, "0000180D-0000-1000-8000-00805F9B34FB");
    }

    #[test]
    fn hash_tracks_properties() {
        let a = vec![hr_service()];
        let b = vec![GattService::new("0000180d-0000-1000-8000-00805f9b34fb")
            .with_characteristic("00002a37-0000-1000-8000-00805f9b34fb", "notify,read")];
        assert_ne!(compute_gatt_hash(&a), compute_gatt_hash(&b));
    }

    #[test]
    fn trainer_with_clean_signals_is_genuine() {
        let fp = DeviceFingerprint::new("EE:91:12:01:02:03", "TR-900", Some("ffee".into()), vec![power_service()]);
        let verdict = evaluate_identity(&fp, &IntegritySignals::default(), "argus");
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.classification, Classification::Genuine);
        assert!(verdict.reasons[0].starts_with("[+]"));
    }

    #[test]
    fn host_adapter_with_slow_att_is_emulator() {
        let fp = DeviceFingerprint::new("00:45:E2:01:02:03", "Trainer", None, vec![power_service()]);
        let signals = IntegritySignals {
            latency_mean_ms: 120.0,
            ..IntegritySignals::default()
        };
        let verdict = evaluate_identity(&fp, &signals, "argus");
        assert_eq!(verdict.score, 35);
        assert_eq!(verdict.classification, Classification::Emulator);
        assert_eq!(verdict.reasons.len(), 3);
    }

    #[test]
    fn missing_manufacturer_data_alone_stays_genuine() {
        let fp = DeviceFingerprint::new("12:34:56:01:02:03", "Trainer", None, vec![]);
        let verdict = evaluate_identity(&fp, &IntegritySignals::default(), "argus");
        assert_eq!(verdict.score, 90);
        assert_eq!(verdict.classification, Classification::Genuine);
    }

    #[test]
    fn jitter_pushes_to_suspect() {
        let fp = DeviceFingerprint::new("12:34:56:01:02:03", "Trainer", None, vec![]);
        let signals = IntegritySignals {
            latency_jitter_ms: 20.0,
            ..IntegritySignals::default()
        };
        let verdict = evaluate_identity(&fp, &signals, "argus");
        assert_eq!(verdict.score, 65);
        assert_eq!(verdict.classification, Classification::Suspect);
    }

    #[test]
    fn self_signature_overrides_everything() {
        let fp = DeviceFingerprint::new("EE:91:12:01:02:03", "ARGUS X-Link", Some("aa".into()), vec![]);
        let verdict = evaluate_identity(&fp, &IntegritySignals::default(), "argus");
        assert_eq!(verdict.score, 10);
        assert_eq!(verdict.classification, Classification::Emulator);
    }
}
