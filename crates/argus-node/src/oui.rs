//! Vendor lookup by the first three address octets.

pub const UNKNOWN_VENDOR: &str = "Unknown";

const OUI_VENDORS: &[(&str, &str)] = &[
    ("DC:62:79", "TP-Link"),
    ("BC:07:1D", "TP-Link"),
    ("00:45:E2", "Intel"),
    ("3C:58:C2", "Intel"),
    ("E4:5F:01", "Realtek"),
    ("00:E0:4C", "Realtek"),
    ("EE:91:12", "Thinkrider"),
];

/// Vendors that ship general purpose computer adapters.
const HOST_ADAPTER_VENDORS: &[&str] = &["Intel", "Realtek"];
/// Vendors that ship dedicated trainer hardware.
const TRAINER_VENDORS: &[&str] = &["Thinkrider"];

/// Uppercased `XX:XX:XX` prefix, empty if the address is too short.
pub fn oui_prefix(address: &str) -> String {
    address
        .get(..8)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

pub fn vendor_from_mac(address: &str) -> &'static str {
    let prefix = oui_prefix(address);
    OUI_VENDORS
        .iter()
        .find(|(oui, _)| *oui == prefix)
        .map(|(_, vendor)| *vendor)
        .unwrap_or(UNKNOWN_VENDOR)
}

pub fn is_host_adapter_vendor(vendor: &str) -> bool {
    HOST_ADAPTER_VENDORS.iter().any(|v| *v == vendor)
}

pub fn is_trainer_vendor(vendor: &str) -> bool {
    TRAINER_VENDORS.iter().any(|v| *v == vendor)
}
