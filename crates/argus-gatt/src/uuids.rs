//! Bluetooth SIG assigned numbers used by the bridge.

/// Generic Access service.
pub const SERVICE_GENERIC_ACCESS: u16 = 0x1800;
/// Appearance characteristic.
pub const CHAR_APPEARANCE: u16 = 0x2A01;
/// Appearance value: Cycling Power Sensor.
pub const APPEARANCE_CYCLING_POWER_SENSOR: u16 = 0x0484;

pub const SERVICE_HEART_RATE: u16 = 0x180D;
pub const SERVICE_CYCLING_SPEED_AND_CADENCE: u16 = 0x1816;
pub const SERVICE_CYCLING_POWER: u16 = 0x1818;

pub const CHAR_HEART_RATE_MEASUREMENT: u16 = 0x2A37;
pub const CHAR_CSC_MEASUREMENT: u16 = 0x2A5B;
pub const CHAR_CYCLING_POWER_MEASUREMENT: u16 = 0x2A63;
pub const CHAR_CYCLING_POWER_FEATURE: u16 = 0x2A65;

const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Expands a 16-bit assigned number into its canonical 128-bit string form.
pub fn sig_uuid(short: u16) -> String {
    format!("0000{short:04x}{BASE_UUID_SUFFIX}")
}

/// Returns the 16-bit assigned number if `uuid` lies on the SIG base UUID.
pub fn short_from_uuid(uuid: &str) -> Option<u16> {
    let lower = uuid.trim().to_ascii_lowercase();
    if lower.len() == 4 {
        // 0x0000 is not an assigned number.
        return u16::from_str_radix(&lower, 16).ok().filter(|short| *short != 0);
    }
    let rest = lower.strip_prefix("0000")?;
    let short = rest.get(..4)?;
    if rest.get(4..)? != BASE_UUID_SUFFIX {
        return None;
    }
    u16::from_str_radix(short, 16).ok()
}
