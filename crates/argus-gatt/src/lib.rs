//! Argus GATT characteristic codec.
//!
//! Decodes Cycling Power and Heart Rate Measurement notifications from real
//! sensors and encodes the frames emitted by the local virtual peripheral.
//! Lenient `decode_*` helpers fail soft to zero values; strict `parse_*`
//! variants report why a frame was rejected.

pub mod crank;
pub mod cycling_power;
pub mod error;
pub mod heart_rate;
pub mod uuids;

pub use crank::{decode_csc_crank, encode_crank_cadence, CrankDecoder, CrankEncoder, CrankSample};
pub use cycling_power::{
    decode_power_measurement, encode_power_measurement, parse_power_measurement,
    PowerMeasurement,
};
pub use error::CodecError;
pub use heart_rate::{
    decode_heart_rate_measurement, encode_heart_rate, parse_heart_rate_measurement,
};
