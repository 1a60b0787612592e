use argus_core::GattService;
use argus_gatt::uuids::{short_from_uuid, SERVICE_CYCLING_POWER, SERVICE_HEART_RATE};
use tokio::sync::mpsc;

pub type EventSender = mpsc::Sender<RadioEvent>;
pub type EventReceiver = mpsc::Receiver<RadioEvent>;

/// Bounded channel carrying radio outcomes to the link manager.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// One advertisement report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sighting {
    pub address: String,
    pub name: String,
    pub rssi: i16,
    pub service_uuids: Vec<String>,
    pub manufacturer_data: Option<Vec<u8>>,
}

impl Sighting {
    pub fn new(address: impl Into<String>, name: impl Into<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            rssi,
            ..Self::default()
        }
    }

    pub fn with_service(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuids.push(uuid.into());
        self
    }

    pub fn with_manufacturer_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data = Some(data.into());
        self
    }

    fn advertises(&self, short: u16) -> bool {
        self.service_uuids
            .iter()
            .any(|uuid| short_from_uuid(uuid) == Some(short))
    }

    pub fn advertises_power(&self) -> bool {
        self.advertises(SERVICE_CYCLING_POWER)
    }

    pub fn advertises_heart_rate(&self) -> bool {
        self.advertises(SERVICE_HEART_RATE)
    }

    pub fn manufacturer_hex(&self) -> Option<String> {
        self.manufacturer_data.as_ref().map(hex::encode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Sighting(Sighting),
    /// Connection established and the service tree discovered.
    Connected {
        address: String,
        services: Vec<GattService>,
    },
    ConnectFailed {
        address: String,
        reason: String,
    },
    Disconnected {
        address: String,
    },
    Notification {
        address: String,
        characteristic: String,
        value: Vec<u8>,
        /// Wall-clock stamp taken when the radio delivered the value.
        received_at_ms: u64,
    },
    /// A client connected to or left the local peripheral.
    ClientLink {
        connected: bool,
    },
}

impl RadioEvent {
    pub fn address(&self) -> Option<&str> {
        match self {
            RadioEvent::Sighting(s) => Some(&s.address),
            RadioEvent::Connected { address, .. }
            | RadioEvent::ConnectFailed { address, .. }
            | RadioEvent::Disconnected { address }
            | RadioEvent::Notification { address, .. } => Some(address),
            RadioEvent::ClientLink { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_gatt::uuids::sig_uuid;

    #[test]
    fn sighting_service_flags() {
        let s = Sighting::new("aa:bb", "KICKR", -60).with_service(sig_uuid(SERVICE_CYCLING_POWER));
        assert!(s.advertises_power());
        assert!(!s.advertises_heart_rate());

        let hr = Sighting::new("cc:dd", "HRM", -70).with_service("180D");
        assert!(hr.advertises_heart_rate());
    }

    #[test]
    fn manufacturer_data_is_hex_encoded() {
        let s = Sighting::new("aa:bb", "", 0).with_manufacturer_data(vec![0x4c, 0x00, 0xff]);
        assert_eq!(s.manufacturer_hex().as_deref(), Some("4c00ff"));
        assert_eq!(Sighting::new("aa:bb", "", 0).manufacturer_hex(), None);
    }

    #[tokio::test]
    async fn channel_is_bounded() {
        let (tx, mut rx) = event_channel(1);
        tx.try_send(RadioEvent::ClientLink { connected: true }).unwrap();
        assert!(tx.try_send(RadioEvent::ClientLink { connected: false }).is_err());
        assert_eq!(rx.recv().await, Some(RadioEvent::ClientLink { connected: true }));
    }
}
