use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Action: ask for (empty data) or announce (port in data) a UDP channel.
pub const ACTION_CREATE_UDP_CHANNEL: &str = "create_udp_channel";
/// Action: opaque application payload.
pub const ACTION_DATA: &str = "data";
/// Action: payload the server fans out to other clients.
pub const ACTION_BROADCAST: &str = "broadcast";
/// Action: user information (JSON string in data).
pub const ACTION_UPDATE_USER: &str = "update_user";
/// Action: user status (JSON string in data).
pub const ACTION_UPDATE_STATUS: &str = "update_status";
/// Action: ask the server for its client list.
pub const ACTION_LIST_CLIENTS: &str = "list_clients";

/// Control-plane envelope carried as a reliable-channel message.
///
/// On the wire: `{"action":"...","data":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlEnvelope {
    pub action: String,
    pub data: String,
}

impl ControlEnvelope {
    pub fn new(action: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: data.into(),
        }
    }

    /// UDP channel request; the server answers with its own envelope.
    pub fn create_udp_channel() -> Self {
        Self::new(ACTION_CREATE_UDP_CHANNEL, "")
    }

    /// UDP channel announcement carrying the port to dial.
    pub fn udp_channel_port(port: u16) -> Self {
        Self::new(ACTION_CREATE_UDP_CHANNEL, port.to_string())
    }

    pub fn data(payload: impl Into<String>) -> Self {
        Self::new(ACTION_DATA, payload)
    }

    pub fn broadcast(payload: impl Into<String>) -> Self {
        Self::new(ACTION_BROADCAST, payload)
    }

    pub fn update_user(info: impl Into<String>) -> Self {
        Self::new(ACTION_UPDATE_USER, info)
    }

    pub fn update_status(status: impl Into<String>) -> Self {
        Self::new(ACTION_UPDATE_STATUS, status)
    }

    pub fn list_clients() -> Self {
        Self::new(ACTION_LIST_CLIENTS, "")
    }

    /// Serialize to the JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    /// Parse the JSON wire form.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(Into::into)
    }

    /// Port carried by a `create_udp_channel` announcement.
    ///
    /// Surrounding whitespace is ignored; port 0 is rejected.
    pub fn udp_port(&self) -> Result<u16> {
        match self.data.trim().parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ClientError::InvalidPort(self.data.clone())),
        }
    }
}

/// What an inbound reliable message means to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Server announced the port of the datagram channel.
    CreateUdpChannel(u16),
    /// Application payload for the data callback.
    Data(Bytes),
    /// Recognized action with unusable data; dropped.
    Malformed { action: String, reason: String },
}

/// Interpret one reliable message.
///
/// Bodies that are not an envelope go to the application unchanged. Every
/// action other than `create_udp_channel` delivers its `data` field.
pub fn classify(message: Bytes) -> Inbound {
    let envelope = match ControlEnvelope::from_slice(&message) {
        Ok(envelope) => envelope,
        Err(_) => return Inbound::Data(message),
    };

    if envelope.action == ACTION_CREATE_UDP_CHANNEL {
        return match envelope.udp_port() {
            Ok(port) => Inbound::CreateUdpChannel(port),
            Err(err) => Inbound::Malformed {
                action: envelope.action,
                reason: err.to_string(),
            },
        };
    }

    Inbound::Data(Bytes::from(envelope.data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_has_action_and_data() {
        let raw = ControlEnvelope::data("hello").to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"action": "data", "data": "hello"}));
    }

    #[test]
    fn request_carries_empty_data() {
        let env = ControlEnvelope::create_udp_channel();
        assert_eq!(env.action, ACTION_CREATE_UDP_CHANNEL);
        assert!(env.data.is_empty());
        assert_eq!(ControlEnvelope::list_clients().data, "");
    }

    #[test]
    fn port_announcement_is_classified() {
        let msg = Bytes::from_static(br#"{"action":"create_udp_channel","data":"5005"}"#);
        assert_eq!(classify(msg), Inbound::CreateUdpChannel(5005));
    }

    #[test]
    fn port_with_whitespace_is_accepted() {
        let env = ControlEnvelope::new(ACTION_CREATE_UDP_CHANNEL, " 6000\n");
        assert_eq!(env.udp_port().unwrap(), 6000);
    }

    #[test]
    fn bad_ports_are_malformed() {
        for data in ["not-a-number", "", "0", "70000", "-1"] {
            let raw = ControlEnvelope::new(ACTION_CREATE_UDP_CHANNEL, data)
                .to_bytes()
                .unwrap();
            match classify(Bytes::from(raw)) {
                Inbound::Malformed { action, .. } => assert_eq!(action, ACTION_CREATE_UDP_CHANNEL),
                other => panic!("expected malformed for {data:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_json_is_forwarded_whole() {
        let msg = Bytes::from_static(b"Welcome!");
        assert_eq!(classify(msg.clone()), Inbound::Data(msg));
    }

    #[test]
    fn json_without_envelope_shape_is_forwarded_whole() {
        let msg = Bytes::from_static(br#"{"type":"ping"}"#);
        assert_eq!(classify(msg.clone()), Inbound::Data(msg));
    }

    #[test]
    fn unknown_action_delivers_data_field() {
        let msg = Bytes::from_static(br#"{"action":"rider_status_update","data":"{\"id\":7}"}"#);
        assert_eq!(classify(msg), Inbound::Data(Bytes::from_static(br#"{"id":7}"#)));
    }

    #[test]
    fn data_action_delivers_data_field() {
        let raw = ControlEnvelope::broadcast("to all").to_bytes().unwrap();
        assert_eq!(
            classify(Bytes::from(raw)),
            Inbound::Data(Bytes::from_static(b"to all"))
        );
    }
}
