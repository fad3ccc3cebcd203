use automation_engine::Action;
use rumqttc::{AsyncClient, ClientError, QoS};

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------
//
// The hub publishes commands to "device/<device_id>/set" and gateways answer
// on "device/<device_id>/state". Both carry a bare "ON" / "OFF" payload.

/// Subscription filter for gateway state reports.
pub(crate) const STATE_FILTER: &str = "device/+/state";

/// "device/<device_id>/set"
pub(crate) fn command_topic(device_id: &str) -> String {
    format!("device/{device_id}/set")
}

/// Extract device_id from "device/<device_id>/state".
pub(crate) fn extract_device_id(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "device" && parts[2] == "state" && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// Parse an "ON"/"OFF" payload into a bool (case-insensitive, trims whitespace).
pub(crate) fn parse_state_payload(payload: &[u8]) -> Result<bool, String> {
    let s = String::from_utf8_lossy(payload).trim().to_uppercase();
    match s.as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(format!("unknown device state '{s}'")),
    }
}

/// (Re)subscribe to gateway state reports. Called from the event loop on
/// every ConnAck, so it must not wait for room in the request channel.
pub(crate) fn subscribe_states(client: &AsyncClient) -> Result<(), ClientError> {
    client.try_subscribe(STATE_FILTER, QoS::AtLeastOnce)
}

/// The payload for an engine action; holds publish nothing.
pub(crate) fn command_payload(action: Action) -> Option<&'static [u8]> {
    match action {
        Action::Activate => Some(&b"ON"[..]),
        Action::Shutdown => Some(&b"OFF"[..]),
        Action::Hold => None,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
