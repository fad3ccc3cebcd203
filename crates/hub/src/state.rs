use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use automation_engine::{Action, Reason};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub devices: HashMap<String, DeviceState>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct DeviceState {
    pub name: String,
    /// Last state reported by the gateway; `None` until the first report.
    pub on: Option<bool>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_changed: Option<OffsetDateTime>,
    pub last_action: Option<Action>,
    pub last_reason: Option<Reason>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_evaluated: Option<OffsetDateTime>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Command,
    Report,
    Error,
    System,
    Scheduler,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub devices: HashMap<String, DeviceState>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    /// `devices` is `(device_id, name)`.
    pub fn new(devices: &[(String, String)]) -> Self {
        let devices = devices
            .iter()
            .map(|(id, name)| {
                (
                    id.clone(),
                    DeviceState {
                        name: name.clone(),
                        on: None,
                        last_changed: None,
                        last_action: None,
                        last_reason: None,
                        last_evaluated: None,
                    },
                )
            })
            .collect();

        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            devices,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record the engine's verdict for a device. Holds are not events.
    pub fn record_verdict(&mut self, device_id: &str, action: Action, reason: Reason) {
        if let Some(dev) = self.devices.get_mut(device_id) {
            dev.last_action = Some(action);
            dev.last_reason = Some(reason);
            dev.last_evaluated = Some(OffsetDateTime::now_utc());
        }
    }

    /// Record an ON/OFF command sent to a gateway.
    pub fn record_command(&mut self, device_id: &str, on: bool, reason: Reason) {
        let state_str = if on { "ON" } else { "OFF" };
        self.push_event(
            EventKind::Command,
            format!("{device_id} -> {state_str} ({})", reason.as_str()),
        );
    }

    /// Record a state report from a gateway.
    pub fn record_report(&mut self, device_id: &str, on: bool) {
        if let Some(dev) = self.devices.get_mut(device_id) {
            if dev.on != Some(on) {
                dev.last_changed = Some(OffsetDateTime::now_utc());
            }
            dev.on = Some(on);
        }

        let state_str = if on { "ON" } else { "OFF" };
        self.push_event(EventKind::Report, format!("{device_id} is {state_str}"));
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Record a scheduler event.
    pub fn record_scheduler(&mut self, detail: String) {
        self.push_event(EventKind::Scheduler, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            devices: self.devices.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
