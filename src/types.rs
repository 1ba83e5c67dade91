use std::collections::BTreeMap;

use chrono::NaiveTime;

/// Account credentials for the vendor portal. Immutable for the lifetime of
/// a client; replaced wholesale by `reconfigure`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub device_id: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        device_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Login form fields as the portal expects them. The device passcode
    /// travels in its own `passcode` field.
    pub(crate) fn login_form(&self) -> [(&'static str, &str); 3] {
        [
            ("username", &self.username),
            ("password", &self.password),
            ("passcode", &self.device_id),
        ]
    }

    /// Device id safe for log output: all but the last four characters
    /// masked.
    pub fn sanitized_id(&self) -> String {
        let tail: String = self
            .device_id
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("******{tail}")
    }
}

/// Heating state of a zone as last reported by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneStatus {
    #[default]
    Off,
    Heating,
    Unknown,
}

/// Per-zone state. `time_remaining` is the boost minutes the device itself
/// last reported; it is not recalculated locally between polls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZoneState {
    pub burner: bool,
    pub status: ZoneStatus,
    /// Current temperature in °C; `None` when the device reports the
    /// "unavailable" sentinel.
    pub temperature: Option<i32>,
    /// Target temperature in °C.
    pub thermostat: i32,
    pub time_remaining: Option<i32>,
}

/// Aggregate device state. Always well-formed: `Default` is the all-off
/// zero state, so consumers never observe an absent state before the first
/// successful poll. Replaced wholesale on every successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub holiday: String,
    pub hold: Option<String>,
    /// Device-local clock at the last status update. HH:MM only, no date.
    pub updated_at: Option<NaiveTime>,
    /// The unit's own clock as reported alongside the status.
    pub unit_time: Option<NaiveTime>,
    pub zones: BTreeMap<u8, ZoneState>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            holiday: "00".to_string(),
            hold: None,
            updated_at: None,
            unit_time: None,
            zones: BTreeMap::new(),
        }
    }
}

impl DeviceState {
    pub fn zone(&self, zone: u8) -> Option<&ZoneState> {
        self.zones.get(&zone)
    }
}

/// Configured zones, parsed once from the heating-schedule document.
/// Indices are 1-based by position in the source XML and only active zones
/// are listed, but inactive zones still consume an index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    pub zones: BTreeMap<u8, String>,
}
