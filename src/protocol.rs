use std::collections::BTreeMap;

use chrono::NaiveTime;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{DeviceConfig, DeviceState, ZoneState, ZoneStatus};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://climote.climote.ie";

pub const LOGIN_PATH: &str = "/manager/login";
pub const LOGOUT_PATH: &str = "/manager/logout";
pub const STATUS_PATH: &str = "/manager/get-status";
pub const STATUS_RESPONSE_PATH: &str = "/manager/waiting-get-status-response";
pub const BOOST_PATH: &str = "/manager/boost";
pub const TEMPERATURE_PATH: &str = "/manager/temperature";
pub const SCHEDULE_PATH: &str = "/manager/get-heating-schedule";

/// Anchors on the login page linking to the schedule editor carry the
/// schedule id in this query parameter.
const SCHEDULE_LINK_PREFIX: &str = "/manager/edit-heating-schedule";
const SCHEDULE_ID_PARAM: &str = "heatingScheduleId";

/// Body returned by the waiting endpoint while the SMS round trip to the
/// physical unit is still pending.
pub const NOT_READY: &str = "0";

/// Request header distinguishing poll attempts from initial status calls.
pub const POLL_HEADER: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

/// Outcome of a successful login: the CSRF token every privileged form post
/// must carry, and (when the account has one configured) the heating
/// schedule id linked from the landing page.
#[derive(Debug, Clone)]
pub struct LoginPage {
    pub token: String,
    pub schedule_id: Option<String>,
}

/// Extract the CSRF token and schedule id from the login response body.
///
/// The portal's own signal for rejected credentials is a login page whose
/// first input carries an empty (or single-character) value, regardless of
/// HTTP status. A missing schedule anchor is non-fatal: config-dependent
/// operations are simply unavailable.
pub fn parse_login_page(body: &str) -> Result<LoginPage> {
    let doc = Html::parse_document(body);

    let input = Selector::parse("input").expect("static selector");
    let token = doc
        .select(&input)
        .next()
        .and_then(|el| el.value().attr("value"))
        .unwrap_or("");
    if token.len() < 2 {
        return Err(Error::Authentication);
    }

    let anchor = Selector::parse("a[href]").expect("static selector");
    let schedule_id = doc
        .select(&anchor)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.starts_with(SCHEDULE_LINK_PREFIX))
        .and_then(|href| query_param(href, SCHEDULE_ID_PARAM));

    Ok(LoginPage {
        token: token.to_string(),
        schedule_id,
    })
}

fn query_param(href: &str, name: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

pub fn boost_form(zone: u8, hours: f64, token: &str) -> Vec<(String, String)> {
    vec![
        (format!("zoneIds[{zone}]"), format_hours(hours)),
        ("cs_token_rf".to_string(), token.to_string()),
    ]
}

pub fn temperature_form(zone: u8, degrees: i32, token: &str) -> Vec<(String, String)> {
    vec![
        (format!("temp-set-input[{zone}]"), degrees.to_string()),
        ("do".to_string(), "Set".to_string()),
        ("cs_token_rf".to_string(), token.to_string()),
    ]
}

/// Whole hours go on the wire bare ("1", not "1.0"); fractional durations
/// keep their decimals ("0.5").
fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}", hours as i64)
    } else {
        format!("{hours}")
    }
}

/// Parse a status response body into a [`DeviceState`].
///
/// The payload is JSON but loosely typed: the same field arrives as a
/// string, a number, a boolean or null depending on firmware, so every
/// field is extracted tolerantly rather than through a rigid schema.
pub fn parse_status_body(body: &str) -> Result<DeviceState> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("status body is not JSON: {e}")))?;
    let obj = root
        .as_object()
        .ok_or_else(|| Error::Protocol("status body is not an object".to_string()))?;

    let mut zones = BTreeMap::new();
    for (key, value) in obj {
        if let Some(idx) = key.strip_prefix("zone").and_then(|s| s.parse::<u8>().ok()) {
            zones.insert(idx, parse_zone(value));
        }
    }

    Ok(DeviceState {
        holiday: obj
            .get("holiday")
            .and_then(Value::as_str)
            .unwrap_or("00")
            .to_string(),
        hold: obj.get("hold").and_then(loose_string),
        updated_at: obj.get("updated_at").and_then(clock_field),
        unit_time: obj.get("unit_time").and_then(clock_field),
        zones,
    })
}

fn parse_zone(value: &Value) -> ZoneState {
    let status = match value.get("status") {
        None | Some(Value::Null) => ZoneStatus::Off,
        Some(Value::String(s)) if s == "5" => ZoneStatus::Heating,
        Some(Value::String(s)) if s == "null" => ZoneStatus::Off,
        Some(_) => ZoneStatus::Unknown,
    };

    ZoneState {
        burner: value.get("burner").and_then(loose_int).unwrap_or(0) != 0,
        status,
        temperature: value.get("temperature").and_then(loose_int).map(|v| v as i32),
        thermostat: value.get("thermostat").and_then(loose_int).unwrap_or(0) as i32,
        time_remaining: value
            .get("timeRemaining")
            .and_then(loose_int)
            .map(|v| v as i32),
    }
}

/// Numeric field that may arrive as a number, a numeric string, or a
/// non-numeric sentinel ("--", "n/a", false) meaning unavailable.
fn loose_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clock_field(value: &Value) -> Option<NaiveTime> {
    value
        .as_str()
        .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok())
}

#[derive(Debug, Deserialize)]
struct ScheduleDoc {
    #[serde(rename = "zoneInfo")]
    zone_info: ZoneInfo,
}

#[derive(Debug, Deserialize)]
struct ZoneInfo {
    #[serde(default)]
    zone: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    label: String,
    #[serde(default)]
    active: u8,
}

/// Parse the heating-schedule XML document into the zone configuration.
/// Zone indices are 1-based by position; inactive zones are skipped but
/// still consume their index.
pub fn parse_schedule(xml: &str) -> Result<DeviceConfig> {
    let doc: ScheduleDoc = quick_xml::de::from_str(xml)
        .map_err(|e| Error::Protocol(format!("schedule document: {e}")))?;

    let zones = doc
        .zone_info
        .zone
        .iter()
        .enumerate()
        .filter(|(_, z)| z.active == 1)
        .map(|(i, z)| ((i + 1) as u8, z.label.clone()))
        .collect();

    Ok(DeviceConfig { zones })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_BODY: &str = r#"<html><body>
        <form method="post">
            <input type="hidden" name="cs_token_rf" value="abc123"/>
            <input type="text" name="other" value="x"/>
        </form>
        <a href="/manager/home">Home</a>
        <a href="/manager/edit-heating-schedule?heatingScheduleId=255903&startday=monday">Edit</a>
    </body></html>"#;

    #[test]
    fn login_page_extracts_token_and_schedule_id() {
        let page = parse_login_page(LOGIN_BODY).unwrap();
        assert_eq!(page.token, "abc123");
        assert_eq!(page.schedule_id.as_deref(), Some("255903"));
    }

    #[test]
    fn login_page_without_schedule_anchor_is_ok() {
        let body = r#"<html><body><input name="cs_token_rf" value="tok42"/></body></html>"#;
        let page = parse_login_page(body).unwrap();
        assert_eq!(page.token, "tok42");
        assert!(page.schedule_id.is_none());
    }

    #[test]
    fn short_token_is_rejected_credentials() {
        let body = r#"<html><body><input name="cs_token_rf" value="x"/></body></html>"#;
        assert!(matches!(
            parse_login_page(body),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn missing_input_is_rejected_credentials() {
        assert!(matches!(
            parse_login_page("<html><body>maintenance</body></html>"),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn status_body_parses_loose_fields() {
        let body = r#"{
            "holiday": "00", "hold": null,
            "updated_at": "15:15", "unit_time": "15:20",
            "zone1": {"burner": 1, "status": "5", "temperature": "17", "thermostat": 20, "timeRemaining": 42},
            "zone2": {"burner": "0", "status": null, "temperature": "--", "thermostat": "21"},
            "zone3": {"burner": 0, "status": "0", "temperature": false, "thermostat": 0}
        }"#;
        let state = parse_status_body(body).unwrap();
        assert_eq!(state.holiday, "00");
        assert!(state.hold.is_none());
        assert_eq!(
            state.updated_at,
            NaiveTime::from_hms_opt(15, 15, 0)
        );
        assert_eq!(state.unit_time, NaiveTime::from_hms_opt(15, 20, 0));

        let z1 = state.zone(1).unwrap();
        assert!(z1.burner);
        assert_eq!(z1.status, ZoneStatus::Heating);
        assert_eq!(z1.temperature, Some(17));
        assert_eq!(z1.thermostat, 20);
        assert_eq!(z1.time_remaining, Some(42));

        let z2 = state.zone(2).unwrap();
        assert!(!z2.burner);
        assert_eq!(z2.status, ZoneStatus::Off);
        assert_eq!(z2.temperature, None);
        assert_eq!(z2.thermostat, 21);
        assert_eq!(z2.time_remaining, None);

        assert_eq!(state.zone(3).unwrap().status, ZoneStatus::Unknown);
    }

    #[test]
    fn status_body_rejects_non_json() {
        assert!(matches!(
            parse_status_body("<html>error</html>"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn schedule_xml_assigns_positional_indices() {
        let xml = r#"<schedule>
            <zoneInfo>
                <zone><label>Living</label><active>1</active></zone>
                <zone><label>Spare</label><active>0</active></zone>
                <zone><label>Water</label><active>1</active></zone>
            </zoneInfo>
        </schedule>"#;
        let config = parse_schedule(xml).unwrap();
        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.zones.get(&1).map(String::as_str), Some("Living"));
        assert_eq!(config.zones.get(&3).map(String::as_str), Some("Water"));
        assert!(!config.zones.contains_key(&2));
    }

    #[test]
    fn boost_form_encodes_zone_and_token() {
        let form = boost_form(1, 2.0, "abc123");
        assert_eq!(form[0], ("zoneIds[1]".to_string(), "2".to_string()));
        assert_eq!(form[1], ("cs_token_rf".to_string(), "abc123".to_string()));

        let half = boost_form(3, 0.5, "abc123");
        assert_eq!(half[0].1, "0.5");
    }

    #[test]
    fn temperature_form_carries_do_set() {
        let form = temperature_form(2, 21, "tok");
        assert_eq!(form[0], ("temp-set-input[2]".to_string(), "21".to_string()));
        assert_eq!(form[1], ("do".to_string(), "Set".to_string()));
        assert_eq!(form[2], ("cs_token_rf".to_string(), "tok".to_string()));
    }
}
