use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::coordinator::RefreshLedger;
use crate::portal::{HttpPortal, Portal};
use crate::protocol::DEFAULT_BASE_URL;
use crate::types::{Credentials, DeviceState, ZoneStatus};
use crate::{Error, Result};

const DEFAULT_REFRESH_INTERVAL_HOURS: u64 = 12;
const DEFAULT_BOOST_HOURS: f64 = 1.0;
const DEFAULT_POLL_STEP: Duration = Duration::from_secs(10);
const DEFAULT_FORCE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ClimoteClientBuilder {
    creds: Credentials,
    base_url: String,
    refresh_interval: Duration,
    default_boost_hours: f64,
    poll_step: Duration,
    force_timeout: Duration,
    read_timeout: Duration,
}

impl ClimoteClientBuilder {
    pub fn new(
        device_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            creds: Credentials::new(device_id, username, password),
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_HOURS * 3600),
            default_boost_hours: DEFAULT_BOOST_HOURS,
            poll_step: DEFAULT_POLL_STEP,
            force_timeout: DEFAULT_FORCE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Minimum interval between forced remote refreshes. SMS messages are
    /// a finite budget; host polling cadence does not change this.
    pub fn refresh_interval_hours(mut self, hours: u64) -> Self {
        self.refresh_interval = Duration::from_secs(hours * 3600);
        self
    }

    pub fn default_boost_hours(mut self, hours: f64) -> Self {
        self.default_boost_hours = hours;
        self
    }

    /// Interval between attempts against the waiting endpoint.
    pub fn poll_step(mut self, step: Duration) -> Self {
        self.poll_step = step;
        self
    }

    /// Ceiling on a forced refresh (the full SMS round trip).
    pub fn force_timeout(mut self, timeout: Duration) -> Self {
        self.force_timeout = timeout;
        self
    }

    /// Ceiling on a non-forced (cached) status read.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn build(self) -> ClimoteClient<HttpPortal> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent("Mozilla/5.0 (compatible; climote-client)")
            .build()
            .expect("failed to build HTTP client");

        let portal = HttpPortal::new(
            http,
            self.base_url,
            self.creds,
            self.poll_step,
            self.force_timeout,
            self.read_timeout,
        );
        ClimoteClient::with_portal(portal, self.refresh_interval, self.default_boost_hours)
    }
}

/// Client for one climote device.
///
/// The host environment owns one instance per configured device and
/// serializes calls into it; `&mut self` on every networked operation makes
/// that explicit. Reads (`zones`, `state`) never touch the network.
pub struct ClimoteClient<P = HttpPortal> {
    portal: P,
    refresh_interval: Duration,
    default_boost_hours: f64,
    zones: BTreeMap<u8, String>,
    state: DeviceState,
    boost_hours: HashMap<u8, f64>,
    ledger: RefreshLedger,
}

impl ClimoteClient<HttpPortal> {
    pub fn builder(
        device_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ClimoteClientBuilder {
        ClimoteClientBuilder::new(device_id, username, password)
    }

    /// Replace credentials and refresh interval atomically. Refresh history
    /// is forgotten, so the next update request goes through.
    pub fn reconfigure(
        &mut self,
        device_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        refresh_interval_hours: u64,
    ) {
        self.portal
            .set_credentials(Credentials::new(device_id, username, password));
        self.refresh_interval = Duration::from_secs(refresh_interval_hours * 3600);
        self.ledger.reset();
    }
}

impl<P: Portal> ClimoteClient<P> {
    /// Construct over an explicit [`Portal`] implementation. This is the
    /// seam test doubles plug into.
    pub fn with_portal(portal: P, refresh_interval: Duration, default_boost_hours: f64) -> Self {
        Self {
            portal,
            refresh_interval,
            default_boost_hours,
            zones: BTreeMap::new(),
            state: DeviceState::default(),
            boost_hours: HashMap::new(),
            ledger: RefreshLedger::default(),
        }
    }

    /// First contact: fetch the zone configuration and seed state with a
    /// non-forced status read. Returns whether zone configuration was
    /// obtained. Rejected credentials are fatal; a status read that times
    /// out is not, since the next scheduled update will try again.
    pub async fn initialize(&mut self) -> Result<bool> {
        let config = self.portal.fetch_config().await?;
        if let Some(config) = &config {
            info!(zones = config.zones.len(), "zone configuration loaded");
            self.zones = config.zones.clone();
            for zone in self.zones.keys() {
                self.state.zones.entry(*zone).or_default();
            }
        }

        match self.portal.retrieve_status(false).await {
            Ok(state) => self.state = state,
            Err(Error::Authentication) => return Err(Error::Authentication),
            Err(e) => warn!(error = %e, "initial status read failed, keeping defaults"),
        }

        Ok(config.is_some())
    }

    /// Active zones by index, established at initialize time.
    pub fn zones(&self) -> &BTreeMap<u8, String> {
        &self.zones
    }

    /// Last-known device state. Never blocks, never triggers network
    /// activity.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn last_update_complete(&self) -> Option<Instant> {
        self.ledger.last_complete()
    }

    /// Bring state up to date if appropriate. Returns whether a refresh
    /// actually ran; a refresh that ran but timed out still counts as run
    /// (callers judge success by state freshness). `force` bypasses the
    /// throttle window, never the in-flight guard.
    pub async fn request_update(&mut self, force: bool) -> bool {
        if !self
            .ledger
            .begin(Instant::now(), force, self.refresh_interval)
        {
            return false;
        }

        let success = match self.portal.retrieve_status(true).await {
            Ok(state) => {
                debug!("refresh delivered new state");
                self.state = state;
                true
            }
            Err(Error::PollTimeout) => {
                info!("refresh ran but the unit did not reply in time");
                false
            }
            Err(e) => {
                warn!(error = %e, "refresh failed");
                false
            }
        };

        self.ledger.finish(success, Instant::now());
        true
    }

    /// Boost heating in a zone. Without an explicit duration the per-zone
    /// setting (or the configured default) applies. On acceptance the zone
    /// is optimistically marked heating until the next poll confirms.
    pub async fn boost(&mut self, zone: u8, hours: Option<f64>) -> Result<bool> {
        let hours = hours.unwrap_or_else(|| {
            self.boost_hours
                .get(&zone)
                .copied()
                .unwrap_or(self.default_boost_hours)
        });
        let ok = self.portal.boost(zone, hours).await?;
        if ok {
            self.state.zones.entry(zone).or_default().status = ZoneStatus::Heating;
        }
        Ok(ok)
    }

    /// Cancel a boost. On acceptance the zone is optimistically marked off.
    pub async fn off(&mut self, zone: u8) -> Result<bool> {
        let ok = self.portal.off(zone).await?;
        if ok {
            let state = self.state.zones.entry(zone).or_default();
            state.status = ZoneStatus::Off;
            state.time_remaining = None;
        }
        Ok(ok)
    }

    /// Set a zone's target temperature. On acceptance the new target is
    /// optimistically written into local state; the next poll is the source
    /// of truth.
    pub async fn set_target_temperature(&mut self, zone: u8, degrees: i32) -> Result<bool> {
        let ok = self.portal.set_target_temperature(zone, degrees).await?;
        if ok {
            self.state.zones.entry(zone).or_default().thermostat = degrees;
        }
        Ok(ok)
    }

    /// Remember the boost duration to use for a zone when `boost` is called
    /// without one.
    pub fn set_boost_duration(&mut self, zone: u8, hours: f64) {
        self.boost_hours.insert(zone, hours);
    }
}
