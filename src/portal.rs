use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::protocol::{
    self, LoginPage, BOOST_PATH, LOGIN_PATH, LOGOUT_PATH, NOT_READY, POLL_HEADER, SCHEDULE_PATH,
    STATUS_PATH, STATUS_RESPONSE_PATH, TEMPERATURE_PATH,
};
use crate::types::{Credentials, DeviceConfig, DeviceState};
use crate::{Error, Result};

/// Capability interface to the vendor portal.
///
/// `HttpPortal` is the production implementation; tests inject their own.
/// The choice is made once at construction, never through a runtime flag.
#[allow(async_fn_in_trait)]
pub trait Portal {
    /// Fetch the configured zones. `Ok(None)` when the account has no
    /// heating schedule linked, in which case config-dependent operations
    /// are unavailable.
    async fn fetch_config(&mut self) -> Result<Option<DeviceConfig>>;

    /// Retrieve device status. With `force` the backend relays an SMS to
    /// the physical unit and the call waits (bounded) for the reply; without
    /// it the last cached result is requested.
    async fn retrieve_status(&mut self, force: bool) -> Result<DeviceState>;

    /// Boost heating in a zone for the given number of hours. Returns
    /// whether the portal accepted the command.
    async fn boost(&mut self, zone: u8, hours: f64) -> Result<bool>;

    /// Cancel a running boost in a zone.
    async fn off(&mut self, zone: u8) -> Result<bool>;

    /// Set the target temperature for a zone.
    async fn set_target_temperature(&mut self, zone: u8, degrees: i32) -> Result<bool>;
}

/// HTTP implementation of [`Portal`] against the vendor management console.
///
/// The portal has no formal API: it is an HTML/form web application, and
/// every privileged operation must be bracketed by a fresh login (which
/// yields the CSRF token) and a best-effort logout. Sessions are never
/// assumed to persist across operations; the portal expires them at will.
pub struct HttpPortal {
    http: reqwest::Client,
    base_url: String,
    creds: Credentials,
    poll_step: Duration,
    force_timeout: Duration,
    read_timeout: Duration,
}

impl HttpPortal {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: String,
        creds: Credentials,
        poll_step: Duration,
        force_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            creds,
            poll_step,
            force_timeout,
            read_timeout,
        }
    }

    pub(crate) fn set_credentials(&mut self, creds: Credentials) {
        self.creds = creds;
    }

    /// Authenticate and extract the CSRF token (and, opportunistically, the
    /// schedule id) from the login response. A token shorter than two
    /// characters is the portal's way of saying the credentials were
    /// rejected, regardless of HTTP status.
    async fn login(&self) -> Result<LoginPage> {
        let url = format!("{}{LOGIN_PATH}", self.base_url);
        debug!(device = %self.creds.sanitized_id(), "logging in");
        let body = self
            .http
            .post(&url)
            .form(&self.creds.login_form())
            .send()
            .await?
            .text()
            .await?;
        let page = protocol::parse_login_page(&body)?;
        debug!(schedule_id = ?page.schedule_id, "logged in");
        Ok(page)
    }

    /// Best-effort logout. A failure here is logged and swallowed: a
    /// dangling remote session expires on its own, and a logout error must
    /// never mask the bracketed operation's outcome.
    async fn logout(&self) {
        let url = format!("{}{LOGOUT_PATH}", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => debug!(status = resp.status().as_u16(), "logged out"),
            Err(e) => warn!(error = %e, "logout failed"),
        }
    }

    async fn fetch_schedule(&self, schedule_id: &str) -> Result<DeviceConfig> {
        let url = format!(
            "{}{SCHEDULE_PATH}?heatingScheduleId={schedule_id}",
            self.base_url
        );
        let body = self.http.get(&url).send().await?.text().await?;
        protocol::parse_schedule(&body)
    }

    /// The two-step asynchronous status protocol: submit the request, then
    /// poll the waiting endpoint until the backend stops answering with the
    /// not-ready sentinel or the deadline passes. Completion is inherently
    /// not synchronous with the triggering request because the round trip
    /// to the physical unit happens over SMS.
    async fn status_inner(&self, force: bool) -> Result<DeviceState> {
        let url = format!(
            "{}{STATUS_PATH}?force={}",
            self.base_url,
            if force { 1 } else { 0 }
        );
        self.http
            .post(&url)
            .form(&self.creds.login_form())
            .send()
            .await?;

        let wait_url = format!("{}{STATUS_RESPONSE_PATH}", self.base_url);
        let timeout = if force {
            self.force_timeout
        } else {
            self.read_timeout
        };
        let deadline = Instant::now() + timeout;

        loop {
            let body = self
                .http
                .post(&wait_url)
                .header(POLL_HEADER.0, POLL_HEADER.1)
                .form(&self.creds.login_form())
                .send()
                .await?
                .text()
                .await?;

            if body != NOT_READY {
                return protocol::parse_status_body(&body);
            }

            if Instant::now() + self.poll_step >= deadline {
                info!(timeout_secs = timeout.as_secs(), "no status reply from unit");
                return Err(Error::PollTimeout);
            }
            tokio::time::sleep(self.poll_step).await;
        }
    }

    async fn submit_command(
        &self,
        path: &str,
        form: Vec<(String, String)>,
    ) -> Result<bool> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(Error::Command)?;
        let ok = resp.status().is_success();
        info!(path, ok, "command submitted");
        Ok(ok)
    }
}

impl Portal for HttpPortal {
    async fn fetch_config(&mut self) -> Result<Option<DeviceConfig>> {
        let page = self.login().await?;
        let result = match &page.schedule_id {
            Some(id) => self.fetch_schedule(id).await.map(Some),
            None => {
                info!("login page has no schedule link, zone config unavailable");
                Ok(None)
            }
        };
        self.logout().await;
        result
    }

    async fn retrieve_status(&mut self, force: bool) -> Result<DeviceState> {
        self.login().await?;
        let result = self.status_inner(force).await;
        self.logout().await;
        result
    }

    async fn boost(&mut self, zone: u8, hours: f64) -> Result<bool> {
        info!(zone, hours, "boosting zone");
        let page = self.login().await?;
        let result = self
            .submit_command(BOOST_PATH, protocol::boost_form(zone, hours, &page.token))
            .await;
        self.logout().await;
        result
    }

    async fn off(&mut self, zone: u8) -> Result<bool> {
        info!(zone, "turning off zone");
        let page = self.login().await?;
        let result = self
            .submit_command(BOOST_PATH, protocol::boost_form(zone, 0.0, &page.token))
            .await;
        self.logout().await;
        result
    }

    async fn set_target_temperature(&mut self, zone: u8, degrees: i32) -> Result<bool> {
        info!(zone, degrees, "setting target temperature");
        let page = self.login().await?;
        let result = self
            .submit_command(
                TEMPERATURE_PATH,
                protocol::temperature_form(zone, degrees, &page.token),
            )
            .await;
        self.logout().await;
        result
    }
}
