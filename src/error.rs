use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The portal rejected the credentials (login page came back without a
    /// usable CSRF token). Not retried automatically.
    Authentication,
    /// The hardware round trip over SMS did not complete within the poll
    /// window. Expected and recoverable; the caller retries on its own
    /// schedule.
    PollTimeout,
    /// Transport-level failure talking to the portal.
    Connectivity(reqwest::Error),
    /// A boost/off/temperature submission failed at the HTTP layer.
    Command(reqwest::Error),
    /// The portal answered with a body we could not make sense of.
    Protocol(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication => write!(f, "portal rejected credentials"),
            Error::PollTimeout => write!(f, "status poll timed out (no SMS reply from unit)"),
            Error::Connectivity(e) => write!(f, "connectivity error: {e}"),
            Error::Command(e) => write!(f, "command submission failed: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connectivity(e) | Error::Command(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Connectivity(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
