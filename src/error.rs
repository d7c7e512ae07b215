use thiserror::Error;

/// Errors surfaced by the transport client, the coordinator and the host glue.
///
/// Every variant carries owned text only, so a failed refresh cycle can hand
/// the same error to each caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Unreachable host, DNS failure, timeout, or an unexpected HTTP status.
    #[error("{0}")]
    Connection(String),
    /// The device answered 401 or 403.
    #[error("{0}")]
    Auth(String),
    /// The device answered with a body that is not JSON.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no active Akari entry with id '{0}'")]
    UnknownEntry(String),
    #[error("invalid service call: {0}")]
    InvalidServiceCall(String),
    /// The coordinator was shut down while a refresh cycle was running.
    #[error("refresh cancelled: coordinator shut down")]
    Cancelled,
}

impl Error {
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Failures that may clear up on their own once the device is reachable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Error::Auth("Invalid API key".into()).is_auth());
        assert!(!Error::Auth("Invalid API key".into()).is_retryable());
        assert!(Error::Connection("timed out".into()).is_retryable());
        assert!(Error::Protocol("bad body".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
