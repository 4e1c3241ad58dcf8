//! Error types for the vSphere exporter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the vSphere exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to vCenter
    #[error("vSphere connection error: {0}")]
    Connection(#[source] reqwest::Error),

    /// Login rejected or session token missing
    #[error("vSphere authentication failed: {0}")]
    Authentication(String),

    /// vCenter answered with a non-success status
    #[error("vSphere API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// vCenter response could not be decoded
    #[error("Failed to parse vSphere response: {0}")]
    ResponseParse(String),

    /// Configured datacenter could not be resolved
    #[error("Datacenter not found: {0}")]
    ScopeNotFound(String),

    /// A derived metric name is not a legal identifier
    #[error("Invalid metric name: {0}")]
    InvalidMetricName(String),

    /// Metrics registry rejected a descriptor or sample
    #[error("Metric registration error: {0}")]
    Registration(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors raised while talking to vCenter.
    ///
    /// During a scrape these fail the cycle, at startup they are fatal.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Authentication(_)
                | Error::RemoteApi { .. }
                | Error::ResponseParse(_)
                | Error::ScopeNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_api_display() {
        let err = Error::RemoteApi {
            status: 503,
            message: "ServiceUnavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "vSphere API error (503): ServiceUnavailable"
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::ScopeNotFound("dc1".into()).is_remote());
        assert!(Error::Authentication("bad password".into()).is_remote());
        assert!(!Error::Config("missing".into()).is_remote());
        assert!(!Error::InvalidMetricName("1abc".into()).is_remote());
    }
}
