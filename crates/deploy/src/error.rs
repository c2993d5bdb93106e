//! Error taxonomy and the severity policy applied to it.

use std::path::PathBuf;

pub type Result<T, E = VnetError> = std::result::Result<T, E>;

/// How an error affects the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Aborts the current operation.
    Fatal,
    /// Logged, then the operation continues without the value.
    Warning,
}

#[derive(Debug, thiserror::Error)]
pub enum VnetError {
    /// Missing or invalid input, detected before any network call.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The provisioning API failed for one network.
    #[error("provider request for network {network_id} failed: {message}")]
    ExternalService { network_id: String, message: String },
    /// A state file could not be read or written.
    #[error("state file {} could not be accessed: {message}", path.display())]
    Persistence { path: PathBuf, message: String },
    /// There is no infrastructure record to join parsed deployments against.
    #[error("no infrastructure information found for job {job}")]
    Correlation { job: String },
}

impl VnetError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn external(network_id: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Self::ExternalService {
            network_id: network_id.into(),
            message: format!("{:#}", err.into()),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, err: impl Into<anyhow::Error>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: format!("{:#}", err.into()),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration(_) | Self::Correlation { .. } => Severity::Fatal,
            Self::ExternalService { .. } | Self::Persistence { .. } => Severity::Warning,
        }
    }
}

/// Applies the severity policy to `result`.
///
/// Warnings are logged and turned into `Ok(None)`, fatal errors are returned
/// unchanged.
pub fn recover<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match err.severity() {
            Severity::Warning => {
                tracing::warn!("{err}");
                Ok(None)
            }
            Severity::Fatal => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(
            VnetError::configuration("missing access key").severity(),
            Severity::Fatal
        );
        assert_eq!(
            VnetError::Correlation { job: "1-ci-test".to_string() }.severity(),
            Severity::Fatal
        );
        assert_eq!(
            VnetError::external("1", anyhow::anyhow!("boom")).severity(),
            Severity::Warning
        );
        assert_eq!(
            VnetError::persistence("/tmp/x.json", anyhow::anyhow!("denied")).severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_recover_downgrades_warnings() {
        let result: Result<u32> = Err(VnetError::external("137", anyhow::anyhow!("timeout")));
        assert!(matches!(recover(result), Ok(None)));

        assert!(matches!(recover(Ok(7)), Ok(Some(7))));
    }

    #[test]
    fn test_recover_propagates_fatal() {
        let result: Result<u32> = Err(VnetError::configuration("bad input"));
        assert!(matches!(recover(result), Err(VnetError::Configuration(_))));
    }

    #[test]
    fn test_external_message_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("Failed to create TestNet");
        let err = VnetError::external("10", err);
        assert_eq!(
            err.to_string(),
            "provider request for network 10 failed: Failed to create TestNet: connection refused"
        );
    }
}
