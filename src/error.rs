use derive_more::From;
use k8s_openapi::serde_json;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Kube(kube::Error),

    #[from]
    Io(std::io::Error),

    /// Custom error message
    Custom(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

/// HTTP status code the API server uses to signal an expired watch start point.
pub const HTTP_GONE: u16 = 410;

/// Why a watch stream closed.
///
/// Produced by the event-apply step and by stream drivers, inspected by the
/// reflector's close handling to choose between relisting and terminating.
#[derive(Debug)]
pub enum WatchError {
    /// The requested starting `resourceVersion` is no longer valid ("Gone").
    /// Recoverable: the reflector relists from scratch.
    ResourceVersionExpired { message: String },

    /// The server sent an ERROR-kind event on the stream.
    ErrorEvent { code: Option<u16>, message: String },

    /// The stream delivered a malformed event (missing action or resource).
    ProtocolViolation(&'static str),

    /// The underlying transport failed.
    Stream(Error),
}

impl WatchError {
    /// Whether this close cause is the "Gone" condition that warrants a full
    /// relist rather than terminating the reflector.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        match self {
            Self::ResourceVersionExpired { .. } => true,
            Self::ErrorEvent { code, .. } => *code == Some(HTTP_GONE),
            Self::Stream(Error::Kube(kube::Error::Api(resp))) => resp.code == HTTP_GONE,
            _ => false,
        }
    }
}

impl core::fmt::Display for WatchError {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for WatchError {}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    #[test]
    fn test_gone_classification() {
        let expired = WatchError::ResourceVersionExpired {
            message: "too old resource version".to_string(),
        };
        assert!(expired.is_gone());

        let gone_event = WatchError::ErrorEvent {
            code: Some(HTTP_GONE),
            message: "Expired".to_string(),
        };
        assert!(gone_event.is_gone());

        let other_event = WatchError::ErrorEvent {
            code: Some(500),
            message: "InternalError".to_string(),
        };
        assert!(!other_event.is_gone());

        let violation = WatchError::ProtocolViolation("missing action");
        assert!(!violation.is_gone());
    }

    #[test]
    fn test_gone_classification_from_api_error() {
        let stream = WatchError::Stream(Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: HTTP_GONE,
        })));
        assert!(stream.is_gone());
    }
}
