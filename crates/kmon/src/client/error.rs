use thiserror::Error;

/// Failures reported by the cluster facade.
///
/// Each variant carries the message the API server (or the transport) gave
/// back; context about which object was involved is added by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("rejected as invalid: {message}")]
    Invalid { message: String },

    /// Authentication failed or RBAC denied the request.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("cluster unreachable: {message}")]
    Unreachable { message: String },

    #[error("stream failed: {message}")]
    StreamFailed { message: String },
}

impl ClientError {
    pub fn stream_failed(message: impl Into<String>) -> Self {
        ClientError::StreamFailed {
            message: message.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => match response.code {
                409 => ClientError::AlreadyExists {
                    message: response.message,
                },
                404 => ClientError::NotFound {
                    message: response.message,
                },
                400 | 422 => ClientError::Invalid {
                    message: response.message,
                },
                401 | 403 => ClientError::Forbidden {
                    message: response.message,
                },
                _ => ClientError::Unreachable {
                    message: response.message,
                },
            },
            other => ClientError::Unreachable {
                message: other.to_string(),
            },
        }
    }
}
