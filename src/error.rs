use thiserror::Error;

/// Errors surfaced by adapters, the evaluator and the [crate::Gatekeeper] mutation boundary.
///
/// None of these are ever converted into a "disabled" answer inside the crate; deciding how to
/// degrade when a flag cannot be read is left to the host application.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// The remote Feature API could not be reached: connection refused, DNS failure or an
    /// elapsed connect/read timeout.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote Feature API answered with a non-2xx status. The body is kept verbatim.
    #[error("remote feature api responded with status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// A 2xx response whose body does not have the expected shape.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// A group gate names a group that is absent from the [crate::GroupRegistry].
    #[error("The group named \"{name}\" has not been registered.")]
    UnregisteredGroup { name: String },

    /// A group with this name is already registered.
    #[error("The group named \"{name}\" has already been registered.")]
    DuplicateGroup { name: String },

    /// User-supplied input rejected before it reached an adapter: an empty feature key, an
    /// empty actor id or group name, or a percentage outside 0..=100.
    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    /// The local file store could not be read, parsed or written.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidValue {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedResponse {
            message: message.into(),
        }
    }

    /// Returns true for failures to reach the remote end at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// The HTTP status code carried by a [Error::RemoteStatus], if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn unregistered_group_message_names_the_group() {
        let error = Error::UnregisteredGroup {
            name: "not_here".into(),
        };
        assert_that!(error.to_string())
            .is_equal_to("The group named \"not_here\" has not been registered.".to_string());
    }

    #[test]
    fn status_is_only_reported_for_remote_status_errors() {
        let remote = Error::RemoteStatus {
            status: 503,
            body: "".into(),
        };
        assert_that!(remote.status()).contains_value(503);
        assert_that!(remote.is_transport()).is_false();

        let transport = Error::Transport {
            message: "connection refused".into(),
        };
        assert_that!(transport.status()).is_none();
        assert_that!(transport.is_transport()).is_true();
    }
}
