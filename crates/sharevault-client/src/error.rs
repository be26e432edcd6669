//! Client error types.

use std::io;

use sharevault_core::{CONNECTION_INTERRUPTED, ChannelError, TrustError};
use sharevault_proto::ResponseTag;
use thiserror::Error;

/// Errors returned by [`GroupClient`](crate::GroupClient) and
/// [`FileClient`](crate::FileClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Server answered with a failure tag. The session stays usable.
    #[error("request refused: {0}")]
    Refused(ResponseTag),

    /// Server answered with a message that does not fit the request
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Secure channel failure. The session is unusable.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Host key was not trusted
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Local file or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Text to show the user.
    ///
    /// Refusals carry the server's message for the tag; channel failures
    /// all read the same.
    pub fn user_message(&self) -> String {
        match self {
            Self::Refused(tag) => tag.message().to_string(),
            Self::UnexpectedReply(_) | Self::Channel(_) => CONNECTION_INTERRUPTED.to_string(),
            Self::Trust(TrustError::Rejected { identity }) => {
                format!("Host key for {identity} was not accepted.")
            },
            Self::Trust(e) => e.to_string(),
            Self::Io(e) => format!("Local I/O error: {e}"),
        }
    }

    /// True if the session can be used for further requests.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Refused(_))
    }
}
