//! Errors surfaced by instance management operations.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// API operation that produced an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// List instances.
    List,
    /// Create an instance.
    Create,
    /// Start an instance.
    Start,
    /// Stop an instance.
    Stop,
    /// Restart an instance.
    Restart,
    /// Delete an instance.
    Delete,
    /// Execute a command inside an instance.
    Exec,
}

impl Operation {
    /// Lower-case verb used in messages and plans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Delete => "delete",
            Self::Exec => "exec",
        }
    }

    /// Statuses treated as success. `409` on start and stop means the
    /// instance is already in the requested state.
    #[must_use]
    pub const fn accepted_statuses(self) -> &'static [u16] {
        match self {
            Self::List | Self::Exec => &[200],
            Self::Create => &[200, 201],
            Self::Start | Self::Stop => &[200, 202, 409],
            Self::Restart => &[200, 202],
            Self::Delete => &[200, 204],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while reconciling or executing against an instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VirtError {
    /// Configuration is incomplete; no request was made.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The named instance does not exist.
    #[error("Instance '{name}' not found")]
    InstanceNotFound {
        /// Requested instance name.
        name: String,
    },
    /// Listing instances failed, so absence cannot be established.
    #[error("failed to list instances (status {status}): {text}")]
    LookupFailed {
        /// Status returned by the transport.
        status: u16,
        /// Response or failure text.
        text: String,
    },
    /// The backend answered with a status outside the accepted set.
    #[error("Failed to {operation} instance: {text}")]
    Rejected {
        /// Operation that was rejected.
        operation: Operation,
        /// Status returned by the transport.
        status: u16,
        /// Response or failure text.
        text: String,
    },
    /// The backend accepted the call but the body could not be decoded.
    #[error("unexpected response to {operation}: {message}")]
    InvalidResponse {
        /// Operation whose response was malformed.
        operation: Operation,
        /// Decoder message.
        message: String,
    },
    /// The instance did not reach the target state in time.
    #[error("instance {name} did not reach {target} within {timeout_secs} seconds")]
    PollTimeout {
        /// Instance name.
        name: String,
        /// Awaited condition.
        target: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },
}
