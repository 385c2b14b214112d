//! Client for the `/virt/instance` endpoints.
//!
//! The client is split the same way the operations are: lookup by name,
//! single-call lifecycle actions, and status polling. Every operation goes
//! through the injected [`Transport`].

use std::time::Duration;

use crate::transport::Transport;

mod lifecycle;
mod lookup;
mod wait;

pub use lookup::Lookup;

/// Collection endpoint.
pub const INSTANCE_PATH: &str = "/virt/instance";

/// Interval between status polls unless overridden.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Instance API client over a [`Transport`].
#[derive(Clone, Debug)]
pub struct VirtClient<T> {
    transport: T,
    poll_interval: Duration,
}

impl<T: Transport> VirtClient<T> {
    /// Creates a client polling every [`POLL_INTERVAL`].
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

pub(crate) fn instance_path(id: &str) -> String {
    format!("{INSTANCE_PATH}/{id}")
}

pub(crate) fn action_path(id: &str, action: &str) -> String {
    format!("{INSTANCE_PATH}/{id}/{action}")
}
