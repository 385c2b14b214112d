//! Status and address polling.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::instance::{Instance, InstanceStatus};
use crate::transport::Transport;

use super::VirtClient;

impl<T: Transport> VirtClient<T> {
    /// Polls until `name` reports `target`, returning `false` once `timeout`
    /// has elapsed. A failed listing counts as "not yet".
    #[instrument(skip(self, target), fields(awaited = %target))]
    pub async fn await_status(
        &self,
        name: &str,
        target: &InstanceStatus,
        timeout: Duration,
    ) -> bool {
        self.poll(name, timeout, |instance| &instance.status == target)
            .await
            .is_some()
    }

    /// Polls until `name` reports an IPv4 address, giving up after `timeout`.
    #[instrument(skip(self))]
    pub async fn await_ipv4(&self, name: &str, timeout: Duration) -> Option<Ipv4Addr> {
        self.poll(name, timeout, |instance| instance.ipv4().is_some())
            .await
            .and_then(|instance| instance.ipv4())
    }

    async fn poll<F>(&self, name: &str, timeout: Duration, mut ready: F) -> Option<Instance>
    where
        F: FnMut(&Instance) -> bool + Send,
    {
        let started = Instant::now();
        loop {
            if let Some(instance) = self.find_by_name(name).await {
                if ready(&instance) {
                    return Some(instance);
                }
                debug!(status = %instance.status, "instance not ready yet");
            }

            if started.elapsed() >= timeout {
                return None;
            }
            sleep(self.poll_interval).await;
        }
    }
}
