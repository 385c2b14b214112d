//! Instance lookup by name.

use tracing::{debug, instrument, warn};

use crate::error::Operation;
use crate::instance::Instance;
use crate::transport::{ApiRequest, Transport};

use super::{INSTANCE_PATH, VirtClient};

/// Outcome of looking up an instance by name.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    /// The first instance carrying the name.
    Found(Instance),
    /// The listing succeeded and no instance carries the name.
    NotFound,
    /// The listing failed; absence is unknown.
    Failed {
        /// Status returned by the transport.
        status: u16,
        /// Response or failure text.
        text: String,
    },
}

impl Lookup {
    /// Collapses the lookup into an optional instance.
    #[must_use]
    pub fn into_instance(self) -> Option<Instance> {
        match self {
            Self::Found(instance) => Some(instance),
            Self::NotFound | Self::Failed { .. } => None,
        }
    }
}

impl<T: Transport> VirtClient<T> {
    /// Lists all instances and returns the first whose name equals `name`.
    #[instrument(skip(self))]
    pub async fn lookup(&self, name: &str) -> Lookup {
        let request = ApiRequest::get(INSTANCE_PATH);
        let response = self.transport.call(&request).await;

        if !response.status_in(Operation::List.accepted_statuses()) {
            warn!(status = response.status, "instance listing failed");
            return Lookup::Failed {
                status: response.status,
                text: response.text,
            };
        }

        let instances: Vec<Instance> = match response.json() {
            Ok(instances) => instances,
            Err(err) => {
                warn!(error = %err, "instance listing could not be decoded");
                return Lookup::Failed {
                    status: response.status,
                    text: format!("undecodable instance list: {err}"),
                };
            }
        };

        match instances.into_iter().find(|instance| instance.name == name) {
            Some(instance) => {
                debug!(id = %instance.id, status = %instance.status, "instance found");
                Lookup::Found(instance)
            }
            None => Lookup::NotFound,
        }
    }

    /// Like [`VirtClient::lookup`], treating a failed listing as absence.
    pub async fn find_by_name(&self, name: &str) -> Option<Instance> {
        self.lookup(name).await.into_instance()
    }
}
